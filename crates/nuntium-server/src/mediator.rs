//! The per-modem mediator.
//!
//! One task per modem owns all of that modem's state. Everything reaches it
//! as a [`MediatorEvent`] on its channel: pushes from the radio daemon,
//! requests from bus clients, identity and push-agent changes. Network
//! transfers run as spawned tasks serialized by the bearer lock, and their
//! outcomes come back into the same loop, so the mediator's bookkeeping is
//! only ever touched from one place.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nuntium_bearer::{SharedModem, Transport};
use nuntium_core::{
    Attachment, Expiry, MNotificationInd, MSendReq, MmsPdu, PushPdu, address_without_type,
    decode_pdu, encode_send_req,
};
use nuntium_protocol::{DownloadFailure, MessageInfo, MessageStatus, OutgoingAttachment};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MediatorConfig;
use crate::error::{ServerError, ServerResult, StoreError};
use crate::preferred::PreferredContexts;
use crate::service::{MessagingService, ServiceRegistration, message_path};
use crate::store::{MessageState, MmsState, MmsStore, SEND_REQ_SUFFIX};
use crate::transfer::{
    DownloadOutcome, TransferContext, get_retrieve_conf, resume_retrieval, send_request,
};

const EVENT_CAPACITY: usize = 64;

/// Error reported for notifications left for the user to fetch.
pub const DEFERRED_ERROR: &str = "deferred";

pub enum MediatorEvent {
    /// Raw WSP push handed over by the radio daemon.
    PushReceived {
        data: Vec<u8>,
        info: BTreeMap<String, String>,
    },
    NotificationReady(MNotificationInd),
    Outgoing {
        recipients: Vec<String>,
        smil: Option<String>,
        attachments: Vec<OutgoingAttachment>,
        reply: oneshot::Sender<ServerResult<Uuid>>,
    },
    SendReqReady(MSendReq),
    SendReqFile {
        path: PathBuf,
        uuid: Uuid,
    },
    Delete {
        uuid: Uuid,
        reply: oneshot::Sender<ServerResult<()>>,
    },
    Redownload {
        uuid: Uuid,
        reply: oneshot::Sender<ServerResult<()>>,
    },
    SetUseDeliveryReports(bool),
    IdentityAdded(String),
    IdentityRemoved,
    /// The radio daemon's push interface came or went.
    PushAgent(bool),
    Terminate,
}

/// Cloneable sender side of a mediator.
#[derive(Debug, Clone)]
pub struct MediatorHandle {
    modem_id: String,
    tx: mpsc::Sender<MediatorEvent>,
}

impl std::fmt::Debug for MediatorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PushReceived { .. } => "PushReceived",
            Self::NotificationReady(_) => "NotificationReady",
            Self::Outgoing { .. } => "Outgoing",
            Self::SendReqReady(_) => "SendReqReady",
            Self::SendReqFile { .. } => "SendReqFile",
            Self::Delete { .. } => "Delete",
            Self::Redownload { .. } => "Redownload",
            Self::SetUseDeliveryReports(_) => "SetUseDeliveryReports",
            Self::IdentityAdded(_) => "IdentityAdded",
            Self::IdentityRemoved => "IdentityRemoved",
            Self::PushAgent(_) => "PushAgent",
            Self::Terminate => "Terminate",
        };
        f.write_str(name)
    }
}

impl MediatorHandle {
    pub fn channel(modem_id: impl Into<String>) -> (Self, mpsc::Receiver<MediatorEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        (
            Self {
                modem_id: modem_id.into(),
                tx,
            },
            rx,
        )
    }

    pub fn modem_id(&self) -> &str {
        &self.modem_id
    }

    async fn send(&self, event: MediatorEvent) -> ServerResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ServerError::Unavailable(self.modem_id.clone()))
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<ServerResult<T>>) -> MediatorEvent,
    ) -> ServerResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(event(reply)).await?;
        rx.await
            .map_err(|_| ServerError::Unavailable(self.modem_id.clone()))?
    }

    pub async fn push(&self, data: Vec<u8>, info: BTreeMap<String, String>) -> ServerResult<()> {
        self.send(MediatorEvent::PushReceived { data, info }).await
    }

    /// Queues an outgoing message and returns its id once it is stored.
    pub async fn send_message(
        &self,
        recipients: Vec<String>,
        smil: Option<String>,
        attachments: Vec<OutgoingAttachment>,
    ) -> ServerResult<Uuid> {
        self.request(|reply| MediatorEvent::Outgoing {
            recipients,
            smil,
            attachments,
            reply,
        })
        .await
    }

    pub async fn delete_message(&self, uuid: Uuid) -> ServerResult<()> {
        self.request(|reply| MediatorEvent::Delete { uuid, reply }).await
    }

    pub async fn redownload_message(&self, uuid: Uuid) -> ServerResult<()> {
        self.request(|reply| MediatorEvent::Redownload { uuid, reply })
            .await
    }

    pub async fn set_use_delivery_reports(&self, enabled: bool) -> ServerResult<()> {
        self.send(MediatorEvent::SetUseDeliveryReports(enabled)).await
    }

    pub async fn identity_added(&self, identity: impl Into<String>) -> ServerResult<()> {
        self.send(MediatorEvent::IdentityAdded(identity.into())).await
    }

    pub async fn identity_removed(&self) -> ServerResult<()> {
        self.send(MediatorEvent::IdentityRemoved).await
    }

    pub async fn push_agent(&self, available: bool) -> ServerResult<()> {
        self.send(MediatorEvent::PushAgent(available)).await
    }

    pub async fn terminate(&self) -> ServerResult<()> {
        self.send(MediatorEvent::Terminate).await
    }
}

/// Shared collaborators of every mediator in the process.
#[derive(Clone)]
pub struct MediatorServices {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<MmsStore>,
    pub preferred: Arc<PreferredContexts>,
    pub messaging: Arc<dyn MessagingService>,
}

enum TransferDone {
    Download {
        notification: MNotificationInd,
        outcome: DownloadOutcome,
    },
    Send {
        identity: String,
        uuid: Uuid,
        status: MessageStatus,
    },
}

pub struct Mediator {
    modem: SharedModem,
    services: MediatorServices,
    config: MediatorConfig,
    handle: MediatorHandle,
    rx: mpsc::Receiver<MediatorEvent>,
    /// Events the mediator raised itself, handled before new input.
    backlog: VecDeque<MediatorEvent>,
    transfers: JoinSet<TransferDone>,
    bearer_lock: Arc<Mutex<()>>,
    identity: Option<String>,
    use_delivery_reports: bool,
    /// Transaction id to the row whose download error was reported.
    undownloaded: HashMap<String, Uuid>,
}

impl Mediator {
    pub fn new(
        modem: SharedModem,
        services: MediatorServices,
        config: MediatorConfig,
    ) -> (Self, MediatorHandle) {
        let (handle, rx) = MediatorHandle::channel(modem.id());
        let mediator = Self {
            use_delivery_reports: config.use_delivery_reports,
            modem,
            services,
            config,
            handle: handle.clone(),
            rx,
            backlog: VecDeque::new(),
            transfers: JoinSet::new(),
            bearer_lock: Arc::new(Mutex::new(())),
            identity: None,
            undownloaded: HashMap::new(),
        };
        (mediator, handle)
    }

    pub fn spawn(
        modem: SharedModem,
        services: MediatorServices,
        config: MediatorConfig,
    ) -> (MediatorHandle, JoinHandle<()>) {
        let (mediator, handle) = Self::new(modem, services, config);
        (handle, tokio::spawn(mediator.run()))
    }

    fn modem_id(&self) -> &str {
        self.handle.modem_id()
    }

    pub async fn run(mut self) {
        info!(modem = %self.modem_id(), "Mediator started");
        loop {
            if let Some(event) = self.backlog.pop_front() {
                if !self.handle_event(event).await {
                    break;
                }
                continue;
            }
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => {
                        if !self.handle_event(event).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(done) = self.transfers.join_next(), if !self.transfers.is_empty() => {
                    self.transfer_done(done).await;
                }
            }
        }
        self.shutdown().await;
    }

    /// Returns false once the mediator should stop.
    async fn handle_event(&mut self, event: MediatorEvent) -> bool {
        debug!(modem = %self.modem_id(), ?event, "Mediator event");
        match event {
            MediatorEvent::PushReceived { data, info } => self.push_received(&data, &info),
            MediatorEvent::NotificationReady(notification) => {
                self.notification_ready(notification).await;
            }
            MediatorEvent::Outgoing {
                recipients,
                smil,
                attachments,
                reply,
            } => {
                let result = self.queue_outgoing(recipients, smil, attachments).await;
                let _ = reply.send(result);
            }
            MediatorEvent::SendReqReady(request) => self.encode_send_req(request).await,
            MediatorEvent::SendReqFile { path, uuid } => self.schedule_send(uuid, path),
            MediatorEvent::Delete { uuid, reply } => {
                let _ = reply.send(self.delete(uuid).await);
            }
            MediatorEvent::Redownload { uuid, reply } => {
                let _ = reply.send(self.redownload(uuid));
            }
            MediatorEvent::SetUseDeliveryReports(enabled) => {
                info!(modem = %self.modem_id(), enabled, "Delivery reports");
                self.use_delivery_reports = enabled;
            }
            MediatorEvent::IdentityAdded(identity) => self.identity_added(identity).await,
            MediatorEvent::IdentityRemoved => self.identity_removed().await,
            MediatorEvent::PushAgent(available) => self.push_agent(available).await,
            MediatorEvent::Terminate => return false,
        }
        true
    }

    fn push_received(&mut self, data: &[u8], info: &BTreeMap<String, String>) {
        let push = match PushPdu::decode(data) {
            Ok(push) => push,
            Err(e) => {
                warn!(modem = %self.modem_id(), error = %e, "Undecodable push");
                return;
            }
        };
        if !push.is_mms() {
            info!(
                modem = %self.modem_id(),
                content_type = %push.content_type.media_type,
                application_id = ?push.application_id,
                "Ignoring non-MMS push"
            );
            return;
        }

        match decode_pdu(&push.data) {
            Ok(MmsPdu::NotificationInd(mut notification)) => {
                notification.uuid = Uuid::new_v4();
                if let Err(e) = self.services.store.create(&notification, self.modem_id()) {
                    warn!(uuid = %notification.uuid, error = %e, "Failed to store notification");
                    return;
                }
                info!(
                    modem = %self.modem_id(),
                    uuid = %notification.uuid,
                    transaction_id = %notification.transaction_id,
                    location = %notification.content_location,
                    sender = info.get("Sender").map(String::as_str).unwrap_or_default(),
                    "M-Notification.Ind"
                );
                if self.identity.is_some() {
                    self.backlog
                        .push_back(MediatorEvent::NotificationReady(notification));
                } else {
                    info!(uuid = %notification.uuid, "No SIM identity yet, left for recovery");
                }
            }
            Ok(MmsPdu::DeliveryInd(report)) => {
                info!(
                    modem = %self.modem_id(),
                    message_id = %report.message_id,
                    status = ?report.status,
                    "M-Delivery.Ind"
                );
            }
            Ok(other) => {
                info!(modem = %self.modem_id(), message_type = %other.message_type(), "Ignoring pushed PDU");
            }
            Err(e) => {
                warn!(modem = %self.modem_id(), error = %e.error, "Undecodable pushed PDU");
                debug!(log = %e.log, "Decoder trace");
            }
        }
    }

    async fn notification_ready(&mut self, notification: MNotificationInd) {
        if self.config.deferred_download {
            self.report_failure(&notification, DEFERRED_ERROR.to_string())
                .await;
        } else {
            self.schedule_download(notification, None);
        }
    }

    fn transfer_context(&self) -> Option<TransferContext> {
        let identity = self.identity.clone()?;
        Some(TransferContext {
            modem: self.modem.clone(),
            transport: self.services.transport.clone(),
            store: self.services.store.clone(),
            messaging: self.services.messaging.clone(),
            bearer_lock: self.bearer_lock.clone(),
            preferred_context: self.services.preferred.get(&identity),
            identity,
            use_delivery_reports: self.use_delivery_reports,
        })
    }

    fn schedule_download(&mut self, notification: MNotificationInd, delay: Option<Duration>) {
        let Some(ctx) = self.transfer_context() else {
            debug!(uuid = %notification.uuid, "No SIM identity, download postponed");
            return;
        };
        let prior = notification
            .redownload_of_uuid
            .or_else(|| self.undownloaded.get(&notification.transaction_id).copied())
            .filter(|prior| *prior != notification.uuid);
        self.transfers.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let outcome = get_retrieve_conf(&ctx, &notification, prior).await;
            TransferDone::Download {
                notification,
                outcome,
            }
        });
    }

    fn schedule_resume(&mut self, notification: MNotificationInd) {
        let Some(ctx) = self.transfer_context() else {
            return;
        };
        self.transfers.spawn(async move {
            let outcome = resume_retrieval(&ctx, &notification).await;
            TransferDone::Download {
                notification,
                outcome,
            }
        });
    }

    fn schedule_send(&mut self, uuid: Uuid, path: PathBuf) {
        let Some(ctx) = self.transfer_context() else {
            warn!(uuid = %uuid, "No SIM identity, dropping send request");
            return;
        };
        self.transfers.spawn(async move {
            let status = send_request(&ctx, uuid, &path).await;
            TransferDone::Send {
                identity: ctx.identity,
                uuid,
                status,
            }
        });
    }

    async fn transfer_done(&mut self, done: Result<TransferDone, JoinError>) {
        let done = match done {
            Ok(done) => done,
            Err(e) => {
                error!(modem = %self.modem_id(), error = %e, "Transfer task failed");
                return;
            }
        };
        match done {
            TransferDone::Download {
                notification,
                outcome,
            } => match outcome {
                DownloadOutcome::Retrieved => {
                    if !notification.transaction_id.is_empty() {
                        self.undownloaded.remove(&notification.transaction_id);
                    }
                }
                DownloadOutcome::Failed(reason) => self.report_failure(&notification, reason).await,
                DownloadOutcome::Stalled => {}
            },
            TransferDone::Send {
                identity,
                uuid,
                status,
            } => {
                info!(uuid = %uuid, ?status, "Send finished");
                if status == MessageStatus::Sent {
                    if let Err(e) = self.services.store.update_sent(uuid, "sent") {
                        warn!(uuid = %uuid, error = %e, "Failed to record send");
                    }
                }
                if let Err(e) = self
                    .services
                    .messaging
                    .message_status_changed(&identity, uuid, status)
                    .await
                {
                    warn!(uuid = %uuid, error = %e, "Failed to report send status");
                }
            }
        }
    }

    /// Reports a download error unless one was already reported for the
    /// same transaction. Redownloads and notifications without a
    /// transaction id always report.
    async fn report_failure(&mut self, notification: &MNotificationInd, reason: String) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let tid = &notification.transaction_id;
        let redownload = notification.redownload_of_uuid.is_some();
        if !redownload && !tid.is_empty() && self.undownloaded.contains_key(tid) {
            debug!(uuid = %notification.uuid, transaction_id = %tid, "Download error already reported");
            self.destroy(notification.uuid);
            return;
        }

        if let Some(previous) = notification.redownload_of_uuid {
            self.withdraw(&identity, previous).await;
        }
        let failure = DownloadFailure {
            error: reason,
            allow_redownload: true,
            sender: notification
                .from
                .as_deref()
                .map(|from| address_without_type(from).to_string()),
            subject: notification.subject.clone(),
            size: Some(notification.size),
            expiry: notification.expiry.and_then(expiry_time),
        };
        info!(uuid = %notification.uuid, transaction_id = %tid, error = %failure.error, "Download error");
        if let Err(e) = self
            .services
            .messaging
            .incoming_message_fail_added(&identity, notification.uuid, failure)
            .await
        {
            warn!(uuid = %notification.uuid, error = %e, "Failed to report download error");
        }
        if !tid.is_empty() {
            self.undownloaded.insert(tid.clone(), notification.uuid);
        }
    }

    async fn withdraw(&mut self, identity: &str, uuid: Uuid) {
        if let Err(e) = self.services.messaging.message_removed(identity, uuid).await {
            warn!(uuid = %uuid, error = %e, "Failed to withdraw message");
        }
        self.destroy(uuid);
    }

    fn destroy(&mut self, uuid: Uuid) {
        self.undownloaded.retain(|_, row| *row != uuid);
        if let Err(e) = self.services.store.destroy(uuid) {
            warn!(uuid = %uuid, error = %e, "Failed to remove stored message");
        }
    }

    async fn queue_outgoing(
        &mut self,
        recipients: Vec<String>,
        smil: Option<String>,
        attachments: Vec<OutgoingAttachment>,
    ) -> ServerResult<Uuid> {
        let identity = self
            .identity
            .clone()
            .ok_or_else(|| ServerError::Unavailable(self.modem_id().to_string()))?;
        if recipients.is_empty() {
            return Err(ServerError::invalid_arguments("no recipients"));
        }
        if recipients.iter().any(|r| r.trim().is_empty()) {
            return Err(ServerError::invalid_arguments("empty recipient"));
        }

        let mut parts = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let data = tokio::fs::read(&attachment.path).await.map_err(|e| {
                ServerError::invalid_arguments(format!("{}: {e}", attachment.path.display()))
            })?;
            let mut part = Attachment::new(attachment.content_type, data)
                .with_content_id(attachment.content_id);
            if let Some(name) = attachment.path.file_name().and_then(|n| n.to_str()) {
                part = part.with_content_location(name);
            }
            parts.push(part);
        }

        let request = MSendReq::new(&recipients, smil.as_deref(), parts, self.use_delivery_reports);
        let uuid = request.uuid;
        self.services
            .store
            .create_draft(uuid, self.modem_id(), &recipients)?;

        let mut message = MessageInfo::new(message_path(&identity, uuid), MessageStatus::Draft);
        message.date = Some(Utc::now());
        message.recipients = recipients;
        message.smil = smil;
        if let Err(e) = self.services.messaging.message_added(&identity, message).await {
            self.destroy(uuid);
            return Err(e);
        }

        info!(modem = %self.modem_id(), uuid = %uuid, "Outgoing message queued");
        self.backlog.push_back(MediatorEvent::SendReqReady(request));
        Ok(uuid)
    }

    async fn encode_send_req(&mut self, request: MSendReq) {
        let uuid = request.uuid;
        let path = self.services.store.transient_path(uuid, SEND_REQ_SUFFIX);
        let written = match encode_send_req(&request) {
            Ok(bytes) => tokio::fs::write(&path, bytes).await.map_err(ServerError::from),
            Err(e) => Err(e.into()),
        };
        match written {
            Ok(()) => self
                .backlog
                .push_back(MediatorEvent::SendReqFile { path, uuid }),
            Err(e) => {
                warn!(uuid = %uuid, error = %e, "Cannot prepare M-Send.Req");
                let _ = tokio::fs::remove_file(&path).await;
                self.destroy(uuid);
                if let Some(identity) = self.identity.clone() {
                    if let Err(e) = self
                        .services
                        .messaging
                        .message_status_changed(&identity, uuid, MessageStatus::PermanentError)
                        .await
                    {
                        warn!(uuid = %uuid, error = %e, "Failed to report send status");
                    }
                }
            }
        }
    }

    async fn delete(&mut self, uuid: Uuid) -> ServerResult<()> {
        self.services.store.get(uuid)?;
        self.destroy(uuid);
        if let Some(identity) = self.identity.clone() {
            self.services.messaging.message_removed(&identity, uuid).await?;
        }
        Ok(())
    }

    fn redownload(&mut self, uuid: Uuid) -> ServerResult<()> {
        let row = self.services.store.get(uuid)?;
        if row.state != MessageState::Notification {
            return Err(ServerError::invalid_arguments(format!(
                "message {uuid} was already downloaded"
            )));
        }
        let mut notification = row
            .m_notification_ind
            .ok_or_else(|| StoreError::NotFound(format!("notification of {uuid}")))?;
        notification.uuid = Uuid::new_v4();
        notification.redownload_of_uuid = Some(uuid);
        self.services.store.create(&notification, self.modem_id())?;
        info!(uuid = %notification.uuid, previous = %uuid, "Redownload requested");
        self.schedule_download(notification, None);
        Ok(())
    }

    async fn identity_added(&mut self, identity: String) {
        if self.identity.as_deref() == Some(identity.as_str()) {
            return;
        }
        if self.identity.is_some() {
            self.identity_removed().await;
        }
        let registration = ServiceRegistration {
            preferred_context: self.services.preferred.get(&identity),
            identity: identity.clone(),
            modem_id: self.modem_id().to_string(),
            use_delivery_reports: self.use_delivery_reports,
            mediator: self.handle.clone(),
        };
        if let Err(e) = self.services.messaging.register_service(registration).await {
            error!(modem = %self.modem_id(), identity = %identity, error = %e, "Cannot register service");
            return;
        }
        info!(modem = %self.modem_id(), identity = %identity, "SIM identity available");
        self.identity = Some(identity);
        self.recover();
    }

    async fn identity_removed(&mut self) {
        let Some(identity) = self.identity.take() else {
            return;
        };
        info!(modem = %self.modem_id(), identity = %identity, "SIM identity gone");
        if let Err(e) = self.services.messaging.unregister_service(&identity).await {
            warn!(identity = %identity, error = %e, "Cannot unregister service");
        }
    }

    async fn push_agent(&mut self, available: bool) {
        let messaging = self.services.messaging.clone();
        let result = if available {
            messaging
                .register_push_agent(self.modem_id(), self.handle.clone())
                .await
                .map(|path| debug!(agent = %path, "Push agent path"))
        } else {
            messaging.unregister_push_agent(self.modem_id()).await
        };
        if let Err(e) = result {
            warn!(modem = %self.modem_id(), available, error = %e, "Push agent update failed");
        }
    }

    /// Picks up the rows this modem left behind.
    fn recover(&mut self) {
        let rows = match self.services.store.list() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(modem = %self.modem_id(), error = %e, "Cannot scan store");
                return;
            }
        };
        let modem_id = self.modem_id().to_string();
        for row in rows.into_iter().filter(|row| row.modem_id == modem_id) {
            self.recover_row(row);
        }
    }

    fn recover_row(&mut self, row: MmsState) {
        let uuid = row.id;
        match (row.state, row.m_notification_ind) {
            (MessageState::Responded | MessageState::Sent | MessageState::Draft, _) | (_, None) => {
                debug!(uuid = %uuid, state = ?row.state, "Removing finished row");
                self.destroy(uuid);
            }
            (MessageState::Downloaded | MessageState::Received, Some(notification)) => {
                info!(uuid = %uuid, state = ?row.state, "Resuming retrieval");
                self.schedule_resume(notification);
            }
            (MessageState::Notification, Some(notification)) => {
                if row.attempts >= self.config.recovery_max_attempts {
                    info!(uuid = %uuid, attempts = row.attempts, "Giving up on notification");
                    self.destroy(uuid);
                    return;
                }
                if let Err(e) = self.services.store.record_attempt(uuid) {
                    warn!(uuid = %uuid, error = %e, "Cannot count recovery attempt");
                    return;
                }
                info!(uuid = %uuid, attempt = row.attempts + 1, "Retrying download");
                self.schedule_download(notification, Some(self.config.recovery_delay));
            }
        }
    }

    async fn shutdown(&mut self) {
        self.rx.close();
        while let Some(done) = self.transfers.join_next().await {
            self.transfer_done(done).await;
        }
        self.push_agent(false).await;
        self.identity_removed().await;
        let outstanding = self
            .services
            .store
            .list()
            .map(|rows| rows.iter().filter(|r| r.modem_id == self.modem_id()).count())
            .unwrap_or_default();
        info!(modem = %self.modem_id(), outstanding, "Mediator stopped, state persists");
    }
}

fn expiry_time(expiry: Expiry) -> Option<DateTime<Utc>> {
    match expiry {
        Expiry::Absolute(secs) => DateTime::from_timestamp(i64::try_from(secs).ok()?, 0),
        Expiry::Relative(secs) => {
            let secs = i64::try_from(secs).ok()?;
            Utc::now().checked_add_signed(chrono::Duration::try_seconds(secs)?)
        }
    }
}
