//! Network transactions run on behalf of a mediator.
//!
//! Every transaction holds the modem's bearer lock from activation until
//! the context is released, so one modem never has two transfers in
//! flight. Outcomes are returned to the mediator instead of being acted on
//! here; only the store rows and messaging calls belonging to a single
//! message are touched.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nuntium_bearer::{Bearer, SharedModem, Transport};
use nuntium_core::{
    MNotificationInd, MNotifyRespInd, MRetrieveConf, MSendConf, Pdu, SendStatus,
    address_without_type, encode_notify_resp_ind,
};
use nuntium_protocol::{AttachmentInfo, MessageInfo, MessageStatus};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::service::{MessagingService, message_path};
use crate::store::{MmsStore, NOTIFY_RESP_SUFFIX, RETRIEVE_CONF_SUFFIX};

/// Everything a spawned transfer needs, detached from the mediator.
#[derive(Clone)]
pub struct TransferContext {
    pub modem: SharedModem,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<MmsStore>,
    pub messaging: Arc<dyn MessagingService>,
    pub bearer_lock: Arc<Mutex<()>>,
    pub identity: String,
    pub preferred_context: Option<String>,
    pub use_delivery_reports: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Announced to the messaging service.
    Retrieved,
    /// Bearer or fetch failure, to be reported as a download error.
    Failed(String),
    /// The row is kept where it stopped; nothing is reported.
    Stalled,
}

/// Downloads the message announced by `notification`, announces it and
/// acknowledges it to the MMSC. `prior` is an earlier row for the same
/// message whose failure was reported; it is withdrawn once this succeeds.
pub async fn get_retrieve_conf(
    ctx: &TransferContext,
    notification: &MNotificationInd,
    prior: Option<Uuid>,
) -> DownloadOutcome {
    let _guard = ctx.bearer_lock.lock().await;
    let uuid = notification.uuid;

    let bearer = match open_bearer(ctx, notification).await {
        Ok(bearer) => bearer,
        Err(reason) => return DownloadOutcome::Failed(reason),
    };

    let tmp = ctx.store.transient_path(uuid, RETRIEVE_CONF_SUFFIX);
    let proxy = bearer.as_ref().and_then(|b| b.proxy.as_ref());
    let outcome = match ctx
        .transport
        .download(&notification.content_location, proxy, &tmp)
        .await
    {
        Ok(bytes) => {
            debug!(uuid = %uuid, bytes, "Fetched M-Retrieve.Conf");
            match ctx.store.update_downloaded(uuid, &tmp) {
                Ok(_) => finish_retrieval(ctx, notification, prior, bearer.as_ref()).await,
                Err(e) => {
                    warn!(uuid = %uuid, error = %e, "Could not store downloaded message");
                    DownloadOutcome::Stalled
                }
            }
        }
        Err(e) => {
            warn!(uuid = %uuid, location = %notification.content_location, error = %e, "Download failed");
            let _ = tokio::fs::remove_file(&tmp).await;
            DownloadOutcome::Failed(e.to_string())
        }
    };

    close_bearer(ctx, bearer).await;
    outcome
}

/// Picks up a row whose content is already on disk.
pub async fn resume_retrieval(ctx: &TransferContext, notification: &MNotificationInd) -> DownloadOutcome {
    let _guard = ctx.bearer_lock.lock().await;
    // Announcing does not need the network; only the acknowledgement does.
    let bearer = open_bearer(ctx, notification).await.unwrap_or_default();
    let outcome = finish_retrieval(ctx, notification, None, bearer.as_ref()).await;
    close_bearer(ctx, bearer).await;
    outcome
}

async fn open_bearer(
    ctx: &TransferContext,
    notification: &MNotificationInd,
) -> Result<Option<Bearer>, String> {
    if notification.is_local() {
        debug!(uuid = %notification.uuid, "Local content location, no bearer needed");
        return Ok(None);
    }
    match Bearer::open(ctx.modem.as_ref(), ctx.preferred_context.as_deref()).await {
        Ok(bearer) => Ok(Some(bearer)),
        Err(e) => {
            warn!(uuid = %notification.uuid, modem = %ctx.modem.id(), error = %e, "No bearer");
            Err(e.to_string())
        }
    }
}

async fn close_bearer(ctx: &TransferContext, bearer: Option<Bearer>) {
    if let Some(bearer) = bearer {
        if let Err(e) = bearer.close(ctx.modem.as_ref()).await {
            warn!(modem = %ctx.modem.id(), error = %e, "Failed to release bearer");
        }
    }
}

async fn finish_retrieval(
    ctx: &TransferContext,
    notification: &MNotificationInd,
    prior: Option<Uuid>,
    bearer: Option<&Bearer>,
) -> DownloadOutcome {
    let uuid = notification.uuid;
    let blob = match ctx.store.get_content(uuid) {
        Ok(path) => path,
        Err(e) => {
            warn!(uuid = %uuid, error = %e, "Downloaded content missing");
            return DownloadOutcome::Stalled;
        }
    };
    let data = match tokio::fs::read(&blob).await {
        Ok(data) => data,
        Err(e) => {
            warn!(uuid = %uuid, path = %blob.display(), error = %e, "Cannot read downloaded content");
            return DownloadOutcome::Stalled;
        }
    };
    let conf = match MRetrieveConf::decode(&data) {
        Ok(conf) => conf,
        Err(e) => {
            warn!(uuid = %uuid, error = %e.error, "Undecodable M-Retrieve.Conf left in store");
            debug!(uuid = %uuid, log = %e.log, "Decoder trace");
            return DownloadOutcome::Stalled;
        }
    };

    let message = message_info(&ctx.identity, uuid, &conf, &blob);
    if let Err(e) = ctx.messaging.message_added(&ctx.identity, message).await {
        warn!(uuid = %uuid, error = %e, "Messaging service did not take the message");
        return DownloadOutcome::Stalled;
    }
    info!(uuid = %uuid, transaction_id = %notification.transaction_id, "Message received");
    if let Err(e) = ctx.store.update_retrieved(uuid) {
        warn!(uuid = %uuid, error = %e, "Failed to record retrieval");
    }

    if let Some(prior) = prior.filter(|p| *p != uuid) {
        debug!(uuid = %uuid, prior = %prior, "Withdrawing earlier download error");
        if let Err(e) = ctx.messaging.message_removed(&ctx.identity, prior).await {
            warn!(uuid = %prior, error = %e, "Failed to withdraw download error");
        }
        if let Err(e) = ctx.store.destroy(prior) {
            warn!(uuid = %prior, error = %e, "Failed to remove superseded row");
        }
    }

    acknowledge(ctx, notification, bearer).await;
    DownloadOutcome::Retrieved
}

/// Sends `M-NotifyResp.Ind`. Without a bearer the row stays `RECEIVED` and
/// the acknowledgement is retried on the next recovery.
async fn acknowledge(ctx: &TransferContext, notification: &MNotificationInd, bearer: Option<&Bearer>) {
    let uuid = notification.uuid;
    let response = MNotifyRespInd::retrieved(notification, ctx.use_delivery_reports);
    let body = match encode_notify_resp_ind(&response) {
        Ok(body) => body,
        Err(e) => {
            warn!(uuid = %uuid, error = %e, "Cannot encode M-NotifyResp.Ind");
            return;
        }
    };
    let path = ctx.store.transient_path(uuid, NOTIFY_RESP_SUFFIX);
    if let Err(e) = tokio::fs::write(&path, &body).await {
        warn!(uuid = %uuid, path = %path.display(), error = %e, "Cannot write M-NotifyResp.Ind");
        return;
    }

    let delivered = match bearer {
        Some(bearer) => match ctx
            .transport
            .upload(bearer.message_center(), bearer.proxy.as_ref(), body)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(uuid = %uuid, error = %e, "M-NotifyResp.Ind upload failed");
                false
            }
        },
        None if notification.is_local() => true,
        None => {
            debug!(uuid = %uuid, "No bearer for M-NotifyResp.Ind");
            false
        }
    };
    let _ = tokio::fs::remove_file(&path).await;

    if delivered {
        if let Err(e) = ctx.store.update_responded(uuid) {
            warn!(uuid = %uuid, error = %e, "Failed to record response");
        }
    }
}

/// Uploads an encoded `M-Send.Req` and classifies the MMSC's answer. The
/// request file is removed whatever happens.
pub async fn send_request(ctx: &TransferContext, uuid: Uuid, path: &Path) -> MessageStatus {
    let status = transmit(ctx, uuid, path).await;
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(uuid = %uuid, path = %path.display(), error = %e, "Send request already gone");
    }
    status
}

async fn transmit(ctx: &TransferContext, uuid: Uuid, path: &Path) -> MessageStatus {
    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(e) => {
            warn!(uuid = %uuid, path = %path.display(), error = %e, "Send request unreadable");
            return MessageStatus::PermanentError;
        }
    };

    let _guard = ctx.bearer_lock.lock().await;
    let bearer = match Bearer::open(ctx.modem.as_ref(), ctx.preferred_context.as_deref()).await {
        Ok(bearer) => bearer,
        Err(e) => {
            warn!(uuid = %uuid, modem = %ctx.modem.id(), error = %e, "No bearer for sending");
            return MessageStatus::TransientError;
        }
    };
    let reply = ctx
        .transport
        .upload(bearer.message_center(), bearer.proxy.as_ref(), body)
        .await;
    close_bearer(ctx, Some(bearer)).await;

    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            warn!(uuid = %uuid, error = %e, "M-Send.Req upload failed");
            return MessageStatus::TransientError;
        }
    };
    match MSendConf::decode(&reply) {
        Ok(conf) => {
            info!(
                uuid = %uuid,
                response_status = conf.response_status,
                message_id = conf.message_id.as_deref().unwrap_or_default(),
                "M-Send.Conf"
            );
            match conf.status() {
                SendStatus::Ok => MessageStatus::Sent,
                SendStatus::TransientError => MessageStatus::TransientError,
                SendStatus::PermanentError => MessageStatus::PermanentError,
            }
        }
        Err(e) => {
            warn!(uuid = %uuid, error = %e.error, "Undecodable M-Send.Conf");
            debug!(uuid = %uuid, log = %e.log, "Decoder trace");
            MessageStatus::PermanentError
        }
    }
}

/// The bus view of a retrieved message. Attachments point into `blob`.
pub fn message_info(identity: &str, uuid: Uuid, conf: &MRetrieveConf, blob: &Path) -> MessageInfo {
    let mut message = MessageInfo::new(message_path(identity, uuid), MessageStatus::Received);
    message.date = conf
        .date
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    message.sender = conf
        .from
        .as_deref()
        .map(|from| address_without_type(from).to_string());
    message.recipients = conf
        .to
        .iter()
        .chain(&conf.cc)
        .map(|address| address_without_type(address).to_string())
        .collect();
    message.subject = conf.subject.clone();

    let smil = conf.smil();
    message.smil = smil.map(|part| String::from_utf8_lossy(&part.data).into_owned());
    message.attachments = conf
        .attachments
        .iter()
        .filter(|part| !smil.is_some_and(|s| std::ptr::eq(s, *part)))
        .map(|part| AttachmentInfo {
            content_id: part
                .content_id
                .clone()
                .or_else(|| part.content_location.clone())
                .unwrap_or_default(),
            content_type: part.media_type.clone(),
            path: blob.to_path_buf(),
            offset: part.offset as u64,
            length: part.data.len() as u64,
        })
        .collect();
    message
}

#[cfg(test)]
mod tests {
    use nuntium_core::{MSendReq, encode_send_req};
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::store::{MessageState, SEND_REQ_SUFFIX};
    use crate::testing::{self, Call, FakeMessaging, FakeTransport, next_call};

    struct Harness {
        _dir: TempDir,
        ctx: TransferContext,
        transport: Arc<FakeTransport>,
        messaging: Arc<FakeMessaging>,
        calls: UnboundedReceiver<Call>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = MmsStore::open(&dir.path().join("data"), &dir.path().join("cache")).unwrap();
        let transport = Arc::new(FakeTransport::new());
        let (messaging, calls) = FakeMessaging::new();
        let messaging = Arc::new(messaging);
        let ctx = TransferContext {
            modem: Arc::new(testing::modem()),
            transport: transport.clone(),
            store: Arc::new(store),
            messaging: messaging.clone(),
            bearer_lock: Arc::new(Mutex::new(())),
            identity: testing::IDENTITY.into(),
            preferred_context: None,
            use_delivery_reports: false,
        };
        Harness {
            _dir: dir,
            ctx,
            transport,
            messaging,
            calls,
        }
    }

    #[tokio::test]
    async fn retrieves_announces_and_acknowledges() {
        let mut h = harness();
        h.transport.serve(testing::CONTENT_URL, testing::retrieve_conf());
        let n = testing::notification("tid-1", testing::CONTENT_URL);
        h.ctx.store.create(&n, testing::MODEM).unwrap();

        let outcome = get_retrieve_conf(&h.ctx, &n, None).await;
        assert_eq!(outcome, DownloadOutcome::Retrieved);

        let Call::MessageAdded(message) = next_call(&mut h.calls).await else {
            panic!("expected MessageAdded");
        };
        assert_eq!(message.path, format!("/nuntium/{}/{}", testing::IDENTITY, n.uuid));
        assert_eq!(message.sender.as_deref(), Some("+15550100"));
        assert_eq!(message.recipients, ["+15550199"]);
        assert_eq!(message.smil.as_deref(), Some("<smil><body/></smil>"));
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[1].content_id, "beach.jpg");
        assert_eq!(message.date.map(|d| d.timestamp()), Some(1_700_000_000));

        // attachment offsets index into the stored blob
        let blob = std::fs::read(&message.attachments[0].path).unwrap();
        let text = &message.attachments[0];
        let start = text.offset as usize;
        assert_eq!(&blob[start..start + text.length as usize], b"Greetings");

        let uploads = h.transport.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, testing::MMSC);
        assert_eq!(uploads[0].1.as_ref().map(|p| p.port), Some(8080));
        assert_eq!(&uploads[0].2[..2], &[0x8C, 0x83]);

        assert_eq!(h.ctx.store.get(n.uuid).unwrap().state, MessageState::Responded);
        assert!(!h.ctx.store.transient_path(n.uuid, NOTIFY_RESP_SUFFIX).exists());
        // the mms context is released again
        let contexts = h.ctx.modem.contexts().await.unwrap();
        assert!(!contexts[0].active);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported() {
        let h = harness();
        h.transport.fail_downloads(1);
        let n = testing::notification("tid-1", testing::CONTENT_URL);
        h.ctx.store.create(&n, testing::MODEM).unwrap();

        let outcome = get_retrieve_conf(&h.ctx, &n, None).await;
        assert!(matches!(outcome, DownloadOutcome::Failed(reason) if reason.contains("503")));
        assert_eq!(h.ctx.store.get(n.uuid).unwrap().state, MessageState::Notification);
        assert!(h.transport.uploads().is_empty());
    }

    #[tokio::test]
    async fn missing_bearer_is_reported() {
        let mut h = harness();
        h.ctx.modem = Arc::new(nuntium_bearer::StaticModem::new(testing::MODEM, Vec::new()));
        let n = testing::notification("tid-1", testing::CONTENT_URL);

        let outcome = get_retrieve_conf(&h.ctx, &n, None).await;
        assert!(matches!(outcome, DownloadOutcome::Failed(reason) if reason.contains("context")));
    }

    #[tokio::test]
    async fn undecodable_content_stays_downloaded() {
        let h = harness();
        h.transport.serve(testing::CONTENT_URL, vec![0x8C, 0x84, 0x8D]);
        let n = testing::notification("tid-1", testing::CONTENT_URL);
        h.ctx.store.create(&n, testing::MODEM).unwrap();

        assert_eq!(get_retrieve_conf(&h.ctx, &n, None).await, DownloadOutcome::Stalled);
        assert_eq!(h.ctx.store.get(n.uuid).unwrap().state, MessageState::Downloaded);
        assert!(h.ctx.store.get_content(n.uuid).is_ok());
    }

    #[tokio::test]
    async fn rejected_announcement_stalls_then_resumes() {
        let mut h = harness();
        h.transport.serve(testing::CONTENT_URL, testing::retrieve_conf());
        let n = testing::notification("tid-1", testing::CONTENT_URL);
        h.ctx.store.create(&n, testing::MODEM).unwrap();

        h.messaging.reject_messages(true);
        assert_eq!(get_retrieve_conf(&h.ctx, &n, None).await, DownloadOutcome::Stalled);
        assert_eq!(h.ctx.store.get(n.uuid).unwrap().state, MessageState::Downloaded);

        h.messaging.reject_messages(false);
        assert_eq!(resume_retrieval(&h.ctx, &n).await, DownloadOutcome::Retrieved);
        assert!(matches!(next_call(&mut h.calls).await, Call::MessageAdded(_)));
        assert_eq!(h.ctx.store.get(n.uuid).unwrap().state, MessageState::Responded);
    }

    #[tokio::test]
    async fn prior_error_is_withdrawn() {
        let mut h = harness();
        h.transport.serve("http://localhost:9191/mms", testing::retrieve_conf());
        let failed = testing::notification("tid-1", "http://localhost:9191/mms");
        h.ctx.store.create(&failed, testing::MODEM).unwrap();
        let n = testing::notification("tid-1", "http://localhost:9191/mms");
        h.ctx.store.create(&n, testing::MODEM).unwrap();

        let outcome = get_retrieve_conf(&h.ctx, &n, Some(failed.uuid)).await;
        assert_eq!(outcome, DownloadOutcome::Retrieved);
        assert!(matches!(next_call(&mut h.calls).await, Call::MessageAdded(_)));
        assert_eq!(next_call(&mut h.calls).await, Call::MessageRemoved(failed.uuid));
        assert!(h.ctx.store.get(failed.uuid).is_err());

        // local content needs neither a bearer nor an upload
        assert!(h.transport.uploads().is_empty());
        assert_eq!(h.ctx.store.get(n.uuid).unwrap().state, MessageState::Responded);
    }

    async fn queue_send_req(h: &Harness) -> (Uuid, std::path::PathBuf) {
        let req = MSendReq::new(&["+15550100".to_string()], None, Vec::new(), false);
        h.ctx
            .store
            .create_draft(req.uuid, testing::MODEM, &["+15550100".to_string()])
            .unwrap();
        let path = h.ctx.store.transient_path(req.uuid, SEND_REQ_SUFFIX);
        std::fs::write(&path, encode_send_req(&req).unwrap()).unwrap();
        (req.uuid, path)
    }

    #[tokio::test]
    async fn send_classifies_response_status() {
        let h = harness();
        for (reply, expected) in [
            (testing::send_conf(0x80), MessageStatus::Sent),
            (testing::send_conf(0xE3), MessageStatus::TransientError),
            (testing::send_conf(0xC1), MessageStatus::PermanentError),
            (vec![0x8C, 0x81, 0x98], MessageStatus::PermanentError),
        ] {
            h.transport.reply_to_send(reply);
            let (uuid, path) = queue_send_req(&h).await;
            assert_eq!(send_request(&h.ctx, uuid, &path).await, expected);
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn send_without_bearer_is_transient() {
        let mut h = harness();
        h.ctx.modem = Arc::new(nuntium_bearer::StaticModem::new(testing::MODEM, Vec::new()));
        let (uuid, path) = queue_send_req(&h).await;
        assert_eq!(send_request(&h.ctx, uuid, &path).await, MessageStatus::TransientError);
        assert!(!path.exists());
    }
}
