//! In-memory fakes of the mediator's seams.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use nuntium_bearer::{
    BearerContext, BearerError, BearerResult, BoxFuture, ContextKind, Proxy, StaticModem,
    Transport,
};
use nuntium_core::{
    Attachment, ContentType, MNotificationInd, MRetrieveConf, PushPdu, encode_notification_ind,
    encode_retrieve_conf,
};
use nuntium_protocol::{DownloadFailure, MessageInfo, MessageStatus};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::mediator::MediatorHandle;
use crate::service::{MessagingService, ServiceRegistration};

pub const MODEM: &str = "/ril_0";
pub const IDENTITY: &str = "310150123456789";
pub const MMSC: &str = "http://mmsc.example.net";
pub const CONTENT_URL: &str = "http://mmsc.example.net/mms/0001";

pub fn modem() -> StaticModem {
    StaticModem::new(
        MODEM,
        vec![
            BearerContext::new("/ril_0/context2", ContextKind::Mms)
                .with_message_center(MMSC)
                .with_proxy("10.0.0.1:8080"),
        ],
    )
}

pub fn notification(transaction_id: &str, content_location: &str) -> MNotificationInd {
    MNotificationInd {
        uuid: Uuid::new_v4(),
        transaction_id: transaction_id.into(),
        from: Some("+15550100/TYPE=PLMN".into()),
        subject: Some("Holiday".into()),
        size: 2048,
        content_location: content_location.into(),
        ..MNotificationInd::default()
    }
}

pub fn push_bytes(notification: &MNotificationInd) -> Vec<u8> {
    let pdu = encode_notification_ind(notification).unwrap();
    PushPdu::mms(0x01, pdu).encode().unwrap()
}

pub fn retrieve_conf() -> Vec<u8> {
    let conf = MRetrieveConf {
        transaction_id: Some("tid-1".into()),
        message_id: Some("m-1".into()),
        date: Some(1_700_000_000),
        from: Some("+15550100/TYPE=PLMN".into()),
        to: vec!["+15550199/TYPE=PLMN".into()],
        subject: Some("Holiday".into()),
        content_type: ContentType::new("application/vnd.wap.multipart.related"),
        attachments: vec![
            Attachment::new("application/smil", b"<smil><body/></smil>".to_vec())
                .with_content_id("<smil>"),
            Attachment::new("text/plain;charset=utf-8", b"Greetings".to_vec())
                .with_content_id("<text>"),
            Attachment::new("image/jpeg", vec![0xFF, 0xD8, 0xFF]).with_content_location("beach.jpg"),
        ],
        ..MRetrieveConf::default()
    };
    encode_retrieve_conf(&conf).unwrap()
}

/// `m-send-conf` with the given response status.
pub fn send_conf(response_status: u8) -> Vec<u8> {
    vec![0x8C, 0x81, 0x98, b't', 0x00, 0x8D, 0x90, 0x92, response_status]
}

/// Serves content by URL and records uploads.
#[derive(Default)]
pub struct FakeTransport {
    content: Mutex<HashMap<String, Vec<u8>>>,
    failing_downloads: AtomicU32,
    send_reply: Mutex<Vec<u8>>,
    uploads: Mutex<Vec<(String, Option<Proxy>, Vec<u8>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            send_reply: Mutex::new(send_conf(0x80)),
            ..Self::default()
        }
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.content.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn fail_downloads(&self, count: u32) {
        self.failing_downloads.store(count, Ordering::SeqCst);
    }

    pub fn reply_to_send(&self, body: Vec<u8>) {
        *self.send_reply.lock().unwrap() = body;
    }

    pub fn uploads(&self) -> Vec<(String, Option<Proxy>, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn download<'a>(
        &'a self,
        url: &'a str,
        _proxy: Option<&'a Proxy>,
        dest: &'a Path,
    ) -> BoxFuture<'a, BearerResult<u64>> {
        Box::pin(async move {
            if self
                .failing_downloads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BearerError::DownloadFailed("HTTP 503".into()));
            }
            let body = self.content.lock().unwrap().get(url).cloned();
            let body = body.ok_or_else(|| BearerError::DownloadFailed("HTTP 404".into()))?;
            tokio::fs::write(dest, &body)
                .await
                .map_err(|e| BearerError::DownloadFailed(e.to_string()))?;
            Ok(body.len() as u64)
        })
    }

    fn upload<'a>(
        &'a self,
        url: &'a str,
        proxy: Option<&'a Proxy>,
        body: Vec<u8>,
    ) -> BoxFuture<'a, BearerResult<Vec<u8>>> {
        Box::pin(async move {
            let is_send_req = body.starts_with(&[0x8C, 0x80]);
            self.uploads
                .lock()
                .unwrap()
                .push((url.to_string(), proxy.cloned(), body));
            if is_send_req {
                Ok(self.send_reply.lock().unwrap().clone())
            } else {
                Ok(Vec::new())
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ServiceAdded(String),
    ServiceRemoved(String),
    AgentAdded(String),
    AgentRemoved(String),
    MessageAdded(MessageInfo),
    FailAdded(Uuid, DownloadFailure),
    MessageRemoved(Uuid),
    StatusChanged(Uuid, MessageStatus),
}

/// Forwards every call to a channel the test reads from.
pub struct FakeMessaging {
    calls: mpsc::UnboundedSender<Call>,
    reject_messages: AtomicBool,
}

impl FakeMessaging {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls,
                reject_messages: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn reject_messages(&self, reject: bool) {
        self.reject_messages.store(reject, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        let _ = self.calls.send(call);
    }
}

impl MessagingService for FakeMessaging {
    fn register_service(&self, registration: ServiceRegistration) -> BoxFuture<'_, ServerResult<()>> {
        self.record(Call::ServiceAdded(registration.identity));
        Box::pin(async { Ok(()) })
    }

    fn unregister_service<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, ServerResult<()>> {
        self.record(Call::ServiceRemoved(identity.to_string()));
        Box::pin(async { Ok(()) })
    }

    fn register_push_agent<'a>(
        &'a self,
        modem_id: &'a str,
        _mediator: MediatorHandle,
    ) -> BoxFuture<'a, ServerResult<String>> {
        self.record(Call::AgentAdded(modem_id.to_string()));
        Box::pin(async move { Ok(format!("/nuntium/agent{modem_id}")) })
    }

    fn unregister_push_agent<'a>(&'a self, modem_id: &'a str) -> BoxFuture<'a, ServerResult<()>> {
        self.record(Call::AgentRemoved(modem_id.to_string()));
        Box::pin(async { Ok(()) })
    }

    fn message_added<'a>(
        &'a self,
        identity: &'a str,
        message: MessageInfo,
    ) -> BoxFuture<'a, ServerResult<()>> {
        Box::pin(async move {
            if self.reject_messages.load(Ordering::SeqCst) {
                return Err(ServerError::Unavailable(identity.to_string()));
            }
            self.record(Call::MessageAdded(message));
            Ok(())
        })
    }

    fn incoming_message_fail_added<'a>(
        &'a self,
        _identity: &'a str,
        uuid: Uuid,
        failure: DownloadFailure,
    ) -> BoxFuture<'a, ServerResult<()>> {
        self.record(Call::FailAdded(uuid, failure));
        Box::pin(async { Ok(()) })
    }

    fn message_removed<'a>(&'a self, _identity: &'a str, uuid: Uuid) -> BoxFuture<'a, ServerResult<()>> {
        self.record(Call::MessageRemoved(uuid));
        Box::pin(async { Ok(()) })
    }

    fn message_status_changed<'a>(
        &'a self,
        _identity: &'a str,
        uuid: Uuid,
        status: MessageStatus,
    ) -> BoxFuture<'a, ServerResult<()>> {
        self.record(Call::StatusChanged(uuid, status));
        Box::pin(async { Ok(()) })
    }
}

/// Next recorded call, failing the test after five seconds.
pub async fn next_call(rx: &mut mpsc::UnboundedReceiver<Call>) -> Call {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a messaging call")
        .expect("messaging fake dropped")
}

/// Asserts nothing else arrives within a short grace period.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Call>) {
    if let Ok(Some(call)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        panic!("unexpected call {call:?}");
    }
}

/// Polls `check` until it holds, failing the test after five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
