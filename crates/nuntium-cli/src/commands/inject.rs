//! Injection harness: fakes an MMSC and the radio daemon's push delivery
//! so a running daemon can be exercised end to end without a network.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nuntium_bearer::MMS_CONTENT_TYPE;
use nuntium_core::{
    Attachment, ContentType, MNotificationInd, MRetrieveConf, MessageClass, PushPdu,
    encode_notification_ind, encode_retrieve_conf,
};
use nuntium_protocol::Request;

use crate::cli::InjectCli;
use crate::client::SocketClient;
use crate::error::{CliError, CliResult};

const CONTENT_PATH: &str = "/mms";
const PUSH_TRANSACTION_ID: u8 = 0x01;

/// The content the fake MMSC hands out.
pub struct ContentServer {
    body: Vec<u8>,
    denials_left: AtomicU32,
    served: Notify,
}

impl ContentServer {
    pub fn new(body: Vec<u8>, denial_count: u32) -> Self {
        Self {
            body,
            denials_left: AtomicU32::new(denial_count),
            served: Notify::new(),
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(CONTENT_PATH, get(serve_content))
            .with_state(self)
    }

    /// Completes once the content went out, even if that happened first.
    pub async fn served(&self) {
        self.served.notified().await;
    }
}

async fn serve_content(State(server): State<Arc<ContentServer>>) -> Response {
    let denied = server
        .denials_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if denied {
        warn!("Denying content request");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    info!(bytes = server.body.len(), "Serving content");
    server.served.notify_one();
    ([(header::CONTENT_TYPE, MMS_CONTENT_TYPE)], server.body.clone()).into_response()
}

pub async fn run(cli: &InjectCli) -> CliResult<()> {
    let content = match &cli.m_retrieve_conf {
        Some(path) => tokio::fs::read(path).await.map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?,
        None => sample_retrieve_conf(&cli.sender)?,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server = Arc::new(ContentServer::new(content, cli.denial_count));
    let app = server.clone().router();
    let shutdown = server.clone();
    let http = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.served().await })
            .await
    });
    let content_location = format!("http://localhost:{port}{CONTENT_PATH}");
    info!(url = %content_location, denials = cli.denial_count, "Content server listening");

    let push = notification_push(cli.notification_sender(), &content_location, server.body.len())?;
    let mut info = BTreeMap::new();
    info.insert("Sender".to_string(), cli.notification_sender().to_string());
    info.insert("LocalSentTime".to_string(), chrono::Local::now().to_rfc3339());

    let client = match &cli.socket_path {
        Some(path) => SocketClient::new(path, Duration::from_secs(5)),
        None => SocketClient::with_defaults(),
    };
    client
        .call(Request::receive_notification(&cli.end_point, push, info))
        .await?;
    info!(agent = %cli.end_point, "Notification delivered, waiting for the download");

    match tokio::time::timeout(Duration::from_secs(cli.wait), http).await {
        Ok(Ok(Ok(()))) => {
            info!("Content served");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(e)) => Err(CliError::Io(std::io::Error::other(e))),
        Err(_) => Err(CliError::Timeout(format!(
            "content not fetched within {}s",
            cli.wait
        ))),
    }
}

/// WSP push carrying an M-Notification.Ind for `content_location`.
pub fn notification_push(sender: &str, content_location: &str, size: usize) -> CliResult<Vec<u8>> {
    let notification = MNotificationInd {
        uuid: Uuid::new_v4(),
        transaction_id: format!("nuntium-inject-{}", Uuid::new_v4().simple()),
        from: Some(format!("{sender}/TYPE=PLMN")),
        class: Some(MessageClass::Personal),
        size: size as u64,
        content_location: content_location.to_string(),
        ..MNotificationInd::default()
    };
    debug!(transaction_id = %notification.transaction_id, "Built notification");
    let pdu = encode_notification_ind(&notification)?;
    Ok(PushPdu::mms(PUSH_TRANSACTION_ID, pdu).encode()?)
}

/// A SMIL + text message from `sender`.
pub fn sample_retrieve_conf(sender: &str) -> CliResult<Vec<u8>> {
    let smil = concat!(
        "<smil><head><layout><region id=\"Text\" top=\"0\" left=\"0\" ",
        "height=\"100%\" width=\"100%\"/></layout></head><body><par dur=\"5000ms\">",
        "<text src=\"text.txt\" region=\"Text\"/></par></body></smil>"
    );
    let conf = MRetrieveConf {
        transaction_id: Some(format!("nuntium-inject-{}", Uuid::new_v4().simple())),
        message_id: Some(Uuid::new_v4().simple().to_string()),
        date: u64::try_from(chrono::Utc::now().timestamp()).ok(),
        from: Some(format!("{sender}/TYPE=PLMN")),
        subject: Some("nuntium-inject".into()),
        content_type: ContentType::new("application/vnd.wap.multipart.related")
            .with_param("type", "application/smil")
            .with_param("start", "<smil>"),
        attachments: vec![
            Attachment::new("application/smil;charset=utf-8", smil.as_bytes().to_vec())
                .with_content_id("<smil>")
                .with_content_location("smil.xml"),
            Attachment::new("text/plain;charset=utf-8", b"Hello from nuntium-inject".to_vec())
                .with_content_id("<text>")
                .with_content_location("text.txt"),
        ],
        ..MRetrieveConf::default()
    };
    Ok(encode_retrieve_conf(&conf)?)
}
