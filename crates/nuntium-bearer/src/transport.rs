//! HTTP transfer through a bearer's proxy.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

use crate::context::Proxy;
use crate::error::{BearerError, BearerResult};
use crate::modem::BoxFuture;

pub const MMS_CONTENT_TYPE: &str = "application/vnd.wap.mms-message";

/// Moves PDUs between the device and the MMSC.
pub trait Transport: Send + Sync {
    /// GETs `url` into `dest`, returning the number of bytes written.
    fn download<'a>(
        &'a self,
        url: &'a str,
        proxy: Option<&'a Proxy>,
        dest: &'a Path,
    ) -> BoxFuture<'a, BearerResult<u64>>;

    /// POSTs an encoded PDU to `url` and returns the response body.
    fn upload<'a>(
        &'a self,
        url: &'a str,
        proxy: Option<&'a Proxy>,
        body: Vec<u8>,
    ) -> BoxFuture<'a, BearerResult<Vec<u8>>>;
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Sent as `x-wap-profile`.
    pub uaprof: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("nuntium/", env!("CARGO_PKG_VERSION")).to_string(),
            uaprof: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// reqwest-backed transport. A client is built per transfer since the proxy
/// changes with the bearer.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    fn client(&self, proxy: Option<&Proxy>) -> Result<Client, String> {
        let mut builder = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent);
        if let Some(uaprof) = &self.config.uaprof {
            let value = HeaderValue::from_str(uaprof).map_err(|e| e.to_string())?;
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-wap-profile", value);
            builder = builder.default_headers(headers);
        }
        builder = match proxy {
            Some(proxy) => {
                builder.proxy(reqwest::Proxy::all(proxy.url()).map_err(|e| e.to_string())?)
            }
            None => builder.no_proxy(),
        };
        builder
            .build()
            .map_err(|e| format!("failed to create HTTP client: {e}"))
    }
}

fn check_status(status: StatusCode) -> Result<(), String> {
    if status.is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {status}"))
    }
}

impl Transport for HttpTransport {
    fn download<'a>(
        &'a self,
        url: &'a str,
        proxy: Option<&'a Proxy>,
        dest: &'a Path,
    ) -> BoxFuture<'a, BearerResult<u64>> {
        Box::pin(async move {
            debug!(url, proxy = ?proxy.map(ToString::to_string), "GET");
            let client = self.client(proxy).map_err(BearerError::DownloadFailed)?;
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| BearerError::DownloadFailed(e.to_string()))?;
            check_status(response.status()).map_err(BearerError::DownloadFailed)?;
            let body = response
                .bytes()
                .await
                .map_err(|e| BearerError::DownloadFailed(e.to_string()))?;
            tokio::fs::write(dest, &body)
                .await
                .map_err(|e| BearerError::DownloadFailed(format!("{}: {e}", dest.display())))?;
            trace!(bytes = body.len(), dest = %dest.display(), "Downloaded");
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
            debug!(url, bytes = body.len(), proxy = ?proxy.map(ToString::to_string), "POST");
            let client = self.client(proxy).map_err(BearerError::UploadFailed)?;
            let response = client
                .post(url)
                .header(CONTENT_TYPE, MMS_CONTENT_TYPE)
                .body(body)
                .send()
                .await
                .map_err(|e| BearerError::UploadFailed(e.to_string()))?;
            check_status(response.status()).map_err(BearerError::UploadFailed)?;
            let reply = response
                .bytes()
                .await
                .map_err(|e| BearerError::UploadFailed(e.to_string()))?;
            Ok(reply.to_vec())
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn download_writes_file() {
        let base = serve(
            Router::new()
                .route("/mms", get(|| async { vec![0x8Cu8, 0x84, 0x98] }))
                .route("/gone", get(|| async { AxumStatus::SERVICE_UNAVAILABLE })),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("blob");
        let transport = HttpTransport::default();

        let written = transport
            .download(&format!("{base}/mms"), None, &dest)
            .await
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(std::fs::read(&dest).unwrap(), [0x8C, 0x84, 0x98]);

        let err = transport
            .download(&format!("{base}/gone"), None, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, BearerError::DownloadFailed(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn upload_posts_mms_content_type() {
        let base = serve(Router::new().route(
            "/mmsc",
            post(|headers: HeaderMap, body: Bytes| async move {
                let ctype = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let profile = headers
                    .get("x-wap-profile")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                format!("{ctype}|{profile}|{}", body.len())
            }),
        ))
        .await;
        let transport = HttpTransport::new(HttpConfig {
            uaprof: Some("http://example.net/ua.xml".into()),
            ..HttpConfig::default()
        });

        let reply = transport
            .upload(&format!("{base}/mmsc"), None, vec![0x8C, 0x80])
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(reply).unwrap(),
            "application/vnd.wap.mms-message|http://example.net/ua.xml|2"
        );
    }

    #[tokio::test]
    async fn unreachable_proxy_fails_upload() {
        let transport = HttpTransport::new(HttpConfig {
            timeout: Duration::from_secs(2),
            ..HttpConfig::default()
        });
        let proxy = Proxy {
            host: "127.0.0.1".into(),
            port: 1,
        };
        let err = transport
            .upload("http://mmsc.invalid/", Some(&proxy), vec![0x8C])
            .await
            .unwrap_err();
        assert!(matches!(err, BearerError::UploadFailed(_)));
    }
}
