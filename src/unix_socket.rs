use crate::client::{StatusError, StatusSource, StubStats, parse_stub_stats, user_agent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HOST, HeaderValue, USER_AGENT};
use hyper::{Request, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::debug;

/// 通过 unix domain socket 访问 stub_status 的客户端
///
/// 每次抓取新建一条连接，发送一个 HTTP/1.1 GET 请求。
pub struct UnixSocketClient {
    socket_path: PathBuf,
    request_uri: Uri,
    user_agent: HeaderValue,
    timeout: Duration,
    endpoint: String,
}

impl UnixSocketClient {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        request_path: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let socket_path = socket_path.into();
        let request_uri = request_path
            .parse::<Uri>()
            .with_context(|| format!("Invalid request path: {}", request_path))?;
        let user_agent =
            HeaderValue::from_str(&user_agent()).context("Invalid User-Agent header value")?;
        let endpoint = format!("unix:{}:{}", socket_path.display(), request_path);

        Ok(Self {
            socket_path,
            request_uri,
            user_agent,
            timeout,
            endpoint,
        })
    }

    /// 拉取并解析 stub_status 页面，整个交换受超时限制
    pub async fn get_stub_stats(&self) -> Result<StubStats, StatusError> {
        match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(StatusError::Timeout {
                uri: self.endpoint.clone(),
                timeout: self.timeout,
            }),
        }
    }

    async fn exchange(&self) -> Result<StubStats, StatusError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| StatusError::Connect {
                uri: self.endpoint.clone(),
                source,
            })?;

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|source| self.http_error(source))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Unix socket connection closed with error: {}", e);
            }
        });

        let mut request = Request::new(Full::new(Bytes::new()));
        *request.uri_mut() = self.request_uri.clone();
        request
            .headers_mut()
            .insert(HOST, HeaderValue::from_static("localhost"));
        request
            .headers_mut()
            .insert(USER_AGENT, self.user_agent.clone());

        let response = sender
            .send_request(request)
            .await
            .map_err(|source| self.http_error(source))?;

        if response.status() != StatusCode::OK {
            return Err(StatusError::UnexpectedStatus(response.status()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|source| self.http_error(source))?
            .to_bytes();
        debug!("stub_status from {}: {} bytes", self.endpoint, body.len());

        parse_stub_stats(&String::from_utf8_lossy(&body))
    }

    fn http_error(&self, source: hyper::Error) -> StatusError {
        StatusError::Http {
            uri: self.endpoint.clone(),
            source,
        }
    }
}

#[async_trait]
impl StatusSource for UnixSocketClient {
    async fn fetch(&self) -> Result<StubStats, StatusError> {
        self.get_stub_stats().await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
