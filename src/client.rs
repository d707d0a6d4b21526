use crate::config::NginxConfig;
use crate::tls;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

/// stub_status 页面的固定格式
static STUB_STATUS_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^Active connections:[ \t]*(\d+)[ \t]*\r?\n",
        r"server accepts handled requests[ \t]*\r?\n",
        r"[ \t]*(\d+)[ \t]+(\d+)[ \t]+(\d+)[ \t]*\r?\n",
        r"Reading:[ \t]*(\d+)[ \t]+Writing:[ \t]*(\d+)[ \t]+Waiting:[ \t]*(\d+)[ \t]*\s*$",
    ))
    .expect("stub_status pattern")
});

/// 连接相关计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubConnections {
    pub active: u64,
    pub accepted: u64,
    pub handled: u64,
    pub reading: u64,
    pub writing: u64,
    pub waiting: u64,
}

/// stub_status 页面的实时计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubStats {
    pub connections: StubConnections,
    pub requests: u64,
}

/// 状态端点错误
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("failed to get {uri}: {source}")]
    Request {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("expected 200 response, got {0}")]
    UnexpectedStatus(StatusCode),

    #[error("failed to read the response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP exchange with {uri} failed: {source}")]
    Http {
        uri: String,
        #[source]
        source: hyper::Error,
    },

    #[error("no response from {uri} within {timeout:?}")]
    Timeout { uri: String, timeout: Duration },

    #[error("failed to parse response body {body:?}")]
    Parse { body: String },
}

/// 实时计数来源
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// 获取一次最新的 stub_status 计数
    async fn fetch(&self) -> Result<StubStats, StatusError>;

    /// 端点地址，用于日志
    fn endpoint(&self) -> &str;
}

/// stub_status HTTP 客户端
pub struct NginxClient {
    http_client: Client,
    api_endpoint: String,
}

impl NginxClient {
    pub fn new(http_client: Client, api_endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            api_endpoint: api_endpoint.into(),
        }
    }

    /// 拉取并解析 stub_status 页面
    pub async fn get_stub_stats(&self) -> Result<StubStats, StatusError> {
        let response = self
            .http_client
            .get(&self.api_endpoint)
            .send()
            .await
            .map_err(|source| StatusError::Request {
                uri: self.api_endpoint.clone(),
                source,
            })?;

        if response.status() != StatusCode::OK {
            return Err(StatusError::UnexpectedStatus(response.status()));
        }

        let body = response.text().await.map_err(StatusError::Body)?;
        debug!("stub_status from {}: {} bytes", self.api_endpoint, body.len());

        parse_stub_stats(&body)
    }
}

#[async_trait]
impl StatusSource for NginxClient {
    async fn fetch(&self) -> Result<StubStats, StatusError> {
        self.get_stub_stats().await
    }

    fn endpoint(&self) -> &str {
        &self.api_endpoint
    }
}

/// 按固定模板解析 stub_status 正文，任何偏差都视为失败
pub fn parse_stub_stats(body: &str) -> Result<StubStats, StatusError> {
    let parse_error = || StatusError::Parse {
        body: body.to_string(),
    };

    let captures = STUB_STATUS_TEMPLATE.captures(body).ok_or_else(parse_error)?;
    let field = |index: usize| -> Result<u64, StatusError> {
        captures[index].parse::<u64>().map_err(|_| parse_error())
    };

    Ok(StubStats {
        connections: StubConnections {
            active: field(1)?,
            accepted: field(2)?,
            handled: field(3)?,
            reading: field(5)?,
            writing: field(6)?,
            waiting: field(7)?,
        },
        requests: field(4)?,
    })
}

/// 抓取地址：HTTP(S) URL 或 `unix:<socket>[:<request-path>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeAddress {
    Http(String),
    UnixSocket {
        socket_path: PathBuf,
        request_path: String,
    },
}

impl ScrapeAddress {
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(rest) = uri.strip_prefix("unix:") {
            let mut parts = rest.split(':');
            let socket_path = parts.next().unwrap_or_default();
            let request_path = parts.next().unwrap_or_default();
            if parts.next().is_some() || socket_path.is_empty() {
                anyhow::bail!("address for unix domain socket has wrong format: {}", uri);
            }

            let request_path = if request_path.is_empty() {
                "/".to_string()
            } else {
                request_path.to_string()
            };
            if !request_path.starts_with('/') {
                anyhow::bail!("unix domain socket request path must start with '/': {}", uri);
            }

            return Ok(Self::UnixSocket {
                socket_path: PathBuf::from(socket_path),
                request_path,
            });
        }

        let parsed =
            reqwest::Url::parse(uri).with_context(|| format!("Invalid scrape URI: {}", uri))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Scrape URI must use http or https: {}", uri);
        }
        Ok(Self::Http(uri.to_string()))
    }
}

/// 为一个抓取地址创建对应的状态来源
pub fn status_source(
    uri: &str,
    http_client: &Client,
    config: &NginxConfig,
) -> Result<Arc<dyn StatusSource>> {
    match ScrapeAddress::parse(uri)? {
        ScrapeAddress::Http(endpoint) => {
            Ok(Arc::new(NginxClient::new(http_client.clone(), endpoint)))
        }
        #[cfg(unix)]
        ScrapeAddress::UnixSocket {
            socket_path,
            request_path,
        } => Ok(Arc::new(crate::unix_socket::UnixSocketClient::new(
            socket_path,
            &request_path,
            config.timeout,
        )?)),
        #[cfg(not(unix))]
        ScrapeAddress::UnixSocket { .. } => {
            anyhow::bail!("unix domain sockets are not supported on this platform: {}", uri)
        }
    }
}

/// User-Agent 头
pub fn user_agent() -> String {
    format!("NGINX-Prometheus-Exporter/v{}", env!("CARGO_PKG_VERSION"))
}

/// 根据配置创建状态端点使用的 HTTP 客户端
pub fn build_http_client(config: &NginxConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .user_agent(user_agent())
        .danger_accept_invalid_certs(!config.ssl_verify);

    if let Some(ca_path) = &config.ssl_ca_cert {
        for certificate in tls::load_root_certificates(ca_path)? {
            builder = builder.add_root_certificate(certificate);
        }
    }

    match (&config.ssl_client_cert, &config.ssl_client_key) {
        (Some(cert_path), Some(key_path)) => {
            builder = builder.identity(tls::load_identity(cert_path, key_path)?);
        }
        (None, None) => {}
        _ => anyhow::bail!("ssl_client_cert and ssl_client_key must be set together"),
    }

    builder.build().context("Failed to build HTTP client")
}
