use crate::client::ScrapeAddress;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::fs;
use tracing::info;

static LABEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label name pattern"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub web: WebConfig,
    pub nginx: NginxConfig,
    pub prometheus: PrometheusConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub listen_address: SocketAddr,
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 9113)),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxConfig {
    pub scrape_uris: Vec<String>,
    pub config_path: PathBuf,
    /// 状态端点请求超时，TOML 中写作 "5s"、"1m" 等
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub ssl_verify: bool,
    pub ssl_ca_cert: Option<PathBuf>,
    pub ssl_client_cert: Option<PathBuf>,
    pub ssl_client_key: Option<PathBuf>,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            scrape_uris: vec!["http://127.0.0.1:8080/stub_status".to_string()],
            config_path: PathBuf::from("/etc/nginx/nginx.conf"),
            timeout: Duration::from_secs(5),
            ssl_verify: false,
            ssl_ca_cert: None,
            ssl_client_cert: None,
            ssl_client_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub const_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// 从 TOML 文件加载配置，未指定路径时使用默认值
    pub async fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path).await,
            None => Ok(Self::default()),
        }
    }

    pub async fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let content = fs::read_to_string(config_path)
            .await
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        info!("Configuration loaded from {}", config_path.display());
        Ok(settings)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.nginx.scrape_uris.is_empty() {
            anyhow::bail!("no scrape addresses provided");
        }

        // 重复地址会生成标签完全相同的两组指标，抓取时注册冲突
        let mut seen = HashSet::new();
        for uri in &self.nginx.scrape_uris {
            ScrapeAddress::parse(uri)?;
            if !seen.insert(uri.as_str()) {
                anyhow::bail!("scrape URI listed more than once: {}", uri);
            }
        }

        if self.nginx.timeout.is_zero() {
            anyhow::bail!("nginx timeout must be positive");
        }

        if !self.web.telemetry_path.starts_with('/') {
            anyhow::bail!(
                "telemetry path must start with '/': {}",
                self.web.telemetry_path
            );
        }

        for name in self.prometheus.const_labels.keys() {
            validate_label_name(name)?;
        }

        Ok(())
    }

    /// 指定抓取地址的常量标签；多个抓取地址时附加 addr 标签
    pub fn const_labels_for(&self, scrape_uri: &str) -> HashMap<String, String> {
        let mut labels: HashMap<String, String> = self
            .prometheus
            .const_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if self.nginx.scrape_uris.len() > 1 {
            labels.insert("addr".to_string(), scrape_uri.to_string());
        }

        labels
    }
}

/// 解析 `key=value` 形式的常量标签
pub fn parse_const_label(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("Const label must be in key=value form: {}", raw))?;
    let name = name.trim();
    validate_label_name(name)?;
    Ok((name.to_string(), value.to_string()))
}

fn validate_label_name(name: &str) -> Result<()> {
    if !LABEL_NAME.is_match(name) || name.starts_with("__") {
        anyhow::bail!("Invalid label name: {:?}", name);
    }
    Ok(())
}
