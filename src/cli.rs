use crate::config::{Settings, parse_const_label};
use crate::version::VERSION;
use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub fn build_cli() -> Command {
    Command::new("nginx-proxy-exporter")
        .version(VERSION)
        .about("Prometheus exporter for NGINX stub_status, config freshness and proxy targets")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Optional TOML configuration file"),
        )
        .arg(
            Arg::new("version-info")
                .long("version-info")
                .help("Show detailed version and build information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("listen-address")
                .long("web.listen-address")
                .env("LISTEN_ADDRESS")
                .value_name("ADDR")
                .value_parser(value_parser!(SocketAddr))
                .help("Address to expose metrics and web interface on [default: 0.0.0.0:9113]"),
        )
        .arg(
            Arg::new("telemetry-path")
                .long("web.telemetry-path")
                .env("TELEMETRY_PATH")
                .value_name("PATH")
                .help("Path under which to expose metrics [default: /metrics]"),
        )
        .arg(
            Arg::new("scrape-uri")
                .long("nginx.scrape-uri")
                .env("SCRAPE_URI")
                .value_name("URI")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .help("URI or unix:<socket>[:<path>] address of the NGINX stub_status page; repeatable [default: http://127.0.0.1:8080/stub_status]"),
        )
        .arg(
            Arg::new("timeout")
                .long("nginx.timeout")
                .env("TIMEOUT")
                .value_name("DURATION")
                .value_parser(parse_timeout)
                .help("Timeout for scraping the stub_status page, e.g. 5s or 1m [default: 5s]"),
        )
        .arg(
            Arg::new("ssl-verify")
                .long("nginx.ssl-verify")
                .env("SSL_VERIFY")
                .action(ArgAction::SetTrue)
                .help("Perform SSL certificate verification"),
        )
        .arg(
            Arg::new("ssl-ca-cert")
                .long("nginx.ssl-ca-cert")
                .env("SSL_CA_CERT")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("PEM encoded CA certificate used to validate the server certificate"),
        )
        .arg(
            Arg::new("ssl-client-cert")
                .long("nginx.ssl-client-cert")
                .env("SSL_CLIENT_CERT")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("PEM encoded client certificate"),
        )
        .arg(
            Arg::new("ssl-client-key")
                .long("nginx.ssl-client-key")
                .env("SSL_CLIENT_KEY")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("PEM encoded client certificate key"),
        )
        .arg(
            Arg::new("config-path")
                .long("nginx.config-path")
                .env("CONFIG_PATH")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the NGINX configuration file [default: /etc/nginx/nginx.conf]"),
        )
        .arg(
            Arg::new("const-label")
                .long("prometheus.const-label")
                .env("CONST_LABELS")
                .value_name("KEY=VALUE")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .help("Label added to every metric; repeatable"),
        )
        .arg(
            Arg::new("log-level")
                .long("log.level")
                .env("LOG_LEVEL")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Log level [default: info]"),
        )
}

/// 解析超时：带单位的时长（5s、500ms、1m）或不带单位的秒数
fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let timeout = match raw.trim().parse::<u64>() {
        Ok(seconds) => Duration::from_secs(seconds),
        Err(_) => humantime::parse_duration(raw.trim()).map_err(|e| e.to_string())?,
    };

    if timeout.is_zero() {
        return Err("timeout must be positive".to_string());
    }
    Ok(timeout)
}

/// 将命令行参数 / 环境变量覆盖到配置上
pub fn apply_matches(settings: &mut Settings, matches: &ArgMatches) -> Result<()> {
    if let Some(addr) = matches.get_one::<SocketAddr>("listen-address") {
        settings.web.listen_address = *addr;
    }
    if let Some(path) = matches.get_one::<String>("telemetry-path") {
        settings.web.telemetry_path = path.clone();
    }
    if let Some(uris) = matches.get_many::<String>("scrape-uri") {
        settings.nginx.scrape_uris = uris.cloned().collect();
    }
    if let Some(timeout) = matches.get_one::<Duration>("timeout") {
        settings.nginx.timeout = *timeout;
    }
    if matches!(
        matches.value_source("ssl-verify"),
        Some(ValueSource::CommandLine | ValueSource::EnvVariable)
    ) {
        settings.nginx.ssl_verify = matches.get_flag("ssl-verify");
    }
    if let Some(path) = matches.get_one::<PathBuf>("ssl-ca-cert") {
        settings.nginx.ssl_ca_cert = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("ssl-client-cert") {
        settings.nginx.ssl_client_cert = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("ssl-client-key") {
        settings.nginx.ssl_client_key = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("config-path") {
        settings.nginx.config_path = path.clone();
    }
    if let Some(labels) = matches.get_many::<String>("const-label") {
        for raw in labels {
            let (name, value) = parse_const_label(raw)
                .with_context(|| format!("Invalid --prometheus.const-label value: {}", raw))?;
            settings.prometheus.const_labels.insert(name, value);
        }
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        settings.logging.level = level.clone();
    }

    Ok(())
}
