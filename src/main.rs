use nginx_proxy_exporter::cli::{apply_matches, build_cli};
use nginx_proxy_exporter::client::{build_http_client, status_source};
use nginx_proxy_exporter::collector::NginxCollector;
use nginx_proxy_exporter::config::Settings;
use nginx_proxy_exporter::metrics::NAMESPACE;
use nginx_proxy_exporter::monitoring::setup_logging;
use nginx_proxy_exporter::server;
use nginx_proxy_exporter::version::{
    BUILD_PROFILE, BUILD_TIME, GIT_BRANCH, GIT_HASH, VERSION, version_info,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let matches = build_cli().get_matches();

    if matches.get_flag("version-info") {
        println!("{}", version_info());
        return Ok(());
    }

    // 配置文件 < 环境变量 / 命令行参数
    let config_file = matches.get_one::<PathBuf>("config");
    let mut settings = Settings::load(config_file.map(PathBuf::as_path)).await?;
    apply_matches(&mut settings, &matches)?;
    settings.validate()?;

    setup_logging(&settings.logging.level)?;

    info!("Starting NGINX Prometheus Exporter v{}", VERSION);
    info!("Build: {} ({})", GIT_HASH, BUILD_TIME);
    info!("Branch: {} | Profile: {}", GIT_BRANCH, BUILD_PROFILE);
    info!("  Listen: {}", settings.web.listen_address);
    info!("  Telemetry path: {}", settings.web.telemetry_path);
    info!("  NGINX config: {}", settings.nginx.config_path.display());
    info!("  Scrape URIs: {}", settings.nginx.scrape_uris.join(", "));

    let http_client = build_http_client(&settings.nginx)?;

    let mut collectors = Vec::with_capacity(settings.nginx.scrape_uris.len());
    for uri in &settings.nginx.scrape_uris {
        let source = status_source(uri, &http_client, &settings.nginx)?;
        let collector = NginxCollector::new(
            source,
            NAMESPACE,
            settings.const_labels_for(uri),
            settings.nginx.config_path.clone(),
        )?;

        for desc in collector.describe() {
            debug!("Registered metric {} for {}", desc.fq_name, uri);
        }
        collectors.push(Arc::new(collector));
    }

    server::run(
        collectors.into(),
        settings.web.listen_address,
        settings.web.telemetry_path.clone(),
    )
    .await?;

    info!("NGINX Prometheus Exporter stopped");
    Ok(())
}
