use crate::collector::NginxCollector;
use crate::metrics::{MetricsError, register_build_info};
use crate::shutdown::{self, SHUTDOWN_TIMEOUT};
use crate::version::VERSION;
use anyhow::{Context, Result};
use prometheus::{Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// 共享的采集器列表
pub type Collectors = Arc<[Arc<NginxCollector>]>;

/// 执行一次抓取：构建新的注册表，依次采集所有采集器并编码为文本格式
pub async fn gather(collectors: &[Arc<NginxCollector>]) -> Result<String, MetricsError> {
    let registry = Registry::new();
    register_build_info(&registry)?;

    for collector in collectors {
        collector.collect_into(&registry).await?;
    }

    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&registry.gather())?)
}

/// HTTP 路由：指标路径 + 根路径上的说明页
pub fn routes(
    collectors: Collectors,
    telemetry_path: String,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::get()
        .and(warp::path::full())
        .and_then(move |path: FullPath| {
            let collectors = collectors.clone();
            let telemetry_path = telemetry_path.clone();
            async move { handle(path.as_str(), &telemetry_path, &collectors).await }
        })
}

async fn handle(
    path: &str,
    telemetry_path: &str,
    collectors: &[Arc<NginxCollector>],
) -> Result<Response, Rejection> {
    if path == telemetry_path {
        return Ok(match gather(collectors).await {
            Ok(body) => {
                warp::reply::with_header(body, "content-type", prometheus::TEXT_FORMAT)
                    .into_response()
            }
            Err(e) => {
                error!("Failed to render metrics: {}", e);
                warp::reply::with_status(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response()
            }
        });
    }

    if path == "/" {
        return Ok(warp::reply::html(landing_page(telemetry_path)).into_response());
    }

    Err(warp::reject::not_found())
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
        <head><title>NGINX Prometheus Exporter</title></head>\n\
        <body>\n\
        <h1>NGINX Prometheus Exporter</h1>\n\
        <p>Prometheus Exporter for NGINX (version {})</p>\n\
        <ul><li><a href=\"{}\">Metrics</a></li></ul>\n\
        </body>\n\
        </html>\n",
        VERSION, telemetry_path
    )
}

/// 启动 HTTP 服务，直到收到关机信号
pub async fn run(
    collectors: Collectors,
    listen_address: SocketAddr,
    telemetry_path: String,
) -> Result<()> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let (bound, server) = warp::serve(routes(collectors, telemetry_path.clone()))
        .try_bind_with_graceful_shutdown(listen_address, async move {
            let _ = stop_rx.await;
        })
        .with_context(|| format!("Failed to bind {}", listen_address))?;

    info!("Listening on http://{}{}", bound, telemetry_path);
    let server = tokio::spawn(server);

    let signal = shutdown::wait_for_signal().await;
    info!("Shutting down ({})", signal);
    let _ = stop_tx.send(());

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, server).await {
        Ok(Ok(())) => info!("HTTP server closed"),
        Ok(Err(e)) => error!("HTTP server task failed: {}", e),
        Err(_) => warn!(
            "HTTP server did not finish within {:?}, exiting",
            SHUTDOWN_TIMEOUT
        ),
    }

    Ok(())
}
