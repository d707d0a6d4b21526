pub mod directives;
pub mod discovery;

use crate::client::{StatusSource, StubStats};
use crate::health::{HealthChecker, TargetHealth};
use crate::metrics::{MetricSet, MetricsError};
use discovery::ConfigFile;
use prometheus::Registry;
use prometheus::core::Desc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// 单个配置文件及其所有代理目标的探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileHealth {
    pub file: ConfigFile,
    pub targets: Vec<TargetHealth>,
}

/// 一次采集周期的完整结果
///
/// 每个周期重新构建，以返回值的形式整体交给调用方。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSnapshot {
    /// 状态端点失败时为 None
    pub status: Option<StubStats>,
    pub files: Vec<ConfigFileHealth>,
}

impl CollectionSnapshot {
    pub fn is_up(&self) -> bool {
        self.status.is_some()
    }
}

/// NGINX 采集器
///
/// 合并 stub_status 实时计数与配置文件派生的状态（文件修改时间、
/// proxy_pass 目标可达性）。同一个采集器上的采集周期互斥执行：
/// 并发的抓取请求依次等待，各自执行一个完整的周期。
pub struct NginxCollector {
    status_source: Arc<dyn StatusSource>,
    config_path: PathBuf,
    health_checker: HealthChecker,
    metrics: MetricSet,
    cycle_lock: Mutex<()>,
}

impl NginxCollector {
    pub fn new(
        status_source: Arc<dyn StatusSource>,
        namespace: &str,
        const_labels: HashMap<String, String>,
        config_path: impl Into<PathBuf>,
    ) -> Result<Self, MetricsError> {
        Ok(Self {
            status_source,
            config_path: config_path.into(),
            health_checker: HealthChecker::default(),
            metrics: MetricSet::new(namespace, const_labels)?,
            cycle_lock: Mutex::new(()),
        })
    }

    /// 调整 TCP 探测超时
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.health_checker = HealthChecker::new(timeout);
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 全部指标描述符，不获取采集锁，可随时调用
    pub fn describe(&self) -> &[Desc] {
        self.metrics.describe()
    }

    /// 执行一次完整的采集周期
    ///
    /// 状态端点失败只影响 up 和实时计数；配置文件与目标探测始终执行。
    pub async fn collect(&self) -> CollectionSnapshot {
        let _cycle = self.cycle_lock.lock().await;
        let start_time = Instant::now();

        let status = match self.status_source.fetch().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(
                    "Error getting stats from {}: {}",
                    self.status_source.endpoint(),
                    e
                );
                None
            }
        };

        let files = self.collect_config_health().await;

        debug!(
            "Collection cycle finished in {:?} (up = {}, files = {})",
            start_time.elapsed(),
            status.is_some(),
            files.len()
        );

        CollectionSnapshot { status, files }
    }

    /// 采集一次并写入注册表
    pub async fn collect_into(&self, registry: &Registry) -> Result<(), MetricsError> {
        let snapshot = self.collect().await;
        self.metrics.render(&snapshot, registry)
    }

    async fn collect_config_health(&self) -> Vec<ConfigFileHealth> {
        let primary = self.config_path.clone();
        let files = match tokio::task::spawn_blocking(move || discovery::discover(&primary)).await
        {
            Ok(files) => files,
            Err(e) => {
                error!("Config file discovery failed: {}", e);
                return Vec::new();
            }
        };

        debug!(
            "Discovered config files: {:?}",
            files.iter().map(|f| f.path.display().to_string()).collect::<Vec<_>>()
        );

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let targets = match tokio::fs::read(&file.path).await {
                Ok(content) => {
                    directives::extract_proxy_targets(&String::from_utf8_lossy(&content))
                }
                Err(e) => {
                    warn!(
                        "Failed to read config file {}, skipping target extraction: {}",
                        file.path.display(),
                        e
                    );
                    Vec::new()
                }
            };

            let targets = self.health_checker.check_all(targets).await;
            results.push(ConfigFileHealth { file, targets });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{StatusError, StubConnections};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    /// 可注入延迟与失败的状态来源
    struct FakeStatus {
        delay: Duration,
        fail: bool,
        fetch_starts: std::sync::Mutex<Vec<Instant>>,
    }

    impl FakeStatus {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delay,
                fail,
                fetch_starts: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl StatusSource for FakeStatus {
        async fn fetch(&self) -> Result<StubStats, StatusError> {
            self.fetch_starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.delay).await;

            if self.fail {
                Err(StatusError::Parse {
                    body: "garbage".to_string(),
                })
            } else {
                Ok(StubStats {
                    connections: StubConnections {
                        active: 1,
                        ..StubConnections::default()
                    },
                    requests: 7,
                })
            }
        }

        fn endpoint(&self) -> &str {
            "fake://status"
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    fn collector(status: Arc<FakeStatus>, config_path: &Path) -> NginxCollector {
        NginxCollector::new(status, "nginx", HashMap::new(), config_path)
            .unwrap()
            .with_probe_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_direct_target_unreachable() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("nginx.conf");
        let target = format!("127.0.0.1:{}", closed_port().await);
        fs::write(&primary, format!("location / {{ proxy_pass http://{}; }}", target)).unwrap();

        let snapshot = collector(FakeStatus::new(Duration::ZERO, false), &primary)
            .collect()
            .await;

        assert!(snapshot.is_up());
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.files[0].file.path, primary);
        assert_eq!(
            snapshot.files[0].targets,
            vec![TargetHealth {
                target,
                reachable: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_upstream_targets_probed_per_member() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("nginx.conf");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();
        let closed = format!("127.0.0.1:{}", closed_port().await);
        fs::write(
            &primary,
            format!("upstream b {{ server {}; server {}; }}\nproxy_pass http://b;\n", open, closed),
        )
        .unwrap();

        let snapshot = collector(FakeStatus::new(Duration::ZERO, false), &primary)
            .collect()
            .await;

        assert_eq!(
            snapshot.files[0].targets,
            vec![
                TargetHealth {
                    target: open,
                    reachable: true,
                },
                TargetHealth {
                    target: closed,
                    reachable: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_status_failure_keeps_config_state() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("nginx.conf");
        fs::write(&primary, "proxy_pass http://127.0.0.1:1;").unwrap();
        fs::create_dir_all(dir.path().join("conf.d")).unwrap();
        fs::write(dir.path().join("conf.d/app.conf"), "server { listen 80; }").unwrap();

        let snapshot = collector(FakeStatus::new(Duration::ZERO, true), &primary)
            .collect()
            .await;

        assert!(!snapshot.is_up());
        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(snapshot.files[0].targets.len(), 1);
        assert!(snapshot.files[1].targets.is_empty());
    }

    #[tokio::test]
    async fn test_missing_config_yields_no_files() {
        let dir = TempDir::new().unwrap();
        let snapshot = collector(
            FakeStatus::new(Duration::ZERO, false),
            &dir.path().join("nginx.conf"),
        )
        .collect()
        .await;

        assert!(snapshot.is_up());
        assert!(snapshot.files.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_collections_are_serialized() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("nginx.conf");
        fs::write(&primary, "events {}").unwrap();

        let delay = Duration::from_millis(200);
        let status = FakeStatus::new(delay, false);
        let collector = Arc::new(collector(status.clone(), &primary));

        let first = tokio::spawn({
            let collector = collector.clone();
            async move { collector.collect().await }
        });
        let second = tokio::spawn({
            let collector = collector.clone();
            async move { collector.collect().await }
        });

        assert!(first.await.unwrap().is_up());
        assert!(second.await.unwrap().is_up());

        let starts = status.fetch_starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 2);
        let gap = if starts[1] > starts[0] {
            starts[1] - starts[0]
        } else {
            starts[0] - starts[1]
        };
        assert!(gap >= delay, "cycles overlapped: gap {:?}", gap);
    }

    #[tokio::test]
    async fn test_describe_does_not_wait_for_cycle() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("nginx.conf");
        let collector = Arc::new(collector(
            FakeStatus::new(Duration::from_millis(300), false),
            &primary,
        ));

        let running = tokio::spawn({
            let collector = collector.clone();
            async move { collector.collect().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = Instant::now();
        assert_eq!(collector.describe().len(), 10);
        assert!(start.elapsed() < Duration::from_millis(100));

        running.await.unwrap();
    }
}
