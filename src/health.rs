use std::borrow::Cow;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error};

/// TCP 探测超时
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// 目标未写端口时使用的默认端口
pub const DEFAULT_PORT: u16 = 80;

/// 单个代理目标的可达性结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHealth {
    pub target: String,
    pub reachable: bool,
}

/// 健康检查器 - 对代理目标做一次性 TCP 连接探测
///
/// 连接失败（拒绝、超时、DNS 解析失败）都是正常结果，记为不可达，
/// 不会作为错误返回给调用方。
#[derive(Debug, Clone)]
pub struct HealthChecker {
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 探测单个目标
    pub async fn check(&self, target: &str) -> bool {
        let address = probe_address(target);
        let start_time = Instant::now();

        match timeout(self.timeout, TcpStream::connect(address.as_ref())).await {
            Ok(Ok(stream)) => {
                drop(stream);
                debug!(
                    "Probe to {} succeeded in {:?}",
                    address,
                    start_time.elapsed()
                );
                true
            }
            Ok(Err(e)) => {
                debug!("Probe to {} failed: {}", address, e);
                false
            }
            Err(_) => {
                debug!("Probe to {} timed out after {:?}", address, self.timeout);
                false
            }
        }
    }

    /// 并发探测一组目标，结果顺序与输入一致，每个出现位置各探测一次
    pub async fn check_all(&self, targets: Vec<String>) -> Vec<TargetHealth> {
        let mut check_tasks = Vec::with_capacity(targets.len());

        for target in targets {
            let checker = self.clone();
            let task = tokio::spawn(async move {
                let reachable = checker.check(&target).await;
                TargetHealth { target, reachable }
            });
            check_tasks.push(task);
        }

        let mut results = Vec::with_capacity(check_tasks.len());
        for task in check_tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    // 任务 panic 时目标名称已随任务丢失，只能记录日志
                    error!("Probe task failed: {}", e);
                }
            }
        }

        results
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(PROBE_TIMEOUT)
    }
}

/// 未带端口的目标补上默认端口
pub fn probe_address(target: &str) -> Cow<'_, str> {
    if target.contains(':') {
        Cow::Borrowed(target)
    } else {
        Cow::Owned(format!("{}:{}", target, DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn test_probe_address_default_port() {
        assert_eq!(probe_address("backend.local"), "backend.local:80");
        assert_eq!(probe_address("10.0.0.1:8080"), "10.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_check_listening_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checker = HealthChecker::new(Duration::from_secs(1));
        assert!(checker.check(&addr.to_string()).await);
    }

    #[tokio::test]
    async fn test_check_closed_port_fails_fast() {
        let port = closed_port().await;
        let checker = HealthChecker::new(Duration::from_millis(500));

        let start = Instant::now();
        assert!(!checker.check(&format!("127.0.0.1:{}", port)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_check_is_bounded_by_timeout() {
        let checker = HealthChecker::new(Duration::from_millis(200));

        // 结果取决于运行环境的网络，这里只要求在超时附近返回
        let start = Instant::now();
        let _ = checker.check("10.255.255.1:9").await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_check_all_keeps_order_and_duplicates() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();
        let closed = format!("127.0.0.1:{}", closed_port().await);

        let checker = HealthChecker::new(Duration::from_millis(500));
        let results = checker
            .check_all(vec![open.clone(), closed.clone(), open.clone()])
            .await;

        assert_eq!(
            results,
            vec![
                TargetHealth {
                    target: open.clone(),
                    reachable: true,
                },
                TargetHealth {
                    target: closed,
                    reachable: false,
                },
                TargetHealth {
                    target: open,
                    reachable: true,
                },
            ]
        );
    }
}
