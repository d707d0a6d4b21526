use crate::collector::CollectionSnapshot;
use crate::version;
use prometheus::core::Desc;
use prometheus::{IntCounter, IntGauge, IntGaugeVec, Opts, Registry};
use std::collections::HashMap;

/// 默认指标命名空间
pub const NAMESPACE: &str = "nginx";

/// 指标错误类型
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Gauge,
    Counter,
}

/// 单个指标的静态定义
#[derive(Debug)]
struct MetricDef {
    name: &'static str,
    help: &'static str,
    kind: MetricKind,
    labels: &'static [&'static str],
}

const UP: MetricDef = MetricDef {
    name: "up",
    help: "Status of the last metric scrape",
    kind: MetricKind::Gauge,
    labels: &[],
};

const CONNECTIONS_ACTIVE: MetricDef = MetricDef {
    name: "connections_active",
    help: "Active client connections",
    kind: MetricKind::Gauge,
    labels: &[],
};

const CONNECTIONS_ACCEPTED: MetricDef = MetricDef {
    name: "connections_accepted",
    help: "Accepted client connections",
    kind: MetricKind::Counter,
    labels: &[],
};

const CONNECTIONS_HANDLED: MetricDef = MetricDef {
    name: "connections_handled",
    help: "Handled client connections",
    kind: MetricKind::Counter,
    labels: &[],
};

const CONNECTIONS_READING: MetricDef = MetricDef {
    name: "connections_reading",
    help: "Connections where NGINX is reading the request header",
    kind: MetricKind::Gauge,
    labels: &[],
};

const CONNECTIONS_WRITING: MetricDef = MetricDef {
    name: "connections_writing",
    help: "Connections where NGINX is writing the response back to the client",
    kind: MetricKind::Gauge,
    labels: &[],
};

const CONNECTIONS_WAITING: MetricDef = MetricDef {
    name: "connections_waiting",
    help: "Idle client connections",
    kind: MetricKind::Gauge,
    labels: &[],
};

const HTTP_REQUESTS_TOTAL: MetricDef = MetricDef {
    name: "http_requests_total",
    help: "Total http requests",
    kind: MetricKind::Counter,
    labels: &[],
};

const CONFIG_LAST_MODIFIED: MetricDef = MetricDef {
    name: "config_last_modified_seconds",
    help: "Last modification time of each NGINX config file (Unix timestamp)",
    kind: MetricKind::Gauge,
    labels: &["file"],
};

const PROXY_TARGET_UP: MetricDef = MetricDef {
    name: "proxy_target_up",
    help: "TCP reachability of each proxy_pass target (1 = reachable, 0 = unreachable)",
    kind: MetricKind::Gauge,
    labels: &["file", "target"],
};

const ALL_METRICS: [&MetricDef; 10] = [
    &UP,
    &CONNECTIONS_ACTIVE,
    &CONNECTIONS_ACCEPTED,
    &CONNECTIONS_HANDLED,
    &CONNECTIONS_READING,
    &CONNECTIONS_WRITING,
    &CONNECTIONS_WAITING,
    &HTTP_REQUESTS_TOTAL,
    &CONFIG_LAST_MODIFIED,
    &PROXY_TARGET_UP,
];

/// 一个采集器对外暴露的指标集合
///
/// 描述符在创建时一次性生成，`describe` 不需要任何锁；
/// 每次抓取时由 `render` 把快照写入本次抓取专用的注册表。
#[derive(Debug, Clone)]
pub struct MetricSet {
    namespace: String,
    const_labels: HashMap<String, String>,
    descs: Vec<Desc>,
}

impl MetricSet {
    pub fn new(
        namespace: &str,
        const_labels: HashMap<String, String>,
    ) -> Result<Self, MetricsError> {
        let mut set = Self {
            namespace: namespace.to_string(),
            const_labels,
            descs: Vec::with_capacity(ALL_METRICS.len()),
        };

        for def in ALL_METRICS {
            let desc = Desc::new(
                set.opts(def).fq_name(),
                def.help.to_string(),
                def.labels.iter().map(|label| label.to_string()).collect(),
                set.const_labels.clone(),
            )?;
            set.descs.push(desc);
        }

        Ok(set)
    }

    /// 全部指标描述符
    pub fn describe(&self) -> &[Desc] {
        &self.descs
    }

    pub fn const_labels(&self) -> &HashMap<String, String> {
        &self.const_labels
    }

    /// 将一个采集快照注册到注册表
    pub fn render(
        &self,
        snapshot: &CollectionSnapshot,
        registry: &Registry,
    ) -> Result<(), MetricsError> {
        self.register_value(registry, &UP, u64::from(snapshot.is_up()))?;

        // 状态端点失败时不输出实时计数
        if let Some(stats) = &snapshot.status {
            let connections = &stats.connections;
            self.register_value(registry, &CONNECTIONS_ACTIVE, connections.active)?;
            self.register_value(registry, &CONNECTIONS_ACCEPTED, connections.accepted)?;
            self.register_value(registry, &CONNECTIONS_HANDLED, connections.handled)?;
            self.register_value(registry, &CONNECTIONS_READING, connections.reading)?;
            self.register_value(registry, &CONNECTIONS_WRITING, connections.writing)?;
            self.register_value(registry, &CONNECTIONS_WAITING, connections.waiting)?;
            self.register_value(registry, &HTTP_REQUESTS_TOTAL, stats.requests)?;
        }

        let last_modified =
            IntGaugeVec::new(self.opts(&CONFIG_LAST_MODIFIED), CONFIG_LAST_MODIFIED.labels)?;
        let target_up =
            IntGaugeVec::new(self.opts(&PROXY_TARGET_UP), PROXY_TARGET_UP.labels)?;

        for entry in &snapshot.files {
            let file = entry.file.path.to_string_lossy().into_owned();
            last_modified
                .with_label_values(&[file.as_str()])
                .set(entry.file.modified);

            // 同一文件内重复的目标合并为一条序列，全部可达才记为 1
            let mut merged: Vec<(&str, bool)> = Vec::with_capacity(entry.targets.len());
            for health in &entry.targets {
                match merged.iter_mut().find(|(target, _)| *target == health.target) {
                    Some((_, reachable)) => *reachable &= health.reachable,
                    None => merged.push((health.target.as_str(), health.reachable)),
                }
            }

            for (target, reachable) in merged {
                target_up
                    .with_label_values(&[file.as_str(), target])
                    .set(i64::from(reachable));
            }
        }

        registry.register(Box::new(last_modified))?;
        registry.register(Box::new(target_up))?;
        Ok(())
    }

    fn opts(&self, def: &MetricDef) -> Opts {
        Opts::new(def.name, def.help)
            .namespace(self.namespace.clone())
            .const_labels(self.const_labels.clone())
    }

    fn register_value(
        &self,
        registry: &Registry,
        def: &MetricDef,
        value: u64,
    ) -> Result<(), MetricsError> {
        match def.kind {
            MetricKind::Gauge => {
                let gauge = IntGauge::with_opts(self.opts(def))?;
                // 超出 i64 范围时取上限
                gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
                registry.register(Box::new(gauge))?;
            }
            MetricKind::Counter => {
                let counter = IntCounter::with_opts(self.opts(def))?;
                counter.inc_by(value);
                registry.register(Box::new(counter))?;
            }
        }
        Ok(())
    }
}

/// 注册构建信息指标（固定值 1）
pub fn register_build_info(registry: &Registry) -> Result<(), MetricsError> {
    let build_info = IntGauge::with_opts(
        Opts::new(
            "nginx_exporter_build_info",
            "A metric with a constant '1' value labeled by version, revision, branch, and rustversion from which nginx-proxy-exporter was built.",
        )
        .const_label("version", version::VERSION)
        .const_label("revision", version::GIT_HASH)
        .const_label("branch", version::GIT_BRANCH)
        .const_label("rustversion", version::RUST_VERSION),
    )?;
    build_info.set(1);
    registry.register(Box::new(build_info))?;
    Ok(())
}
