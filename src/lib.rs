pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod health;
pub mod metrics;
pub mod monitoring;
pub mod server;
pub mod shutdown;
pub mod tls;
#[cfg(unix)]
pub mod unix_socket;
pub mod version;

pub use client::{NginxClient, StatusSource, StubStats};
pub use collector::{CollectionSnapshot, NginxCollector};
pub use config::Settings;
pub use health::HealthChecker;
pub use metrics::MetricSet;
