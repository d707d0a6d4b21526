// 版本信息常量（由 build.rs 注入）
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const GIT_BRANCH: &str = env!("GIT_BRANCH");
pub const RUST_VERSION: &str = env!("RUST_VERSION");
pub const TARGET_ARCH: &str = env!("TARGET_ARCH");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");

pub fn version_info() -> String {
    format!(
        "NGINX Prometheus Exporter v{}\n\
        Build Information:\n\
        ├─ Build Time: {}\n\
        ├─ Git Hash: {}\n\
        ├─ Git Branch: {}\n\
        ├─ Rust Version: {}\n\
        ├─ Target Architecture: {}\n\
        └─ Build Profile: {}",
        VERSION, BUILD_TIME, GIT_HASH, GIT_BRANCH, RUST_VERSION, TARGET_ARCH, BUILD_PROFILE
    )
}
