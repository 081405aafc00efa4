//! SDK 版本与运行时元信息

/// SDK semver，来自 Cargo.toml
///
/// 禁止手写版本号，必须用 `env!("CARGO_PKG_VERSION")` 与 Cargo.toml 保持同步。
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP 请求的 User-Agent，带上版本便于服务端排查
pub const USER_AGENT: &str = concat!("alphanote-sync/", env!("CARGO_PKG_VERSION"));
