//! 同步配置
//!
//! 本模块提供：
//! - `SyncConfig`：同步引擎配置（服务器、令牌、批次、目录）
//! - `SyncConfigBuilder`：链式构建器
//!
//! 配置本身不做网络校验；批次大小等硬约束由 `validate()` 检查，
//! 控制器创建时统一调用。

use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// 默认单批最大记录数
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// 默认批次间隔（毫秒）
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 100;
/// 默认 HTTP 连接超时（秒）
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// 默认 HTTP 请求超时（秒）。整批正文可能较大，放宽到两分钟
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// 同步引擎配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 数据目录，存放检查点库与暂停标记文件
    pub data_dir: PathBuf,
    /// 服务器基础地址，如 <https://sync.alphanote.app>
    pub server_url: String,
    /// 上传令牌（随 X-Upload-Token 请求头发送）
    pub upload_token: String,
    /// 单批最大记录数
    pub batch_size: usize,
    /// 批次间隔（毫秒），限制服务端压力
    pub batch_interval_ms: u64,
    /// HTTP 连接超时（秒）
    pub connect_timeout_secs: u64,
    /// HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 上传前是否查询服务端已有数据；预检失败仅告警，不阻塞上传
    pub preflight: bool,
    /// 同步完成后是否清空检查点
    pub clear_on_complete: bool,
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,
    /// 同步日志环形缓冲容量
    pub log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            server_url: String::new(),
            upload_token: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval_ms: DEFAULT_BATCH_INTERVAL_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            preflight: true,
            clear_on_complete: true,
            event_buffer_size: 100,
            log_capacity: 100,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// 校验硬约束（令牌单独在 start_upload 时校验）
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("批次大小不能为 0".to_string()));
        }
        if self.log_capacity == 0 {
            return Err(SyncError::Config("日志容量不能为 0".to_string()));
        }
        Ok(())
    }

    /// 检查点库路径
    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("checkpoint")
    }

    /// 暂停标记文件路径（跨进程暂停用）
    pub fn pause_marker_path(&self) -> PathBuf {
        self.data_dir.join("sync.pause")
    }
}

/// 获取默认数据目录 ~/.alphanote/sync/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".alphanote").join("sync")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        // Windows 支持
        home_dir.join(".alphanote").join("sync")
    } else {
        // 如果无法获取用户主目录，则回退到当前目录
        PathBuf::from("./alphanote_sync_data")
    }
}

/// 同步配置构建器
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn server_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn upload_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.upload_token = token.into();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn batch_interval_ms(mut self, interval: u64) -> Self {
        self.config.batch_interval_ms = interval;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn preflight(mut self, enabled: bool) -> Self {
        self.config.preflight = enabled;
        self
    }

    pub fn clear_on_complete(mut self, enabled: bool) -> Self {
        self.config.clear_on_complete = enabled;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.config.log_capacity = capacity;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.batch_interval_ms, DEFAULT_BATCH_INTERVAL_MS);
        assert!(config.preflight);
        assert!(config.clear_on_complete);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = SyncConfig::builder()
            .data_dir("/tmp/alphanote-test")
            .server_url("https://sync.example.com")
            .upload_token("token-123")
            .batch_size(10)
            .preflight(false)
            .build();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/alphanote-test"));
        assert_eq!(config.server_url, "https://sync.example.com");
        assert_eq!(config.upload_token, "token-123");
        assert_eq!(config.batch_size, 10);
        assert!(!config.preflight);
        assert_eq!(
            config.pause_marker_path(),
            PathBuf::from("/tmp/alphanote-test/sync.pause")
        );
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = SyncConfig::builder().batch_size(0).build();
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
