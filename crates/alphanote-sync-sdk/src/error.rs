use std::fmt;
use rusqlite;

#[derive(Debug)]
pub enum SyncError {
    /// 数据源格式问题（文件不存在、非 SQLite、结构损坏）
    Format(String),
    /// SQLite 查询错误
    Sqlite(rusqlite::Error),
    /// 配置错误（缺少令牌、批次大小为 0 等）
    Config(String),
    /// 认证失败（HTTP 401 / 403）
    Auth(String),
    /// 服务器或网络错误（5xx、连接失败、超时）
    Server(String),
    /// 批次被服务端拒绝（其余 4xx）
    Validation(String),
    /// 上传被主动取消
    Cancelled,
    /// 检查点存储错误
    Checkpoint(String),
    Serialization(String),
    IO(String),
    /// 状态机不允许的操作（如上传中重复 start_upload）
    InvalidState(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Format(e) => write!(f, "Format error: {}", e),
            SyncError::Sqlite(e) => write!(f, "SQLite error: {}", e),
            SyncError::Config(e) => write!(f, "Config error: {}", e),
            SyncError::Auth(e) => write!(f, "Authentication error: {}", e),
            SyncError::Server(e) => write!(f, "Server error: {}", e),
            SyncError::Validation(e) => write!(f, "Validation error: {}", e),
            SyncError::Cancelled => write!(f, "Upload cancelled"),
            SyncError::Checkpoint(e) => write!(f, "Checkpoint error: {}", e),
            SyncError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SyncError::IO(e) => write!(f, "IO error: {}", e),
            SyncError::InvalidState(e) => write!(f, "Invalid state: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<rusqlite::Error> for SyncError {
    fn from(error: rusqlite::Error) -> Self {
        SyncError::Sqlite(error)
    }
}

impl From<sled::Error> for SyncError {
    fn from(error: sled::Error) -> Self {
        SyncError::Checkpoint(error.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::IO(error.to_string())
    }
}

impl SyncError {
    /// 判断是否为致命错误：retry 无法恢复，需要更换数据源或修正配置
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Format(_)
                | SyncError::Sqlite(_)
                | SyncError::Config(_)
                | SyncError::Auth(_)
                | SyncError::InvalidState(_)
        )
    }

    /// 判断是否可通过 retry 续传恢复
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Server(_) | SyncError::Checkpoint(_) | SyncError::IO(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
