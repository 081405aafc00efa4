//! AlphaNote Sync SDK - 知乎快照批量同步引擎
//!
//! 本 SDK 把本地知乎快照库（SQLite 单文件）同步到 AlphaNote 服务端，提供：
//! - 📦 快照导出：只读打开快照库，按固定顺序导出内容与创作者
//! - 🔁 断点续传：sled 检查点逐批落盘，崩溃 / 暂停后不重复不丢失
//! - 📤 有界批次：先内容后创作者，单飞上传，批间限速
//! - ⏸ 随时暂停：在途请求可取消，恢复后从未确认批次继续
//! - 🧭 错误分类：认证 / 服务器 / 批次拒绝各按不同策略处置
//! - ⚙️ 事件系统：状态切换、批次完成、进度更新统一广播
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use alphanote_sync_sdk::{HttpUploadTransport, SyncConfig, SyncController, SyncStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 配置同步引擎
//!     let config = SyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .server_url("https://sync.alphanote.app")
//!         .upload_token("your-upload-token")
//!         .build();
//!
//!     // 创建控制器并加载快照
//!     let transport = HttpUploadTransport::new(&config)?;
//!     let controller = SyncController::new(config, transport)?;
//!     let summary = controller.load("/path/to/zhihu_data.db").await?;
//!     println!("待同步: 内容 {} 条, 创作者 {} 条", summary.content_count, summary.creator_count);
//!
//!     // 上传直到完成、暂停或出错
//!     match controller.start_upload().await? {
//!         SyncStatus::Completed => println!("同步完成"),
//!         status => println!("同步停在 {} 状态", status),
//!     }
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod entities;
pub mod error;
pub mod events;
pub mod extractor;
pub mod scheduler;
pub mod state;
pub mod transport;
pub mod version;

// 重新导出核心类型，方便使用
pub use checkpoint::{CheckpointMeta, CheckpointStore, ConfirmedIds, SessionSnapshot};
pub use config::{SyncConfig, SyncConfigBuilder, DEFAULT_BATCH_INTERVAL_MS, DEFAULT_BATCH_SIZE};
pub use controller::{SnapshotSummary, SyncController};
pub use entities::{ContentRecord, CreatorRecord, EntityKind};
pub use error::{Result, SyncError};
pub use events::{SyncEvent, SyncEventBus};
pub use extractor::{snapshot_fingerprint, SnapshotExtractor};
pub use scheduler::Batch;
pub use state::{LogLevel, SyncLog, SyncLogEntry, SyncProgress, SyncStatus};
pub use transport::{
    HttpUploadTransport, RemoteSyncStatus, UploadFailure, UploadReceipt, UploadTransport,
    UPLOAD_TOKEN_HEADER,
};
pub use version::{SDK_VERSION, USER_AGENT};
