//! 同步事件系统
//!
//! 本模块提供：
//! - `SyncEvent`：同步过程中产生的事件（状态切换、批次完成、进度更新等）
//! - `SyncEventBus`：基于 tokio broadcast 的事件总线
//!
//! UI 与 CLI 订阅事件驱动展示；无订阅者时事件直接丢弃，不影响同步本身。

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::state::{SyncLogEntry, SyncProgress, SyncStatus};

/// 同步事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// 状态切换
    StatusChanged { from: SyncStatus, to: SyncStatus },
    /// 快照加载完成
    SnapshotLoaded {
        fingerprint: String,
        content_count: u64,
        creator_count: u64,
    },
    /// 一个批次上传成功并已确认
    BatchUploaded {
        batch_id: String,
        records: u64,
        inserted: u64,
        updated: u64,
    },
    /// 一个批次被服务端拒绝并跳过
    BatchSkipped { batch_id: String, detail: String },
    /// 进度更新
    ProgressUpdated(SyncProgress),
    /// 新增一条同步日志
    LogAppended(SyncLogEntry),
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::StatusChanged { .. } => "status_changed",
            SyncEvent::SnapshotLoaded { .. } => "snapshot_loaded",
            SyncEvent::BatchUploaded { .. } => "batch_uploaded",
            SyncEvent::BatchSkipped { .. } => "batch_skipped",
            SyncEvent::ProgressUpdated(_) => "progress_updated",
            SyncEvent::LogAppended(_) => "log_appended",
        }
    }
}

/// 事件总线
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    /// 创建事件总线，capacity 为广播缓冲区大小
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件
    ///
    /// 无订阅者时 send 会失败，属正常场景（纯 CLI 跑批），仅打 debug。
    pub fn emit(&self, event: SyncEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("事件无人订阅，已丢弃: {}", e);
        }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_and_emit() {
        let bus = SyncEventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.emit(SyncEvent::StatusChanged {
            from: SyncStatus::Ready,
            to: SyncStatus::Uploading,
        });

        match receiver.recv().await.unwrap() {
            SyncEvent::StatusChanged { from, to } => {
                assert_eq!(from, SyncStatus::Ready);
                assert_eq!(to, SyncStatus::Uploading);
            }
            other => panic!("收到意外事件: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let bus = SyncEventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        // 不应 panic
        bus.emit(SyncEvent::ProgressUpdated(SyncProgress::default()));
    }

    #[tokio::test]
    async fn test_all_subscribers_receive() {
        let bus = SyncEventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(SyncEvent::BatchUploaded {
            batch_id: "content-1".to_string(),
            records: 50,
            inserted: 30,
            updated: 20,
        });

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.unwrap() {
                SyncEvent::BatchUploaded { batch_id, records, .. } => {
                    assert_eq!(batch_id, "content-1");
                    assert_eq!(records, 50);
                }
                other => panic!("收到意外事件: {:?}", other),
            }
        }
    }
}
