//! 同步状态与进度
//!
//! 本模块提供：
//! - `SyncStatus`：同步状态机的七个状态
//! - `SyncProgress`：进度计数（总量、已确认、批次、服务端回执）
//! - `SyncLog`：最近 N 条同步日志的环形缓冲，供 UI / status 命令展示

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// 未加载数据源
    Idle,
    /// 正在导出快照
    Loading,
    /// 数据源已就绪，等待开始上传
    Ready,
    /// 上传中
    Uploading,
    /// 已暂停，进度已落盘，可恢复
    Paused,
    /// 全部批次处理完毕
    Completed,
    /// 出错停止；可重试错误用 retry 续传，致命错误需人工介入
    Error,
}

impl SyncStatus {
    /// 是否为终止态（本轮会话不再推进）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Paused | SyncStatus::Completed | SyncStatus::Error
        )
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "未加载"),
            SyncStatus::Loading => write!(f, "加载中"),
            SyncStatus::Ready => write!(f, "已就绪"),
            SyncStatus::Uploading => write!(f, "上传中"),
            SyncStatus::Paused => write!(f, "已暂停"),
            SyncStatus::Completed => write!(f, "已完成"),
            SyncStatus::Error => write!(f, "出错"),
        }
    }
}

/// 同步进度
///
/// confirmed_* 只统计落入检查点的确认数；预检得知服务端已有而
/// 本会话跳过的内容单独记在 skipped_existing，不污染检查点语义。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// 快照内容总数
    pub total_content: u64,
    /// 快照创作者总数
    pub total_creators: u64,
    /// 已确认上传的内容数（仅统计当前快照内的）
    pub confirmed_content: u64,
    /// 已确认上传的创作者数
    pub confirmed_creators: u64,
    /// 预检发现服务端已有、本会话跳过的内容数
    pub skipped_existing: u64,
    /// 本轮会话计划批次数
    pub planned_batches: u64,
    /// 本轮会话已完成批次数
    pub finished_batches: u64,
    /// 本轮会话被服务端拒绝而跳过的批次数
    pub skipped_batches: u64,
    /// 服务端累计新增条数
    pub inserted_total: u64,
    /// 服务端累计更新条数
    pub updated_total: u64,
}

impl SyncProgress {
    /// 完成百分比：已处理记录（确认 + 服务端已有）对快照总量
    pub fn percent(&self) -> f64 {
        let total = self.total_content + self.total_creators;
        if total == 0 {
            return 100.0;
        }
        let done =
            (self.confirmed_content + self.confirmed_creators + self.skipped_existing).min(total);
        (done as f64 / total as f64) * 100.0
    }

    /// 快照内所有记录是否都已处理完
    pub fn is_complete(&self) -> bool {
        self.confirmed_content + self.skipped_existing >= self.total_content
            && self.confirmed_creators >= self.total_creators
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// 一条同步日志
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// 记录时间（UTC 毫秒时间戳）
    pub at: i64,
    pub level: LogLevel,
    pub message: String,
}

/// 同步日志环形缓冲，只保留最近 capacity 条
pub struct SyncLog {
    entries: RwLock<VecDeque<SyncLogEntry>>,
    capacity: usize,
}

impl SyncLog {
    /// 创建环形缓冲，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// 追加一条日志，超出容量时淘汰最旧的一条
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> SyncLogEntry {
        let entry = SyncLogEntry {
            at: Utc::now().timestamp_millis(),
            level,
            message: message.into(),
        };
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    /// 当前日志快照（从旧到新）
    pub fn snapshot(&self) -> Vec<SyncLogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_ring_evicts_oldest() {
        let log = SyncLog::new(3);
        for i in 0..5 {
            log.append(LogLevel::Info, format!("消息 {}", i));
        }

        let entries = log.snapshot();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "消息 2");
        assert_eq!(entries[2].message, "消息 4");
    }

    #[test]
    fn test_progress_percent() {
        let mut progress = SyncProgress {
            total_content: 100,
            total_creators: 20,
            confirmed_content: 50,
            confirmed_creators: 10,
            ..Default::default()
        };
        assert!((progress.percent() - 50.0).abs() < 1e-9);
        assert!(!progress.is_complete());

        progress.confirmed_content = 70;
        progress.skipped_existing = 30;
        progress.confirmed_creators = 20;
        assert!((progress.percent() - 100.0).abs() < 1e-9);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_progress_percent_empty_snapshot() {
        let progress = SyncProgress::default();
        assert!((progress.percent() - 100.0).abs() < 1e-9);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SyncStatus::Paused.is_terminal());
        assert!(SyncStatus::Completed.is_terminal());
        assert!(SyncStatus::Error.is_terminal());
        assert!(!SyncStatus::Uploading.is_terminal());
        assert!(!SyncStatus::Ready.is_terminal());
    }
}
