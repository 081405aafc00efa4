//! 检查点存储 - 基于 sled 的持久化上传进度
//!
//! 本模块提供：
//! - 按数据源指纹隔离的已确认 ID 集合（每个指纹一棵独立子树）
//! - 幂等确认：同一 ID 重复确认不重复计数
//! - 显式落盘：persist 成功之前不开始下一批
//! - 会话快照：status 命令可跨进程读取最近一次会话的进度
//!
//! 进程崩溃后重新打开即恢复，已确认的 ID 不丢失、不重复上传。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::entities::EntityKind;
use crate::error::{Result, SyncError};
use crate::state::{SyncProgress, SyncStatus};

const META_KEY: &str = "meta";
const SESSION_KEY: &str = "session";
const CONFIRMED_PREFIX: &str = "confirmed";
const TREE_PREFIX: &str = "ckpt_";

/// 检查点元信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// 数据源指纹
    pub fingerprint: String,
    /// 已确认内容数
    pub uploaded_content: u64,
    /// 已确认创作者数
    pub uploaded_creators: u64,
    /// 创建时间（UTC 毫秒）
    pub created_at: i64,
    /// 最后更新时间（UTC 毫秒）
    pub updated_at: i64,
}

/// 已确认 ID 集合（内存视图）
#[derive(Debug, Clone, Default)]
pub struct ConfirmedIds {
    pub content: HashSet<String>,
    pub creators: HashSet<String>,
}

impl ConfirmedIds {
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Content => self.content.contains(id),
            EntityKind::Creator => self.creators.contains(id),
        }
    }

    pub fn count(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Content => self.content.len() as u64,
            EntityKind::Creator => self.creators.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.creators.is_empty()
    }
}

/// 最近一次会话的快照（跨进程查询进度用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SyncStatus,
    pub progress: SyncProgress,
    /// 写入时间（UTC 毫秒）
    pub updated_at: i64,
}

/// 检查点存储
pub struct CheckpointStore {
    db: Db,
    path: PathBuf,
}

impl CheckpointStore {
    /// 打开（或创建）检查点库
    ///
    /// sled 是单进程独占的：检查点库被另一个进程占用时报 Checkpoint 错误。
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::IO(format!("创建检查点目录失败: {}", e)))?;
        }

        let db = sled::open(&path).map_err(|e| {
            let msg = format!("{}", e);
            if msg.contains("could not acquire lock") || msg.contains("WouldBlock") {
                SyncError::Checkpoint(
                    "检查点库被占用，另一个同步进程可能正在运行".to_string(),
                )
            } else {
                SyncError::Checkpoint(format!("打开检查点库失败: {}", e))
            }
        })?;

        debug!("检查点库已打开: {}", path.display());
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取指纹对应的全部已确认 ID
    pub async fn load(&self, fingerprint: &str) -> Result<ConfirmedIds> {
        let tree = self.tree(fingerprint)?;
        let mut ids = ConfirmedIds::default();

        for kind in EntityKind::ORDER {
            let prefix = confirmed_prefix(kind);
            for item in tree.scan_prefix(prefix.as_bytes()) {
                let (key, _) =
                    item.map_err(|e| SyncError::Checkpoint(format!("扫描检查点失败: {}", e)))?;
                let id = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                match kind {
                    EntityKind::Content => ids.content.insert(id),
                    EntityKind::Creator => ids.creators.insert(id),
                };
            }
        }

        debug!(
            "检查点已加载: 指纹={} 内容={} 创作者={}",
            fingerprint,
            ids.content.len(),
            ids.creators.len()
        );
        Ok(ids)
    }

    /// 确认一批记录已成功上传（幂等），返回本次新增的确认数
    ///
    /// 只写内存页，不保证落盘；调用方在开始下一批之前必须 persist。
    pub async fn mark_confirmed(
        &self,
        fingerprint: &str,
        kind: EntityKind,
        ids: &[String],
    ) -> Result<u64> {
        let tree = self.tree(fingerprint)?;
        let now = Utc::now().timestamp_millis();
        let value = serde_json::to_vec(&now)?;

        let mut newly = 0u64;
        for id in ids {
            let key = format!("{}{}", confirmed_prefix(kind), id);
            let previous = tree
                .insert(key.as_bytes(), value.clone())
                .map_err(|e| SyncError::Checkpoint(format!("写入确认记录失败: {}", e)))?;
            if previous.is_none() {
                newly += 1;
            }
        }

        if newly > 0 {
            self.bump_meta(&tree, fingerprint, kind, newly)?;
        }
        Ok(newly)
    }

    /// 读取检查点元信息；从未确认过任何记录时为 None
    pub async fn meta(&self, fingerprint: &str) -> Result<Option<CheckpointMeta>> {
        let tree = self.tree(fingerprint)?;
        self.read_meta(&tree)
    }

    /// 把确认落盘（fsync 级持久化）
    pub async fn persist(&self, fingerprint: &str) -> Result<()> {
        let tree = self.tree(fingerprint)?;
        tree.flush_async()
            .await
            .map_err(|e| SyncError::Checkpoint(format!("检查点落盘失败: {}", e)))?;
        Ok(())
    }

    /// 保存会话快照
    pub async fn save_session(&self, fingerprint: &str, snapshot: &SessionSnapshot) -> Result<()> {
        let tree = self.tree(fingerprint)?;
        tree.insert(SESSION_KEY, serde_json::to_vec(snapshot)?)
            .map_err(|e| SyncError::Checkpoint(format!("写入会话快照失败: {}", e)))?;
        Ok(())
    }

    /// 读取最近一次会话快照
    pub async fn load_session(&self, fingerprint: &str) -> Result<Option<SessionSnapshot>> {
        let tree = self.tree(fingerprint)?;
        match tree
            .get(SESSION_KEY)
            .map_err(|e| SyncError::Checkpoint(format!("读取会话快照失败: {}", e)))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 清空指纹对应的整个检查点（重置或完成后调用）
    pub async fn clear(&self, fingerprint: &str) -> Result<()> {
        self.db
            .drop_tree(tree_name(fingerprint).as_bytes())
            .map_err(|e| SyncError::Checkpoint(format!("清空检查点失败: {}", e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| SyncError::Checkpoint(format!("检查点落盘失败: {}", e)))?;
        info!("检查点已清空: {}", fingerprint);
        Ok(())
    }

    /// 列出所有持有检查点的指纹
    pub async fn fingerprints(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for raw in self.db.tree_names() {
            if let Ok(name) = String::from_utf8(raw.to_vec()) {
                if let Some(fingerprint) = name.strip_prefix(TREE_PREFIX) {
                    names.push(fingerprint.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn tree(&self, fingerprint: &str) -> Result<Tree> {
        self.db
            .open_tree(tree_name(fingerprint).as_bytes())
            .map_err(|e| SyncError::Checkpoint(format!("打开检查点子树失败: {}", e)))
    }

    fn read_meta(&self, tree: &Tree) -> Result<Option<CheckpointMeta>> {
        match tree
            .get(META_KEY)
            .map_err(|e| SyncError::Checkpoint(format!("读取检查点元信息失败: {}", e)))?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn bump_meta(&self, tree: &Tree, fingerprint: &str, kind: EntityKind, newly: u64) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut meta = self.read_meta(tree)?.unwrap_or_else(|| CheckpointMeta {
            fingerprint: fingerprint.to_string(),
            uploaded_content: 0,
            uploaded_creators: 0,
            created_at: now,
            updated_at: now,
        });
        match kind {
            EntityKind::Content => meta.uploaded_content += newly,
            EntityKind::Creator => meta.uploaded_creators += newly,
        }
        meta.updated_at = now;
        tree.insert(META_KEY, serde_json::to_vec(&meta)?)
            .map_err(|e| SyncError::Checkpoint(format!("更新检查点元信息失败: {}", e)))?;
        Ok(())
    }
}

fn tree_name(fingerprint: &str) -> String {
    format!("{}{}", TREE_PREFIX, fingerprint)
}

fn confirmed_prefix(kind: EntityKind) -> String {
    format!("{}:{}:", CONFIRMED_PREFIX, kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_mark_confirmed_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp_dir.path().join("checkpoint")).unwrap();

        let newly = store
            .mark_confirmed("a.db", EntityKind::Content, &ids(&["c1", "c2", "c3"]))
            .await
            .unwrap();
        assert_eq!(newly, 3);

        // 重复确认不重复计数
        let again = store
            .mark_confirmed("a.db", EntityKind::Content, &ids(&["c2", "c3"]))
            .await
            .unwrap();
        assert_eq!(again, 0);

        let meta = store.meta("a.db").await.unwrap().unwrap();
        assert_eq!(meta.uploaded_content, 3);
        assert_eq!(meta.uploaded_creators, 0);
    }

    #[tokio::test]
    async fn test_load_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("checkpoint");

        {
            let store = CheckpointStore::open(&path).unwrap();
            store
                .mark_confirmed("a.db", EntityKind::Content, &ids(&["c1", "c2"]))
                .await
                .unwrap();
            store
                .mark_confirmed("a.db", EntityKind::Creator, &ids(&["u1"]))
                .await
                .unwrap();
            store.persist("a.db").await.unwrap();
        }

        // 重新打开模拟进程重启
        let store = CheckpointStore::open(&path).unwrap();
        let confirmed = store.load("a.db").await.unwrap();
        assert_eq!(confirmed.count(EntityKind::Content), 2);
        assert_eq!(confirmed.count(EntityKind::Creator), 1);
        assert!(confirmed.contains(EntityKind::Content, "c1"));
        assert!(confirmed.contains(EntityKind::Creator, "u1"));
        assert!(!confirmed.contains(EntityKind::Content, "u1"));
    }

    #[tokio::test]
    async fn test_fingerprints_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp_dir.path().join("checkpoint")).unwrap();

        store
            .mark_confirmed("a.db", EntityKind::Content, &ids(&["c1"]))
            .await
            .unwrap();
        store
            .mark_confirmed("b.db", EntityKind::Content, &ids(&["c9"]))
            .await
            .unwrap();

        let a = store.load("a.db").await.unwrap();
        let b = store.load("b.db").await.unwrap();
        assert!(a.contains(EntityKind::Content, "c1"));
        assert!(!a.contains(EntityKind::Content, "c9"));
        assert!(b.contains(EntityKind::Content, "c9"));

        // 清掉 a 不影响 b
        store.clear("a.db").await.unwrap();
        assert!(store.load("a.db").await.unwrap().is_empty());
        assert!(store.meta("a.db").await.unwrap().is_none());
        assert!(!store.load("b.db").await.unwrap().is_empty());

        let fingerprints = store.fingerprints().await.unwrap();
        assert!(fingerprints.contains(&"b.db".to_string()));
    }

    #[tokio::test]
    async fn test_session_snapshot_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(temp_dir.path().join("checkpoint")).unwrap();

        assert!(store.load_session("a.db").await.unwrap().is_none());

        let snapshot = SessionSnapshot {
            status: SyncStatus::Paused,
            progress: SyncProgress {
                total_content: 120,
                confirmed_content: 100,
                planned_batches: 3,
                finished_batches: 2,
                ..Default::default()
            },
            updated_at: Utc::now().timestamp_millis(),
        };
        store.save_session("a.db", &snapshot).await.unwrap();
        store.persist("a.db").await.unwrap();

        let loaded = store.load_session("a.db").await.unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Paused);
        assert_eq!(loaded.progress.confirmed_content, 100);
        assert_eq!(loaded.progress.finished_batches, 2);
    }
}
