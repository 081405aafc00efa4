//! 同步控制器
//!
//! 同步引擎的状态机核心，驱动一次完整同步会话：
//! 加载快照 → 去重 → 切批 → 逐批上传 → 确认落盘。
//!
//! 关键约束：
//! - 同一时刻最多一个在途上传请求；先内容后创作者，批间顺序固定
//! - 每批确认先落盘，落盘成功后才开始下一批
//! - 暂停 / 出错 / 进程崩溃后，凭检查点续传，不重复不丢失

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointStore, SessionSnapshot};
use crate::config::SyncConfig;
use crate::entities::{ContentRecord, CreatorRecord, EntityKind};
use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, SyncEventBus};
use crate::extractor::SnapshotExtractor;
use crate::scheduler::{self, Batch};
use crate::state::{LogLevel, SyncLog, SyncLogEntry, SyncProgress, SyncStatus};
use crate::transport::{UploadFailure, UploadReceipt, UploadTransport};

/// 已加载到内存的快照数据
struct LoadedSnapshot {
    fingerprint: String,
    content: Vec<ContentRecord>,
    creators: Vec<CreatorRecord>,
}

/// 控制器内部可变状态
struct ControllerState {
    status: SyncStatus,
    snapshot: Option<LoadedSnapshot>,
    progress: SyncProgress,
    /// 预检得知服务端已有的内容 ID；只在本会话内生效，不落检查点
    session_skip: HashSet<String>,
    /// 当前会话的取消令牌，每轮上传会话换新
    cancel: CancellationToken,
}

/// 快照加载摘要
#[derive(Debug, Clone)]
pub struct SnapshotSummary {
    pub fingerprint: String,
    pub content_count: u64,
    pub creator_count: u64,
}

/// 同步控制器
pub struct SyncController<T: UploadTransport> {
    config: SyncConfig,
    transport: T,
    store: CheckpointStore,
    state: RwLock<ControllerState>,
    log: SyncLog,
    events: SyncEventBus,
}

impl<T: UploadTransport> SyncController<T> {
    /// 创建控制器并打开检查点库
    pub fn new(config: SyncConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let store = CheckpointStore::open(config.checkpoint_path())?;
        let log = SyncLog::new(config.log_capacity);
        let events = SyncEventBus::new(config.event_buffer_size);

        Ok(Self {
            config,
            transport,
            store,
            state: RwLock::new(ControllerState {
                status: SyncStatus::Idle,
                snapshot: None,
                progress: SyncProgress::default(),
                session_skip: HashSet::new(),
                cancel: CancellationToken::new(),
            }),
            log,
            events,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// 检查点存储（只读用途：status / stats 等查询）
    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.store
    }

    pub async fn status(&self) -> SyncStatus {
        self.state.read().await.status
    }

    pub async fn progress(&self) -> SyncProgress {
        self.state.read().await.progress.clone()
    }

    /// 订阅同步事件流
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// 最近的同步日志（旧→新）
    pub fn log_entries(&self) -> Vec<SyncLogEntry> {
        self.log.snapshot()
    }

    /// 加载快照数据源：-> Loading -> Ready；导出失败进入 Error 并作废旧快照
    ///
    /// 上传进行中不允许更换数据源。重新加载会替换内存中的快照，
    /// 但不动检查点（检查点按指纹隔离）。
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<SnapshotSummary> {
        {
            let state = self.state.read().await;
            if state.status == SyncStatus::Uploading {
                return Err(SyncError::InvalidState(
                    "上传进行中，不能更换数据源".to_string(),
                ));
            }
        }
        self.set_status(SyncStatus::Loading).await;

        let loaded = match self.extract_snapshot(path.as_ref()) {
            Ok(loaded) => loaded,
            Err(e) => return self.fail_load(e).await,
        };

        let summary = SnapshotSummary {
            fingerprint: loaded.fingerprint.clone(),
            content_count: loaded.content.len() as u64,
            creator_count: loaded.creators.len() as u64,
        };

        let confirmed = match self.store.load(&loaded.fingerprint).await {
            Ok(confirmed) => confirmed,
            Err(e) => return self.fail_load(e).await,
        };
        {
            let mut state = self.state.write().await;
            state.progress = SyncProgress {
                total_content: summary.content_count,
                total_creators: summary.creator_count,
                confirmed_content: confirmed.count(EntityKind::Content),
                confirmed_creators: confirmed.count(EntityKind::Creator),
                ..SyncProgress::default()
            };
            state.session_skip.clear();
            state.snapshot = Some(loaded);
        }

        self.push_log(
            LogLevel::Info,
            format!(
                "快照加载完成: {} (内容 {} 条, 创作者 {} 条)",
                summary.fingerprint, summary.content_count, summary.creator_count
            ),
        );
        self.events.emit(SyncEvent::SnapshotLoaded {
            fingerprint: summary.fingerprint.clone(),
            content_count: summary.content_count,
            creator_count: summary.creator_count,
        });
        self.set_status(SyncStatus::Ready).await;
        Ok(summary)
    }

    /// 加载失败：旧快照一并作废并进入 Error，retry 不会对着上一个数据源续跑
    async fn fail_load(&self, e: SyncError) -> Result<SnapshotSummary> {
        {
            let mut state = self.state.write().await;
            state.snapshot = None;
            state.progress = SyncProgress::default();
            state.session_skip.clear();
        }
        self.push_log(LogLevel::Error, format!("❌ 加载快照失败: {}", e));
        self.set_status(SyncStatus::Error).await;
        Err(e)
    }

    /// 开始上传：Ready -> Uploading -> {Completed, Paused, Error}
    ///
    /// 令牌缺失直接报 Config 错误，状态保持不变。
    pub async fn start_upload(&self) -> Result<SyncStatus> {
        self.ensure_token()?;
        self.ensure_status(SyncStatus::Ready).await?;
        self.run_session(SyncStatus::Ready, true).await
    }

    /// 从暂停恢复：Paused -> Uploading，按检查点续传
    pub async fn resume(&self) -> Result<SyncStatus> {
        self.ensure_token()?;
        self.ensure_status(SyncStatus::Paused).await?;
        self.push_log(LogLevel::Info, "恢复上传，按检查点续传");
        self.run_session(SyncStatus::Paused, false).await
    }

    /// 出错后重试：Error -> Uploading，已确认批次不会重发
    pub async fn retry(&self) -> Result<SyncStatus> {
        self.ensure_token()?;
        self.ensure_status(SyncStatus::Error).await?;
        self.push_log(LogLevel::Info, "重试上传，已确认批次不会重发");
        self.run_session(SyncStatus::Error, false).await
    }

    /// 请求暂停：在途请求中止或当前批次结束后，停在下一批之前
    ///
    /// 仅在上传中有效，其他状态下为空操作。
    pub async fn pause(&self) {
        let cancel = {
            let state = self.state.read().await;
            if state.status != SyncStatus::Uploading {
                return;
            }
            state.cancel.clone()
        };
        self.push_log(LogLevel::Info, "收到暂停请求");
        cancel.cancel();
    }

    /// 重置：清空当前数据源的检查点与会话进度，回到 Idle
    ///
    /// 上传进行中不允许重置。
    pub async fn reset(&self) -> Result<()> {
        let fingerprint = {
            let state = self.state.read().await;
            if state.status == SyncStatus::Uploading {
                return Err(SyncError::InvalidState(
                    "上传进行中，不能重置".to_string(),
                ));
            }
            state.snapshot.as_ref().map(|s| s.fingerprint.clone())
        };

        if let Some(fingerprint) = &fingerprint {
            self.store.clear(fingerprint).await?;
        }
        self.clear_pause_marker();

        {
            let mut state = self.state.write().await;
            state.snapshot = None;
            state.progress = SyncProgress::default();
            state.session_skip.clear();
        }
        self.push_log(LogLevel::Info, "同步已重置");
        self.set_status(SyncStatus::Idle).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // 会话执行
    // ------------------------------------------------------------------

    /// 执行一轮上传会话，直到完成、暂停或出错
    ///
    /// 状态校验与进入 Uploading 在同一个写锁临界区内完成：并发的触发
    /// 调用在锁上排队，只有第一个能通过校验，其余按状态不符拒绝。
    async fn run_session(&self, expected: SyncStatus, fresh: bool) -> Result<SyncStatus> {
        let cancel = CancellationToken::new();
        let fingerprint = {
            let mut state = self.state.write().await;
            if state.status != expected {
                return Err(SyncError::InvalidState(format!(
                    "当前状态为 {}，该操作要求 {}",
                    state.status, expected
                )));
            }
            let fingerprint = match state.snapshot.as_ref() {
                Some(snapshot) => snapshot.fingerprint.clone(),
                None => {
                    return Err(SyncError::InvalidState(
                        "没有已加载的数据源".to_string(),
                    ))
                }
            };
            // 换新取消令牌；fresh 会话清掉上一轮的预检跳过集
            state.cancel = cancel.clone();
            if fresh {
                state.session_skip.clear();
            }
            state.status = SyncStatus::Uploading;
            fingerprint
        };
        info!("同步状态: {} -> {}", expected, SyncStatus::Uploading);
        self.events.emit(SyncEvent::StatusChanged {
            from: expected,
            to: SyncStatus::Uploading,
        });
        self.clear_pause_marker();

        // 会话内部出错（含检查点读写失败）也必须离开 Uploading，
        // 否则 pause / retry / reset 全部会被状态机拒绝
        match self.drive_session(&fingerprint, &cancel, fresh).await {
            Ok(status) => Ok(status),
            Err(e) => {
                if self.status().await == SyncStatus::Uploading {
                    self.push_log(LogLevel::Error, format!("❌ 上传停止: {}", e));
                    self.set_status(SyncStatus::Error).await;
                    if let Err(save) = self.save_session(&fingerprint, SyncStatus::Error).await {
                        warn!("会话快照写入失败: {}", save);
                    }
                }
                Err(e)
            }
        }
    }

    /// 会话主体：预检、去重、切批、逐批上传
    async fn drive_session(
        &self,
        fingerprint: &str,
        cancel: &CancellationToken,
        fresh: bool,
    ) -> Result<SyncStatus> {
        // 1. 预检：询问服务端已有数据；失败仅告警，不阻塞上传
        if fresh && self.config.preflight {
            match self
                .transport
                .remote_status(&self.config.upload_token, cancel)
                .await
            {
                Ok(remote) => {
                    self.push_log(
                        LogLevel::Info,
                        format!(
                            "服务端现状: 内容 {} 条 / 创作者 {} 条，已有内容 ID {} 个",
                            remote.article_count,
                            remote.creator_count,
                            remote.existing_content_ids.len()
                        ),
                    );
                    if !remote.existing_content_ids.is_empty() {
                        let mut state = self.state.write().await;
                        for id in remote.existing_content_ids {
                            state.session_skip.insert(id);
                        }
                    }
                }
                Err(UploadFailure::Cancelled) => {
                    return self.finish_paused(fingerprint).await;
                }
                Err(e) => {
                    self.push_log(LogLevel::Warn, format!("⚠️ 预检失败，按全量待传继续: {}", e));
                }
            }
        }

        // 2. 去重：跳过检查点已确认的与服务端已有的
        let confirmed = self.store.load(fingerprint).await?;
        let (pending_content, pending_creators, skipped_existing) = {
            let state = self.state.read().await;
            let snapshot = state.snapshot.as_ref().ok_or_else(|| {
                SyncError::InvalidState("没有已加载的数据源".to_string())
            })?;

            let mut skipped_existing = 0u64;
            let mut pending_content = Vec::new();
            for record in &snapshot.content {
                if confirmed.contains(EntityKind::Content, &record.content_id) {
                    continue;
                }
                if state.session_skip.contains(&record.content_id) {
                    skipped_existing += 1;
                    continue;
                }
                pending_content.push(record.clone());
            }

            let mut pending_creators = Vec::new();
            for record in &snapshot.creators {
                if !confirmed.contains(EntityKind::Creator, &record.user_id) {
                    pending_creators.push(record.clone());
                }
            }
            (pending_content, pending_creators, skipped_existing)
        };

        // 3. 切批：先内容后创作者，顺序固定
        let pending_content_count = pending_content.len();
        let pending_creator_count = pending_creators.len();
        let content_batches = scheduler::schedule_content(pending_content, self.config.batch_size)?;
        let creator_batches =
            scheduler::schedule_creators(pending_creators, self.config.batch_size)?;

        let progress = {
            let mut state = self.state.write().await;
            state.progress.confirmed_content = confirmed.count(EntityKind::Content);
            state.progress.confirmed_creators = confirmed.count(EntityKind::Creator);
            state.progress.skipped_existing = skipped_existing;
            state.progress.planned_batches = (content_batches.len() + creator_batches.len()) as u64;
            state.progress.finished_batches = 0;
            state.progress.skipped_batches = 0;
            if fresh {
                state.progress.inserted_total = 0;
                state.progress.updated_total = 0;
            }
            state.progress.clone()
        };
        self.events.emit(SyncEvent::ProgressUpdated(progress));

        self.push_log(
            LogLevel::Info,
            format!(
                "开始上传: 待传内容 {} 条 / 创作者 {} 条，共 {} 批",
                pending_content_count,
                pending_creator_count,
                content_batches.len() + creator_batches.len()
            ),
        );

        // 4. 逐批上传：串行单飞，批间限速
        for batch in content_batches.iter().chain(creator_batches.iter()) {
            // 跨进程暂停标记（另一个进程的 pause 命令写入）
            if self.pause_marker_present() {
                self.push_log(LogLevel::Info, "检测到暂停标记，停在下一批之前");
                return self.finish_paused(fingerprint).await;
            }
            if cancel.is_cancelled() {
                return self.finish_paused(fingerprint).await;
            }

            match self
                .transport
                .upload_batch(batch, &self.config.upload_token, cancel)
                .await
            {
                Ok(receipt) => {
                    self.confirm_batch(fingerprint, batch, receipt).await?;
                }
                Err(UploadFailure::Cancelled) => {
                    self.push_log(
                        LogLevel::Info,
                        format!("批次 {} 的在途请求已中止，恢复后重发", batch.batch_id()),
                    );
                    return self.finish_paused(fingerprint).await;
                }
                Err(failure @ UploadFailure::Rejected { .. }) => {
                    self.skip_batch(batch, &failure).await;
                }
                Err(failure) => {
                    return self.finish_failed(fingerprint, failure).await;
                }
            }

            // 批间间隔，间隔期间同样可取消
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.finish_paused(fingerprint).await;
                }
                _ = tokio::time::sleep(Duration::from_millis(self.config.batch_interval_ms)) => {}
            }
        }

        self.finish_completed(fingerprint).await
    }

    fn extract_snapshot(&self, path: &Path) -> Result<LoadedSnapshot> {
        let extractor = SnapshotExtractor::open(path)?;
        let content = extractor.extract_content()?;
        let creators = extractor.extract_creators()?;
        Ok(LoadedSnapshot {
            fingerprint: extractor.fingerprint().to_string(),
            content,
            creators,
        })
    }

    /// 确认批次：写检查点并落盘，落盘成功之前绝不开始下一批
    async fn confirm_batch(
        &self,
        fingerprint: &str,
        batch: &Batch,
        receipt: UploadReceipt,
    ) -> Result<()> {
        let ids = batch.dedup_ids();
        let newly = self
            .store
            .mark_confirmed(fingerprint, batch.kind, &ids)
            .await?;
        self.store.persist(fingerprint).await?;

        let progress = {
            let mut state = self.state.write().await;
            match batch.kind {
                EntityKind::Content => state.progress.confirmed_content += newly,
                EntityKind::Creator => state.progress.confirmed_creators += newly,
            }
            state.progress.finished_batches += 1;
            state.progress.inserted_total += receipt.inserted_count;
            state.progress.updated_total += receipt.updated_count;
            state.progress.clone()
        };
        self.save_session(fingerprint, SyncStatus::Uploading).await?;

        debug!(
            "批次 {} 已确认: {} 条 (新增 {}, 更新 {})",
            batch.batch_id(),
            batch.len(),
            receipt.inserted_count,
            receipt.updated_count
        );
        self.push_log(
            LogLevel::Info,
            format!(
                "批次 {} 完成 ({}/{}): 服务端新增 {}, 更新 {}",
                batch.batch_id(),
                progress.finished_batches,
                progress.planned_batches,
                receipt.inserted_count,
                receipt.updated_count
            ),
        );
        self.events.emit(SyncEvent::BatchUploaded {
            batch_id: batch.batch_id(),
            records: batch.len() as u64,
            inserted: receipt.inserted_count,
            updated: receipt.updated_count,
        });
        self.events.emit(SyncEvent::ProgressUpdated(progress));
        Ok(())
    }

    /// 批次被服务端拒绝：记日志后继续下一批，该批不确认
    async fn skip_batch(&self, batch: &Batch, failure: &UploadFailure) {
        let progress = {
            let mut state = self.state.write().await;
            state.progress.skipped_batches += 1;
            state.progress.clone()
        };
        self.push_log(
            LogLevel::Warn,
            format!("⚠️ 批次 {} 被拒绝，跳过继续: {}", batch.batch_id(), failure),
        );
        self.events.emit(SyncEvent::BatchSkipped {
            batch_id: batch.batch_id(),
            detail: failure.to_string(),
        });
        self.events.emit(SyncEvent::ProgressUpdated(progress));
    }

    async fn finish_completed(&self, fingerprint: &str) -> Result<SyncStatus> {
        let progress = self.progress().await;
        self.push_log(
            LogLevel::Info,
            format!(
                "✅ 同步完成: 服务端新增 {} 条，更新 {} 条，跳过 {} 批",
                progress.inserted_total, progress.updated_total, progress.skipped_batches
            ),
        );

        if self.config.clear_on_complete {
            self.store.clear(fingerprint).await?;
            debug!("完成后清空检查点: {}", fingerprint);
        } else {
            self.save_session(fingerprint, SyncStatus::Completed).await?;
            self.store.persist(fingerprint).await?;
        }
        self.set_status(SyncStatus::Completed).await;
        Ok(SyncStatus::Completed)
    }

    async fn finish_paused(&self, fingerprint: &str) -> Result<SyncStatus> {
        self.set_status(SyncStatus::Paused).await;
        self.save_session(fingerprint, SyncStatus::Paused).await?;
        self.store.persist(fingerprint).await?;
        self.push_log(LogLevel::Info, "⏸ 上传已暂停，进度已落盘");
        Ok(SyncStatus::Paused)
    }

    async fn finish_failed(&self, fingerprint: &str, failure: UploadFailure) -> Result<SyncStatus> {
        self.push_log(LogLevel::Error, format!("❌ 上传停止: {}", failure));
        self.set_status(SyncStatus::Error).await;
        self.save_session(fingerprint, SyncStatus::Error).await?;
        self.store.persist(fingerprint).await?;
        Err(failure.into())
    }

    async fn save_session(&self, fingerprint: &str, status: SyncStatus) -> Result<()> {
        let progress = self.state.read().await.progress.clone();
        self.store
            .save_session(
                fingerprint,
                &SessionSnapshot {
                    status,
                    progress,
                    updated_at: chrono::Utc::now().timestamp_millis(),
                },
            )
            .await
    }

    async fn set_status(&self, to: SyncStatus) {
        let from = {
            let mut state = self.state.write().await;
            let from = state.status;
            state.status = to;
            from
        };
        if from != to {
            info!("同步状态: {} -> {}", from, to);
            self.events.emit(SyncEvent::StatusChanged { from, to });
        }
    }

    async fn ensure_status(&self, expected: SyncStatus) -> Result<()> {
        let state = self.state.read().await;
        if state.status != expected {
            return Err(SyncError::InvalidState(format!(
                "当前状态为 {}，该操作要求 {}",
                state.status, expected
            )));
        }
        if state.snapshot.is_none() {
            return Err(SyncError::InvalidState(
                "没有已加载的数据源".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_token(&self) -> Result<()> {
        if self.config.upload_token.trim().is_empty() {
            return Err(SyncError::Config("缺少上传令牌 (upload_token)".to_string()));
        }
        Ok(())
    }

    fn push_log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = self.log.append(level, message);
        match entry.level {
            LogLevel::Info => info!("{}", entry.message),
            LogLevel::Warn => warn!("{}", entry.message),
            LogLevel::Error => error!("{}", entry.message),
        }
        self.events.emit(SyncEvent::LogAppended(entry));
    }

    fn pause_marker_present(&self) -> bool {
        self.config.pause_marker_path().exists()
    }

    fn clear_pause_marker(&self) {
        let path = self.config.pause_marker_path();
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("清除暂停标记失败: {}", e);
            }
        }
    }
}
