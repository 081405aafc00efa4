//! start / resume / retry 的共同执行路径
//!
//! 三个命令对进程来说是同一件事：加载快照、对照检查点去重、逐批上传。
//! 区别只在意图：resume / retry 期待已有检查点，没有时给出提示。
//! 上传中 Ctrl+C 转为暂停请求，在途请求中止、进度落盘后退出；
//! 其余阶段 Ctrl+C 直接结束进程。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use alphanote_sync_sdk::{HttpUploadTransport, SyncController, SyncStatus, DEFAULT_BATCH_SIZE};

use crate::utils;

/// 上传类命令的公共参数
#[derive(Debug, Args)]
pub struct RunArgs {
    /// 知乎快照库路径（SQLite 单文件）
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// 上传令牌
    #[arg(
        long,
        env = "ALPHANOTE_UPLOAD_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub token: String,

    /// 服务器基础地址
    #[arg(long, default_value = "https://sync.alphanote.app")]
    pub server: String,

    /// 单批最大记录数
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// 数据目录（检查点与暂停标记），默认 ~/.alphanote/sync
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// 同步完成后保留检查点（默认清空）
    #[arg(long)]
    pub keep_checkpoint: bool,

    /// 跳过上传前的服务端预检
    #[arg(long)]
    pub no_preflight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Start,
    Resume,
    Retry,
}

pub async fn handle_run(args: RunArgs, mode: RunMode) -> Result<ExitCode> {
    let config = utils::base_config(args.data_dir)
        .server_url(&args.server)
        .upload_token(&args.token)
        .batch_size(args.batch_size)
        .preflight(!args.no_preflight)
        .clear_on_complete(!args.keep_checkpoint)
        .build();

    let transport = HttpUploadTransport::new(&config)?;
    let controller = Arc::new(SyncController::new(config, transport)?);

    let summary = controller.load(&args.source).await?;
    info!(
        "快照已加载: {} (内容 {} 条, 创作者 {} 条)",
        summary.fingerprint, summary.content_count, summary.creator_count
    );

    match controller.checkpoint().meta(&summary.fingerprint).await? {
        Some(meta) => info!(
            "发现检查点: 已确认内容 {} 条 / 创作者 {} 条，只上传剩余部分",
            meta.uploaded_content, meta.uploaded_creators
        ),
        None if mode != RunMode::Start => {
            warn!("没有找到可续传的检查点，将全新开始");
        }
        None => {}
    }

    // Ctrl+C 在上传中转为暂停请求，等当前批次处理完、进度落盘；
    // 其余阶段没有可暂停的会话，直接退出（再按一次也会走到这里）
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupt_exits(controller.status().await) {
                    info!("收到 Ctrl+C，退出");
                    std::process::exit(130);
                }
                info!("收到 Ctrl+C，请求暂停...");
                controller.pause().await;
            }
        });
    }

    let status = controller.start_upload().await?;
    let progress = controller.progress().await;
    match status {
        SyncStatus::Completed => {
            info!(
                "同步完成: 服务端新增 {} 条，更新 {} 条",
                progress.inserted_total, progress.updated_total
            );
            Ok(ExitCode::SUCCESS)
        }
        status => {
            info!(
                "同步停在「{}」，进度 {:.1}%，可用 resume 继续",
                status,
                progress.percent()
            );
            Ok(ExitCode::from(2))
        }
    }
}

/// Ctrl+C 处置：仅上传中转为暂停请求，其余状态直接退出进程
fn interrupt_exits(status: SyncStatus) -> bool {
    status != SyncStatus::Uploading
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_exits_unless_uploading() {
        assert!(!interrupt_exits(SyncStatus::Uploading));
        assert!(interrupt_exits(SyncStatus::Idle));
        assert!(interrupt_exits(SyncStatus::Loading));
        assert!(interrupt_exits(SyncStatus::Ready));
        assert!(interrupt_exits(SyncStatus::Paused));
        assert!(interrupt_exits(SyncStatus::Completed));
        assert!(interrupt_exits(SyncStatus::Error));
    }
}
