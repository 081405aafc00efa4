//! pause / reset 两个跨进程控制命令
//!
//! 检查点库是单进程独占的，控制命令不直接操作运行中的同步进程：
//! - pause 写入暂停标记文件，同步进程在批次之间轮询该标记
//! - reset 在没有同步进程运行时直接清空检查点

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use alphanote_sync_sdk::{snapshot_fingerprint, CheckpointStore};

use crate::utils;

#[derive(Debug, Args)]
pub struct PauseArgs {
    /// 数据目录（检查点与暂停标记），默认 ~/.alphanote/sync
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

pub async fn handle_pause(args: PauseArgs) -> Result<ExitCode> {
    let config = utils::base_config(args.data_dir).build();
    let marker = config.pause_marker_path();
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("创建数据目录失败: {}", parent.display()))?;
    }
    std::fs::write(&marker, chrono::Utc::now().to_rfc3339())
        .with_context(|| format!("写入暂停标记失败: {}", marker.display()))?;

    info!("已写入暂停标记: {}", marker.display());
    println!("已请求暂停。运行中的同步会在当前批次确认后停下；");
    println!("下次 start / resume 会自动清除该标记。");
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// 知乎快照库路径，用于定位要清空的检查点
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// 数据目录，默认 ~/.alphanote/sync
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

pub async fn handle_reset(args: ResetArgs) -> Result<ExitCode> {
    let config = utils::base_config(args.data_dir).build();
    let fingerprint = snapshot_fingerprint(&args.source);

    // 同步进程运行中时 sled 文件锁会让 open 失败，reset 被拒绝
    let store = CheckpointStore::open(config.checkpoint_path())?;
    store.clear(&fingerprint).await?;

    let marker = config.pause_marker_path();
    if marker.exists() {
        let _ = std::fs::remove_file(&marker);
    }

    println!("检查点已清空: {}", fingerprint);
    println!("下次同步将从头上传全部记录。");
    Ok(ExitCode::SUCCESS)
}
