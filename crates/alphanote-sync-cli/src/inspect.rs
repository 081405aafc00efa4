//! status / stats 两个只读查询命令

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use alphanote_sync_sdk::scheduler;
use alphanote_sync_sdk::{
    snapshot_fingerprint, CheckpointStore, EntityKind, SnapshotExtractor, DEFAULT_BATCH_SIZE,
};

use crate::utils;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// 知乎快照库路径；省略时列出所有持有检查点的数据源
    #[arg(long, value_name = "PATH")]
    pub source: Option<PathBuf>,

    /// 数据目录，默认 ~/.alphanote/sync
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

pub async fn handle_status(args: StatusArgs) -> Result<ExitCode> {
    let config = utils::base_config(args.data_dir).build();
    let store = CheckpointStore::open(config.checkpoint_path())?;

    let Some(source) = args.source else {
        let fingerprints = store.fingerprints().await?;
        if fingerprints.is_empty() {
            println!("没有任何检查点。");
        } else {
            println!("持有检查点的数据源:");
            for fingerprint in fingerprints {
                println!("  {}", fingerprint);
            }
        }
        return Ok(ExitCode::SUCCESS);
    };

    let fingerprint = snapshot_fingerprint(&source);
    println!("数据源: {}", fingerprint);

    match store.meta(&fingerprint).await? {
        Some(meta) => {
            println!("检查点:");
            println!("  已确认内容:   {} 条", meta.uploaded_content);
            println!("  已确认创作者: {} 条", meta.uploaded_creators);
            println!("  创建时间:     {}", utils::format_ms(meta.created_at));
            println!("  更新时间:     {}", utils::format_ms(meta.updated_at));
        }
        None => println!("检查点: 无（尚未同步过，或完成后已清空）"),
    }

    match store.load_session(&fingerprint).await? {
        Some(session) => {
            let progress = &session.progress;
            println!("最近会话:");
            println!("  状态:   {}", session.status);
            println!(
                "  进度:   {:.1}% (批次 {}/{}，跳过 {} 批)",
                progress.percent(),
                progress.finished_batches,
                progress.planned_batches,
                progress.skipped_batches
            );
            println!("  写入于: {}", utils::format_ms(session.updated_at));
        }
        None => println!("最近会话: 无记录"),
    }

    if config.pause_marker_path().exists() {
        println!("暂停标记: 存在（下次 start / resume 会清除）");
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// 知乎快照库路径（SQLite 单文件）
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// 数据目录，默认 ~/.alphanote/sync
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// 单批最大记录数，用于估算批次数
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

pub async fn handle_stats(args: StatsArgs) -> Result<ExitCode> {
    let extractor = SnapshotExtractor::open(&args.source)?;

    let content = extractor.content_count()?;
    let creators = extractor.creator_count()?;
    println!("快照: {}", extractor.fingerprint());
    println!("  内容:   {} 条", content);
    println!("  创作者: {} 条", creators);

    let stats = extractor.content_type_stats()?;
    if !stats.is_empty() {
        println!("  按类型:");
        for (kind, count) in stats {
            println!("    {:<10} {} 条", kind, count);
        }
    }

    let config = utils::base_config(args.data_dir).build();
    let store = CheckpointStore::open(config.checkpoint_path())?;
    let confirmed = store.load(extractor.fingerprint()).await?;
    let (done_content, done_creators) = (
        confirmed.count(EntityKind::Content),
        confirmed.count(EntityKind::Creator),
    );
    if !confirmed.is_empty() {
        println!("检查点: 已确认内容 {} 条 / 创作者 {} 条", done_content, done_creators);
    }

    let batches = scheduler::planned_batches(
        content.saturating_sub(done_content) as usize,
        creators.saturating_sub(done_creators) as usize,
        args.batch_size,
    )?;
    if confirmed.is_empty() {
        println!("  全量上传需 {} 批（每批最多 {} 条）", batches, args.batch_size);
    } else {
        println!("  续传还需 {} 批（每批最多 {} 条）", batches, args.batch_size);
    }
    Ok(ExitCode::SUCCESS)
}
