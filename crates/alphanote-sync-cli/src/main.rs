//! AlphaNote Sync CLI - 知乎快照同步命令行工具
//!
//! 退出码约定：
//! - 0: 同步完成
//! - 1: 致命错误（数据源损坏、令牌无效、配置错误）
//! - 2: 未完成但可续传（已暂停、服务器或网络错误）

mod control;
mod inspect;
mod run;
mod utils;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use alphanote_sync_sdk::SyncError;

#[derive(Debug, Parser)]
#[command(name = "alphanote-sync")]
#[command(about = "把本地知乎快照库同步到 AlphaNote 服务端")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "开始同步；已有检查点时自动从断点续传")]
    Start(run::RunArgs),

    #[command(about = "从暂停处恢复上传")]
    Resume(run::RunArgs),

    #[command(about = "出错后重试；已确认批次不会重发")]
    Retry(run::RunArgs),

    #[command(about = "请求正在运行的同步进程暂停")]
    Pause(control::PauseArgs),

    #[command(about = "查看检查点与最近一次会话的进度")]
    Status(inspect::StatusArgs),

    #[command(about = "查看快照数据概况")]
    Stats(inspect::StatsArgs),

    #[command(about = "清空检查点；下次同步从头上传")]
    Reset(control::ResetArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Start(args) => run::handle_run(args, run::RunMode::Start).await,
        Commands::Resume(args) => run::handle_run(args, run::RunMode::Resume).await,
        Commands::Retry(args) => run::handle_run(args, run::RunMode::Retry).await,
        Commands::Pause(args) => control::handle_pause(args).await,
        Commands::Status(args) => inspect::handle_status(args).await,
        Commands::Stats(args) => inspect::handle_stats(args).await,
        Commands::Reset(args) => control::handle_reset(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("错误: {:#}", e);
            exit_code_for(&e)
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

/// 致命错误退出码 1，可续传错误退出码 2
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<SyncError>() {
        Some(e) if !e.is_fatal() => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
