//! CLI 公共辅助

use std::path::PathBuf;

use chrono::{Local, TimeZone};

use alphanote_sync_sdk::{SyncConfig, SyncConfigBuilder};

/// 以 --data-dir 为准构建配置，未指定时用默认目录
pub fn base_config(data_dir: Option<PathBuf>) -> SyncConfigBuilder {
    let builder = SyncConfig::builder();
    match data_dir {
        Some(dir) => builder.data_dir(dir),
        None => builder,
    }
}

/// 毫秒时间戳转本地时间展示
pub fn format_ms(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => ms.to_string(),
    }
}
