//! 快照数据导出
//!
//! 从知乎快照库（SQLite 单文件）只读导出内容与创作者记录：
//! - 只读打开，绝不修改快照文件
//! - 按 rowid 升序导出，任意两次导出顺序一致
//! - 单表缺失仅告警并按空表处理，不中断整体流程
//! - 脏行字段宽松读取：数字列容忍字符串存储，文本列容忍数字存储

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, warn};

use crate::entities::{ContentRecord, CreatorRecord};
use crate::error::{Result, SyncError};

/// 内容表名
const CONTENT_TABLE: &str = "zhihu_content";
/// 创作者表名
const CREATOR_TABLE: &str = "zhihu_creator";

/// 根据快照文件路径计算数据源指纹（取文件名，不含目录）
///
/// 同名文件视为同一数据源，检查点按指纹隔离。
pub fn snapshot_fingerprint(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// 快照导出器
pub struct SnapshotExtractor {
    conn: Connection,
    path: PathBuf,
    fingerprint: String,
}

impl SnapshotExtractor {
    /// 只读打开快照库
    ///
    /// 文件不存在、非 SQLite 格式、结构损坏都报 Format 错误。
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SyncError::Format(format!(
                "快照文件不存在: {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SyncError::Format(format!("打开快照库失败: {}", e)))?;

        // SQLite 延迟读取文件头，先做一次探测查询让坏文件尽早暴露
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| SyncError::Format(format!("快照库格式无效: {}", e)))?;

        let fingerprint = snapshot_fingerprint(&path);
        debug!("快照库已打开: {} (指纹: {})", path.display(), fingerprint);

        Ok(Self {
            conn,
            path,
            fingerprint,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 数据源指纹
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// 内容记录总数（表缺失按 0 处理）
    pub fn content_count(&self) -> Result<u64> {
        self.count_rows(CONTENT_TABLE)
    }

    /// 创作者记录总数（表缺失按 0 处理）
    pub fn creator_count(&self) -> Result<u64> {
        self.count_rows(CREATOR_TABLE)
    }

    /// 按内容类型统计条数（stats 展示用）
    pub fn content_type_stats(&self) -> Result<Vec<(String, u64)>> {
        if !self.table_exists(CONTENT_TABLE)? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(content_type, 'article'), COUNT(*) \
             FROM zhihu_content GROUP BY content_type ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    /// 导出全部内容记录（按 rowid 升序）
    pub fn extract_content(&self) -> Result<Vec<ContentRecord>> {
        if !self.table_exists(CONTENT_TABLE)? {
            warn!("快照库缺少 {} 表，按无内容处理", CONTENT_TABLE);
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT content_id, content_type, title, content_text, content_url, \
             created_time, updated_time, voteup_count, comment_count, \
             user_id, user_nickname, user_avatar \
             FROM zhihu_content ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ContentRecord {
                content_id: text_or_none(row, 0)?.unwrap_or_default(),
                content_type: text_or_none(row, 1)?
                    .unwrap_or_else(|| "article".to_string()),
                title: text_or_none(row, 2)?.unwrap_or_default(),
                content_text: text_or_none(row, 3)?,
                content_url: text_or_none(row, 4)?,
                created_time: int_or_zero(row, 5)?,
                updated_time: int_or_zero(row, 6)?,
                voteup_count: int_or_zero(row, 7)?,
                comment_count: int_or_zero(row, 8)?,
                author_id: text_or_none(row, 9)?,
                author_name: text_or_none(row, 10)?,
                author_avatar: text_or_none(row, 11)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            let record = row?;
            if record.content_id.is_empty() {
                warn!("跳过 content_id 为空的内容行");
                continue;
            }
            records.push(record);
        }
        debug!("内容导出完成: {} 条", records.len());
        Ok(records)
    }

    /// 导出全部创作者记录（按 rowid 升序）
    ///
    /// 快照库中回答数与赞同数的列名是历史拼写 anwser_count /
    /// get_voteup_count，按原样读取。
    pub fn extract_creators(&self) -> Result<Vec<CreatorRecord>> {
        if !self.table_exists(CREATOR_TABLE)? {
            warn!("快照库缺少 {} 表，按无创作者处理", CREATOR_TABLE);
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT user_id, url_token, user_nickname, user_avatar, user_link, \
             gender, fans, follows, anwser_count, article_count, get_voteup_count \
             FROM zhihu_creator ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(CreatorRecord {
                user_id: text_or_none(row, 0)?.unwrap_or_default(),
                url_token: text_or_none(row, 1)?.unwrap_or_default(),
                user_nickname: text_or_none(row, 2)?.unwrap_or_default(),
                user_avatar: text_or_none(row, 3)?,
                user_link: text_or_none(row, 4)?,
                gender: text_or_none(row, 5)?,
                fans: int_or_zero(row, 6)?,
                follows: int_or_zero(row, 7)?,
                answer_count: int_or_zero(row, 8)?,
                article_count: int_or_zero(row, 9)?,
                voteup_count: int_or_zero(row, 10)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            let record = row?;
            if record.user_id.is_empty() {
                warn!("跳过 user_id 为空的创作者行");
                continue;
            }
            records.push(record);
        }
        debug!("创作者导出完成: {} 条", records.len());
        Ok(records)
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        if !self.table_exists(table)? {
            warn!("快照库缺少 {} 表，按空表处理", table);
            return Ok(0);
        }
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}

/// 宽松读取文本列：TEXT 原样、数字转字符串、NULL 为 None
fn text_or_none(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(n) => Some(n.to_string()),
        ValueRef::Blob(_) => None,
    };
    Ok(value)
}

/// 宽松读取整数列：数字原样、数字字符串解析、其余按 0
fn int_or_zero(row: &Row<'_>, idx: usize) -> rusqlite::Result<i64> {
    let value = match row.get_ref(idx)? {
        ValueRef::Integer(n) => n,
        ValueRef::Real(n) => n as i64,
        ValueRef::Text(text) => String::from_utf8_lossy(text).trim().parse().unwrap_or(0),
        _ => 0,
    };
    Ok(value)
}
