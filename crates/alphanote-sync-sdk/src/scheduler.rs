//! 批次调度
//!
//! 把待上传记录切分为有界有序批次：
//! - 保持导出顺序，批内与批间都不重排
//! - 每批最多 max_batch_size 条，仅最后一批可以不满
//! - 批次号在各自类别内从 1 开始，批次 ID 形如 content-3 / creator-1

use crate::entities::{ContentRecord, CreatorRecord, EntityKind};
use crate::error::{Result, SyncError};

/// 一个待上传批次
#[derive(Debug, Clone)]
pub struct Batch {
    /// 实体类别
    pub kind: EntityKind,
    /// 类别内批次号，从 1 开始
    pub seq: u64,
    /// 内容记录（kind 为 Content 时非空）
    pub content: Vec<ContentRecord>,
    /// 创作者记录（kind 为 Creator 时非空）
    pub creators: Vec<CreatorRecord>,
}

impl Batch {
    /// 批次 ID，形如 content-1
    pub fn batch_id(&self) -> String {
        format!("{}-{}", self.kind.as_str(), self.seq)
    }

    /// 批内记录数
    pub fn len(&self) -> usize {
        match self.kind {
            EntityKind::Content => self.content.len(),
            EntityKind::Creator => self.creators.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 批内全部去重主键
    pub fn dedup_ids(&self) -> Vec<String> {
        match self.kind {
            EntityKind::Content => self.content.iter().map(|r| r.content_id.clone()).collect(),
            EntityKind::Creator => self.creators.iter().map(|r| r.user_id.clone()).collect(),
        }
    }
}

/// 切分内容批次
pub fn schedule_content(pending: Vec<ContentRecord>, max_batch_size: usize) -> Result<Vec<Batch>> {
    check_batch_size(max_batch_size)?;
    let batches = chunked(pending, max_batch_size)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Batch {
            kind: EntityKind::Content,
            seq: (i + 1) as u64,
            content: chunk,
            creators: Vec::new(),
        })
        .collect();
    Ok(batches)
}

/// 切分创作者批次
pub fn schedule_creators(pending: Vec<CreatorRecord>, max_batch_size: usize) -> Result<Vec<Batch>> {
    check_batch_size(max_batch_size)?;
    let batches = chunked(pending, max_batch_size)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Batch {
            kind: EntityKind::Creator,
            seq: (i + 1) as u64,
            content: Vec::new(),
            creators: chunk,
        })
        .collect();
    Ok(batches)
}

/// 本轮待传批次总数：各类别 ceil(待传数 / 批大小) 之和
pub fn planned_batches(
    pending_content: usize,
    pending_creators: usize,
    max_batch_size: usize,
) -> Result<u64> {
    check_batch_size(max_batch_size)?;
    Ok(div_ceil(pending_content, max_batch_size) + div_ceil(pending_creators, max_batch_size))
}

fn check_batch_size(max_batch_size: usize) -> Result<()> {
    if max_batch_size == 0 {
        return Err(SyncError::Config("批次大小不能为 0".to_string()));
    }
    Ok(())
}

fn div_ceil(n: usize, d: usize) -> u64 {
    ((n + d - 1) / d) as u64
}

fn chunked<T>(records: Vec<T>, max: usize) -> Vec<Vec<T>> {
    if records.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::with_capacity((records.len() + max - 1) / max);
    let mut chunk = Vec::with_capacity(max.min(records.len()));
    for record in records {
        chunk.push(record);
        if chunk.len() == max {
            chunks.push(std::mem::take(&mut chunk));
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(id: &str) -> ContentRecord {
        ContentRecord {
            content_id: id.to_string(),
            ..Default::default()
        }
    }

    fn creator(id: &str) -> CreatorRecord {
        CreatorRecord {
            user_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_batches_are_bounded_and_ordered() {
        let pending: Vec<_> = (0..120).map(|i| content(&format!("c{}", i))).collect();
        let batches = schedule_content(pending, 50).unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[1].len(), 50);
        assert_eq!(batches[2].len(), 20);
        assert_eq!(batches[0].batch_id(), "content-1");
        assert_eq!(batches[2].batch_id(), "content-3");

        // 顺序不重排：第二批从第 50 条开始
        assert_eq!(batches[0].content[0].content_id, "c0");
        assert_eq!(batches[1].content[0].content_id, "c50");
        assert_eq!(batches[2].content[19].content_id, "c119");
    }

    #[test]
    fn test_exact_multiple_has_no_short_batch() {
        let pending: Vec<_> = (0..100).map(|i| content(&format!("c{}", i))).collect();
        let batches = schedule_content(pending, 50).unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 50));
    }

    #[test]
    fn test_empty_pending_yields_no_batches() {
        assert!(schedule_content(Vec::new(), 50).unwrap().is_empty());
        assert!(schedule_creators(Vec::new(), 50).unwrap().is_empty());
        assert_eq!(planned_batches(0, 0, 50).unwrap(), 0);
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        let result = schedule_content(vec![content("c1")], 0);
        assert!(matches!(result, Err(SyncError::Config(_))));
        assert!(matches!(planned_batches(1, 1, 0), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_creator_batches_and_ids() {
        let pending: Vec<_> = (0..3).map(|i| creator(&format!("u{}", i))).collect();
        let batches = schedule_creators(pending, 2).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_id(), "creator-1");
        assert_eq!(batches[1].batch_id(), "creator-2");
        assert_eq!(batches[0].dedup_ids(), vec!["u0", "u1"]);
        assert_eq!(batches[1].dedup_ids(), vec!["u2"]);
    }

    #[test]
    fn test_planned_batches_counts_both_kinds() {
        // 120 条内容 + 30 条创作者，批大小 50 → 3 + 1
        assert_eq!(planned_batches(120, 30, 50).unwrap(), 4);
        assert_eq!(planned_batches(50, 0, 50).unwrap(), 1);
        assert_eq!(planned_batches(51, 1, 50).unwrap(), 3);
    }
}
