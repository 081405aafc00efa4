//! 数据实体定义
//!
//! 本模块提供：
//! - `ContentRecord`：知乎内容快照记录（文章 / 回答 / 想法）
//! - `CreatorRecord`：知乎创作者快照记录
//! - `EntityKind`：实体类别，决定上传顺序与检查点键前缀

use serde::{Deserialize, Serialize};

/// 实体类别
///
/// 上传顺序固定：先内容，后创作者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// 内容（zhihu_content 表）
    Content,
    /// 创作者（zhihu_creator 表）
    Creator,
}

impl EntityKind {
    /// 固定的上传顺序
    pub const ORDER: [EntityKind; 2] = [EntityKind::Content, EntityKind::Creator];

    /// 检查点键前缀 / 批次 ID 前缀
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Content => "content",
            EntityKind::Creator => "creator",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Content => write!(f, "内容"),
            EntityKind::Creator => write!(f, "创作者"),
        }
    }
}

/// 知乎内容记录
///
/// 字段与快照库 zhihu_content 表一一对应。个别字段缺失时按约定补默认值
/// （类型缺省 article、标题缺省空串、计数缺省 0），不因脏行中断整体导出。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// 内容唯一 ID，去重主键
    pub content_id: String,
    /// 内容类型：article / answer / pin
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub title: String,
    /// 正文全文，可能为空
    pub content_text: Option<String>,
    pub content_url: Option<String>,
    /// 创建时间（UNIX 秒）
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub updated_time: i64,
    #[serde(default)]
    pub voteup_count: i64,
    #[serde(default)]
    pub comment_count: i64,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub author_avatar: Option<String>,
}

fn default_content_type() -> String {
    "article".to_string()
}

/// 知乎创作者记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorRecord {
    /// 创作者唯一 ID，去重主键
    pub user_id: String,
    #[serde(default)]
    pub url_token: String,
    #[serde(default)]
    pub user_nickname: String,
    pub user_avatar: Option<String>,
    pub user_link: Option<String>,
    pub gender: Option<String>,
    #[serde(default)]
    pub fans: i64,
    #[serde(default)]
    pub follows: i64,
    #[serde(default)]
    pub answer_count: i64,
    #[serde(default)]
    pub article_count: i64,
    #[serde(default)]
    pub voteup_count: i64,
}

impl ContentRecord {
    /// 去重主键
    pub fn dedup_id(&self) -> &str {
        &self.content_id
    }
}

impl CreatorRecord {
    /// 去重主键
    pub fn dedup_id(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_order_and_prefix() {
        assert_eq!(EntityKind::ORDER[0], EntityKind::Content);
        assert_eq!(EntityKind::ORDER[1], EntityKind::Creator);
        assert_eq!(EntityKind::Content.as_str(), "content");
        assert_eq!(EntityKind::Creator.as_str(), "creator");
    }

    #[test]
    fn test_content_record_serializes_snake_case() {
        let record = ContentRecord {
            content_id: "c1".to_string(),
            content_type: "article".to_string(),
            title: "标题".to_string(),
            created_time: 1700000000,
            ..Default::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["content_id"], "c1");
        assert_eq!(json["content_type"], "article");
        assert_eq!(json["created_time"], 1700000000);
        assert!(json["content_text"].is_null());
    }

    #[test]
    fn test_creator_record_deserializes_with_defaults() {
        let record: CreatorRecord =
            serde_json::from_str(r#"{"user_id": "u1", "user_nickname": "张三"}"#).unwrap();

        assert_eq!(record.user_id, "u1");
        assert_eq!(record.user_nickname, "张三");
        assert_eq!(record.url_token, "");
        assert_eq!(record.fans, 0);
        assert!(record.gender.is_none());
    }
}
