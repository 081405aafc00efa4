//! 上传传输层
//!
//! 本模块提供：
//! - `UploadTransport`：上传通道抽象，便于测试替换
//! - `HttpUploadTransport`：基于 reqwest 的默认实现
//! - `UploadFailure`：按处置方式分类的上传失败
//!
//! 协议约定：
//! - POST {server}/api/sync/upload，请求头 X-Upload-Token
//! - 请求体 { contentRecords, creatorRecords, batchId }
//! - 成功响应 { insertedCount, updatedCount }
//! - 预检 GET {server}/api/sync/upload/status 返回服务端已有数据概要

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SyncConfig;
use crate::entities::{ContentRecord, CreatorRecord};
use crate::error::SyncError;
use crate::scheduler::Batch;
use crate::version::USER_AGENT;

/// 上传令牌请求头
pub const UPLOAD_TOKEN_HEADER: &str = "X-Upload-Token";

/// 上传失败分类
#[derive(Debug, Clone, thiserror::Error)]
pub enum UploadFailure {
    /// 令牌无效或过期（HTTP 401 / 403），致命，需人工更换令牌
    #[error("认证失败 (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },
    /// 批次被服务端拒绝（其余 4xx），跳过该批继续
    #[error("批次被拒绝 (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },
    /// 服务器或网络故障（5xx、超时、连接失败），停止并等待重试
    #[error("服务器或网络错误: {detail}")]
    Server { status: Option<u16>, detail: String },
    /// 调用方主动取消
    #[error("上传已取消")]
    Cancelled,
}

impl UploadFailure {
    /// 按 HTTP 状态码分类
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            401 | 403 => UploadFailure::Auth { status, detail },
            400..=499 => UploadFailure::Rejected { status, detail },
            _ => UploadFailure::Server {
                status: Some(status),
                detail,
            },
        }
    }

    /// 是否可通过重试恢复
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadFailure::Server { .. })
    }
}

impl From<UploadFailure> for SyncError {
    fn from(failure: UploadFailure) -> Self {
        match &failure {
            UploadFailure::Auth { .. } => SyncError::Auth(failure.to_string()),
            UploadFailure::Rejected { .. } => SyncError::Validation(failure.to_string()),
            UploadFailure::Server { .. } => SyncError::Server(failure.to_string()),
            UploadFailure::Cancelled => SyncError::Cancelled,
        }
    }
}

/// 上传成功回执
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// 服务端新增条数
    #[serde(default)]
    pub inserted_count: u64,
    /// 服务端更新条数
    #[serde(default)]
    pub updated_count: u64,
}

/// 服务端同步现状（预检响应）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteSyncStatus {
    /// 服务端已存在的内容 ID
    #[serde(default)]
    pub existing_content_ids: Vec<String>,
    /// 服务端内容总数
    #[serde(default)]
    pub article_count: u64,
    /// 服务端创作者总数
    #[serde(default)]
    pub creator_count: u64,
}

/// 上传请求体（键名与服务端路由约定一致，记录本身保持 snake_case）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    content_records: &'a [ContentRecord],
    creator_records: &'a [CreatorRecord],
    batch_id: String,
}

/// 服务端错误响应体；解析不出 detail 时退回原始文本
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// 上传通道抽象
///
/// 同一时刻最多一个在途请求由调用方保证，实现只处理单个请求。
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// 上传一个批次
    async fn upload_batch(
        &self,
        batch: &Batch,
        token: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<UploadReceipt, UploadFailure>;

    /// 预检：查询服务端已有数据概要
    async fn remote_status(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<RemoteSyncStatus, UploadFailure>;
}

/// 基于 reqwest 的上传通道
pub struct HttpUploadTransport {
    client: reqwest::Client,
    upload_url: String,
    status_url: String,
}

impl HttpUploadTransport {
    /// 按配置构建 HTTP 通道
    pub fn new(config: &SyncConfig) -> crate::error::Result<Self> {
        let base = config.server_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(SyncError::Config("服务器地址不能为空".to_string()));
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("构建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            upload_url: format!("{}/api/sync/upload", base),
            status_url: format!("{}/api/sync/upload/status", base),
        })
    }

    /// 把非 2xx 响应解析为分类失败
    async fn classify_response(response: reqwest::Response) -> UploadFailure {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "无法读取错误信息".to_string());
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.detail)
            .unwrap_or(text);
        UploadFailure::from_status(status, detail)
    }
}

/// 网络层错误统一归为 Server 类（停止并等待重试）
fn network_failure(error: reqwest::Error) -> UploadFailure {
    let detail = if error.is_timeout() {
        format!("请求超时: {}", error)
    } else if error.is_connect() {
        format!("连接失败: {}", error)
    } else {
        error.to_string()
    };
    UploadFailure::Server {
        status: None,
        detail,
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload_batch(
        &self,
        batch: &Batch,
        token: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<UploadReceipt, UploadFailure> {
        let body = UploadRequest {
            content_records: &batch.content,
            creator_records: &batch.creators,
            batch_id: batch.batch_id(),
        };
        debug!("📤 上传批次 {} ({} 条)", body.batch_id, batch.len());

        let request = self
            .client
            .post(&self.upload_url)
            .header(UPLOAD_TOKEN_HEADER, token)
            .json(&body)
            .send();

        // 取消时直接丢弃在途请求；该批未确认，恢复后重发
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadFailure::Cancelled),
            result = request => result.map_err(network_failure)?,
        };

        if !response.status().is_success() {
            return Err(Self::classify_response(response).await);
        }

        response.json::<UploadReceipt>().await.map_err(|e| {
            UploadFailure::Server {
                status: None,
                detail: format!("解析上传响应失败: {}", e),
            }
        })
    }

    async fn remote_status(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<RemoteSyncStatus, UploadFailure> {
        let request = self
            .client
            .get(&self.status_url)
            .header(UPLOAD_TOKEN_HEADER, token)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadFailure::Cancelled),
            result = request => result.map_err(network_failure)?,
        };

        if !response.status().is_success() {
            return Err(Self::classify_response(response).await);
        }

        response.json::<RemoteSyncStatus>().await.map_err(|e| {
            UploadFailure::Server {
                status: None,
                detail: format!("解析预检响应失败: {}", e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityKind;

    #[test]
    fn test_failure_classification_by_status() {
        assert!(matches!(
            UploadFailure::from_status(401, "bad token".into()),
            UploadFailure::Auth { status: 401, .. }
        ));
        assert!(matches!(
            UploadFailure::from_status(403, "forbidden".into()),
            UploadFailure::Auth { status: 403, .. }
        ));
        assert!(matches!(
            UploadFailure::from_status(422, "invalid".into()),
            UploadFailure::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            UploadFailure::from_status(400, "bad".into()),
            UploadFailure::Rejected { status: 400, .. }
        ));
        assert!(matches!(
            UploadFailure::from_status(500, "boom".into()),
            UploadFailure::Server { status: Some(500), .. }
        ));
        assert!(matches!(
            UploadFailure::from_status(503, "busy".into()),
            UploadFailure::Server { status: Some(503), .. }
        ));
    }

    #[test]
    fn test_only_server_failures_are_retryable() {
        assert!(UploadFailure::from_status(500, String::new()).is_retryable());
        assert!(!UploadFailure::from_status(401, String::new()).is_retryable());
        assert!(!UploadFailure::from_status(422, String::new()).is_retryable());
        assert!(!UploadFailure::Cancelled.is_retryable());
    }

    #[test]
    fn test_failure_maps_to_sync_error() {
        let auth: SyncError = UploadFailure::from_status(401, "x".into()).into();
        assert!(matches!(auth, SyncError::Auth(_)));
        assert!(auth.is_fatal());

        let server: SyncError = UploadFailure::from_status(500, "x".into()).into();
        assert!(matches!(server, SyncError::Server(_)));
        assert!(server.is_retryable());

        let rejected: SyncError = UploadFailure::from_status(422, "x".into()).into();
        assert!(matches!(rejected, SyncError::Validation(_)));

        let cancelled: SyncError = UploadFailure::Cancelled.into();
        assert!(matches!(cancelled, SyncError::Cancelled));
    }

    #[test]
    fn test_upload_request_wire_shape() {
        let batch = Batch {
            kind: EntityKind::Content,
            seq: 2,
            content: vec![ContentRecord {
                content_id: "c1".to_string(),
                content_type: "article".to_string(),
                ..Default::default()
            }],
            creators: Vec::new(),
        };
        let body = UploadRequest {
            content_records: &batch.content,
            creator_records: &batch.creators,
            batch_id: batch.batch_id(),
        };

        let json = serde_json::to_value(&body).unwrap();
        // 外层键为 camelCase，记录本身保持 snake_case
        assert_eq!(json["batchId"], "content-2");
        assert_eq!(json["contentRecords"][0]["content_id"], "c1");
        assert!(json["creatorRecords"].as_array().unwrap().is_empty());
        assert!(json.get("content_records").is_none());
    }

    #[test]
    fn test_receipt_and_status_deserialization() {
        let receipt: UploadReceipt =
            serde_json::from_str(r#"{"insertedCount": 30, "updatedCount": 20}"#).unwrap();
        assert_eq!(receipt.inserted_count, 30);
        assert_eq!(receipt.updated_count, 20);

        // 字段缺失按 0 处理
        let bare: UploadReceipt = serde_json::from_str("{}").unwrap();
        assert_eq!(bare.inserted_count, 0);

        let status: RemoteSyncStatus = serde_json::from_str(
            r#"{"existing_content_ids": ["c1", "c2"], "article_count": 2, "creator_count": 1}"#,
        )
        .unwrap();
        assert_eq!(status.existing_content_ids.len(), 2);
        assert_eq!(status.article_count, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let config = SyncConfig::builder()
            .server_url("http://127.0.0.1:9")
            .build();
        let transport = HttpUploadTransport::new(&config).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let batch = Batch {
            kind: EntityKind::Content,
            seq: 1,
            content: Vec::new(),
            creators: Vec::new(),
        };
        let result = transport.upload_batch(&batch, "token", &cancel).await;
        assert!(matches!(result, Err(UploadFailure::Cancelled)));
    }

    #[test]
    fn test_empty_server_url_rejected() {
        let config = SyncConfig::default();
        assert!(matches!(
            HttpUploadTransport::new(&config),
            Err(SyncError::Config(_))
        ));
    }
}
