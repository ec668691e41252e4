//! HTTP 错误响应
//!
//! 将 `RuleError` 映射为状态码和统一的 JSON 响应体。

use crate::error::RuleError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("请求体无效: {0}")]
    InvalidBody(String),

    #[error("查询参数无效: {0}")]
    InvalidQuery(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rule(e) => match e {
                RuleError::Schema { .. } | RuleError::Parse { .. } | RuleError::NoRulesConfigured => {
                    StatusCode::BAD_REQUEST
                }
                RuleError::RuleNotFound(_) => StatusCode::NOT_FOUND,
                RuleError::Evaluation(_) | RuleError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidBody(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Rule(e) => e.code(),
            Self::InvalidBody(_) => "INVALID_BODY",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 服务端错误只返回通用提示，详细信息记录日志
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "请求处理失败");
            "服务内部错误，请稍后重试".to_string()
        } else {
            self.to_string()
        };

        let data = match &self {
            Self::Rule(RuleError::Schema { details, .. }) if !details.is_empty() => {
                json!({ "details": details })
            }
            Self::Rule(RuleError::Parse { position, .. }) => json!({ "position": position }),
            _ => serde_json::Value::Null,
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": data
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidQuery(rejection.body_text())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(RuleError::schema("bad")), StatusCode::BAD_REQUEST),
            (ApiError::from(RuleError::parse(3, "bad")), StatusCode::BAD_REQUEST),
            (ApiError::from(RuleError::NoRulesConfigured), StatusCode::BAD_REQUEST),
            (
                ApiError::from(RuleError::RuleNotFound("R1".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(RuleError::Evaluation("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::InvalidBody("eof".into()), StatusCode::BAD_REQUEST),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{}", error);
        }
    }

    #[tokio::test]
    async fn test_schema_details_in_body() {
        let error = ApiError::from(RuleError::schema_with_details(
            "规则配置校验失败",
            vec![FieldError::new("rules.0.priority", "优先级必须在1-10之间")],
        ));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("SCHEMA_ERROR"));
        assert_eq!(body["data"]["details"][0]["field"], json!("rules.0.priority"));
    }

    #[tokio::test]
    async fn test_server_error_message_is_generic() {
        let response = ApiError::from(RuleError::Evaluation("secret".into())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(!body["message"].as_str().unwrap().contains("secret"));
    }
}
