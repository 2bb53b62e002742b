//! # Gateway エラー型
//!
//! HTTP境界での分類済みエラー。クライアントには分類済みの文字列のみを返し、
//! 詳細（上流のレスポンス本文、接続先URL等）はログにのみ出力する。

use axum::http::StatusCode;
use axum::Json;
use dronox_crypto::VerificationFailure;
use dronox_types::ErrorResponse;

use crate::storage::StorageError;
use crate::submit::SubmitError;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// address / signature / message のいずれかが欠落または空
    #[error("必須フィールドが不足しています")]
    MissingFields,
    /// リクエストボディがJSONとして解釈できない
    #[error("リクエストボディのパースに失敗: {0}")]
    InvalidJson(String),
    /// 未対応のネットワーク
    #[error("未対応のネットワーク: {0}")]
    UnsupportedNetwork(String),
    /// 署名検証の失敗（不正なアドレス・署名形式・偽造署名）
    #[error("署名検証に失敗: {0}")]
    SignatureRejected(VerificationFailure),
    /// 出品情報の検証に失敗
    #[error("出品情報が不正: {0}")]
    InvalidListing(String),
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(#[from] StorageError),
}

impl From<VerificationFailure> for GatewayError {
    fn from(failure: VerificationFailure) -> Self {
        match failure {
            VerificationFailure::UnsupportedNetwork(name) => GatewayError::UnsupportedNetwork(name),
            other => GatewayError::SignatureRejected(other),
        }
    }
}

impl From<SubmitError> for GatewayError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::InvalidListing(detail) => GatewayError::InvalidListing(detail),
            SubmitError::Storage(e) => GatewayError::Storage(e),
        }
    }
}

impl GatewayError {
    /// HTTPステータスとクライアント向けレスポンス本文。
    fn status_and_body(&self) -> (StatusCode, ErrorResponse) {
        let body = |error: String, reason: Option<&str>| ErrorResponse {
            error,
            reason: reason.map(str::to_string),
        };
        match self {
            GatewayError::MissingFields => {
                (StatusCode::BAD_REQUEST, body("Missing fields".into(), None))
            }
            GatewayError::InvalidJson(_) => {
                (StatusCode::BAD_REQUEST, body("Invalid JSON body".into(), None))
            }
            GatewayError::UnsupportedNetwork(_) => (
                StatusCode::BAD_REQUEST,
                body("Unsupported network".into(), Some("unsupported_network")),
            ),
            GatewayError::SignatureRejected(failure) => (
                StatusCode::FORBIDDEN,
                body("Invalid signature".into(), Some(failure.code())),
            ),
            GatewayError::InvalidListing(detail) => (
                StatusCode::BAD_REQUEST,
                body(format!("Invalid listing: {detail}"), None),
            ),
            GatewayError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                body(format!("StorageError: {}", e.class()), None),
            ),
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        } else {
            tracing::debug!(error = %self, status = %status, "リクエストを拒否");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failures_map_to_forbidden_with_code() {
        let err: GatewayError =
            VerificationFailure::MalformedAddress("チェックサム".into()).into();
        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, "Invalid signature");
        assert_eq!(body.reason.as_deref(), Some("malformed_address"));
    }

    #[test]
    fn test_unsupported_network_is_client_error() {
        let err: GatewayError = VerificationFailure::UnsupportedNetwork("btc".into()).into();
        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Unsupported network");
    }

    /// ストレージエラーの詳細（接続先・上流本文）はクライアントに返さない
    #[test]
    fn test_storage_error_does_not_leak_detail() {
        let err = GatewayError::Storage(StorageError::Rejected {
            status: 401,
            message: "JWT invalid for https://secret.supabase.co apikey=abc".into(),
        });
        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "StorageError: rejected (HTTP 401)");
        assert!(!body.error.contains("supabase.co"));

        let (_, body) = GatewayError::Storage(StorageError::Timeout).status_and_body();
        assert_eq!(body.error, "StorageError: timeout");
    }
}
