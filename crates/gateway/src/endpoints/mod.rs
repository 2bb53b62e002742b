//! # Gatewayエンドポイント
//!
//! - `GET /`: 死活監視
//! - `POST /verify`: ウォレット署名の検証 + 出品登録
//! - その他: `Route not found` (404)

pub mod status;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::GatewayState;

pub use status::{handle_not_found, handle_status};
pub use verify::handle_verify;

/// 全エンドポイントを束ねたルーターを構築する。
pub fn router(state: Arc<GatewayState>, cors: CorsLayer) -> axum::Router {
    axum::Router::new()
        .route("/", get(handle_status))
        .route("/verify", post(handle_verify))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// 許可オリジンの一覧からCORSレイヤーを構築する。
///
/// 一覧が空、または `*` を含む場合は全オリジンを許可する。
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "不正なCORSオリジンを無視します");
                None
            }
        })
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}
