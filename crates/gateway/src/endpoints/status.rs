//! # GET / と未定義ルート

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Json;
use dronox_types::{ErrorResponse, ServiceStatus};

use crate::config::GatewayState;

/// GET / — 死活監視。
pub async fn handle_status(State(state): State<Arc<GatewayState>>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        service: state.service_name.clone(),
        status: "online".to_string(),
    })
}

/// 未定義ルート — 404。
pub async fn handle_not_found(uri: Uri) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Route not found: {}", uri.path()),
            reason: None,
        }),
    )
}
