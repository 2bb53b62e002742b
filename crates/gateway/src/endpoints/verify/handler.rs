//! # POST /verify ハンドラ
//!
//! ## 処理フロー
//! 1. 必須3項目（address, signature, message）の存在確認
//! 2. ネットワークの解決（明示指定 → アドレスから推定 → Kaspa）
//! 3. 署名検証（失敗時はストレージを呼ばない）
//! 4. 出品メタデータの検証と1行の追記

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use dronox_crypto::VerificationFailure;
use dronox_types::{Network, VerifyListingRequest, VerifyListingResponse};

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::submit::{ListingMetadata, SignatureClaim};

/// 空文字列（空白のみ含む）を未指定として扱う。
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 署名対象メッセージは空白のみでも署名され得るため、空文字列のみを未指定とする。
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// リクエストのネットワークを決定する。
///
/// `network` が指定されていればそれを解釈し、なければアドレスの形状から推定する。
/// どちらでも決まらない場合は Kaspa とする。
pub(crate) fn resolve_network(
    requested: Option<&str>,
    address: &str,
) -> Result<Network, GatewayError> {
    match requested.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name
            .parse()
            .map_err(|_| GatewayError::UnsupportedNetwork(name.to_string())),
        None => Ok(Network::guess_from_address(address).unwrap_or(Network::Kaspa)),
    }
}

/// POST /verify — ウォレット署名を検証し、成功した場合のみ出品を登録する。
pub async fn handle_verify(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<VerifyListingRequest>, JsonRejection>,
) -> Result<Json<VerifyListingResponse>, GatewayError> {
    let Json(body) = payload.map_err(|e| GatewayError::InvalidJson(e.body_text()))?;

    let (Some(address), Some(signature), Some(message)) = (
        non_blank(body.address),
        non_blank(body.signature),
        non_empty(body.message),
    ) else {
        return Err(GatewayError::MissingFields);
    };

    let network = resolve_network(body.network.as_deref(), &address)?;
    let wallet = address.clone();
    let claim = SignatureClaim {
        network,
        address,
        message,
        signature,
    };

    let verified = claim.verify(&state.registry).map_err(|failure| {
        if !matches!(failure, VerificationFailure::UnsupportedNetwork(_)) {
            tracing::warn!(
                network = %network,
                wallet = %wallet,
                reason = failure.code(),
                "署名検証に失敗"
            );
        }
        GatewayError::from(failure)
    })?;
    tracing::info!(network = %network, wallet = %wallet, "署名検証に成功");

    let metadata = ListingMetadata {
        name: body.nft_name,
        price: body.price,
        image_url: body.image_url,
    };
    state.submitter.submit(verified, metadata).await?;

    Ok(Json(VerifyListingResponse {
        status: "verified".to_string(),
        wallet,
    }))
}
