//! # Dronox Gateway
//!
//! ウォレット署名を検証し、検証に成功した出品だけを `listings` テーブルに登録する
//! HTTPサービス。
//!
//! ## エンドポイント
//! - `POST /verify`: 署名検証 + 出品登録
//! - `GET /`: 死活監視
//!
//! ## 設計
//! - チェーンごとの検証方式は `dronox-crypto` の `VerifierRegistry` で切り替える
//! - 保存先は `TableStore` トレイトで抽象化（Supabase / インメモリ）
//! - 未検証の主張は型（`VerifiedClaim`）で排除し、ストレージに到達させない

mod config;
mod endpoints;
mod error;
mod storage;
mod submit;

use std::sync::Arc;

use dronox_crypto::VerifierRegistry;
use tracing_subscriber::EnvFilter;

use crate::config::{GatewayConfig, GatewayState};
use crate::submit::ListingSubmitter;

// ---------------------------------------------------------------------------
// エントリポイント
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    let store = storage::build_store(&config)?;
    let registry = VerifierRegistry::with_default_chains();
    tracing::info!(
        networks = ?registry.networks(),
        table = %config.listings_table,
        "署名検証方式を登録"
    );

    let mut submitter =
        ListingSubmitter::new(store, config.listings_table.clone(), config.listing_limits);
    if config.writes_idempotency_key() {
        submitter = submitter.with_idempotency_key();
    }

    let state = Arc::new(GatewayState {
        service_name: config.service_name.clone(),
        registry,
        submitter,
    });

    let app = endpoints::router(state, endpoints::cors_layer(&config.cors_allowed_origins));

    let addr = config.bind_addr();
    tracing::info!("Gatewayを {} で起動します", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gatewayを停止しました");
    Ok(())
}

/// Ctrl-Cを待つ。処理中のリクエストは完了まで待ってから停止する。
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルハンドラの登録に失敗");
        return;
    }
    tracing::info!("停止シグナルを受信");
}
