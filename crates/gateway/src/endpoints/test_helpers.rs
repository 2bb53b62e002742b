//! # エンドポイントテスト用共通ヘルパー
//!
//! Gatewayを実際のルーターで起動し、ウォレットと同じ手順で署名を作る。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base58::ToBase58;
use dronox_crypto::kaspa::personal_message_hash;
use dronox_crypto::{KaspaAddress, KaspaAddressVersion, VerifierRegistry};
use k256::ecdsa::signature::hazmat::PrehashSigner;

use crate::config::GatewayState;
use crate::storage::{StorageError, TableStore};
use crate::submit::{ListingLimits, ListingSubmitter};

/// テスト用のサービス名。
pub const SERVICE_NAME: &str = "Dronox Test Verifier";

/// 常に失敗するストア。呼び出し回数を記録する。
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl TableStore for FailingStore {
    async fn insert(&self, _table: &str, _record: serde_json::Value) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Rejected {
            status: 503,
            message: "upstream at https://secret.supabase.co is down".to_string(),
        })
    }
}

impl FailingStore {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// 指定したストアで共有状態を構築する。
pub fn test_state(store: Arc<dyn TableStore>) -> Arc<GatewayState> {
    Arc::new(GatewayState {
        service_name: SERVICE_NAME.to_string(),
        registry: VerifierRegistry::with_default_chains(),
        submitter: ListingSubmitter::new(store, "listings", ListingLimits::default()),
    })
}

/// Gatewayを127.0.0.1の空きポートで起動し、ベースURLを返す。
pub async fn start_gateway(state: Arc<GatewayState>) -> String {
    let app = super::router(state, super::cors_layer(&["*".to_string()]));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}

/// Kaspaウォレット（Schnorr）のアドレスと署名（hex）。
pub fn kaspa_sign(message: &str) -> (String, String) {
    let key = k256::schnorr::SigningKey::random(&mut rand::rngs::OsRng);
    let address = KaspaAddress::new(
        "kaspa",
        KaspaAddressVersion::PubKey,
        key.verifying_key().to_bytes().to_vec(),
    )
    .unwrap()
    .encode();
    let digest = personal_message_hash(message.as_bytes());
    let sig: k256::schnorr::Signature = key.sign_prehash(&digest).unwrap();
    (address, hex::encode(sig.to_bytes()))
}

/// Solanaウォレット（Ed25519）のアドレスと署名（base58）。
pub fn solana_sign(message: &str) -> (String, String) {
    use ed25519_dalek::Signer;

    let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    let sig = key.sign(message.as_bytes());
    (
        key.verifying_key().as_bytes().to_base58(),
        sig.to_bytes().to_base58(),
    )
}

/// EVMウォレット（`personal_sign`）のアドレスと署名（0x + r||s||v）。
pub fn evm_sign(message: &str) -> (String, String) {
    let key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
    let point = key.verifying_key().to_encoded_point(false);
    let address = alloy_primitives::Address::from_slice(
        &alloy_primitives::keccak256(&point.as_bytes()[1..])[12..],
    );

    let hash = alloy_primitives::eip191_hash_message(message.as_bytes());
    let (sig, recovery_id) = key.sign_prehash_recoverable(hash.as_slice()).unwrap();
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(27 + recovery_id.to_byte());
    (address.to_checksum(None), format!("0x{}", hex::encode(bytes)))
}
