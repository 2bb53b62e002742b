//! # 出品登録
//!
//! 署名検証済みの主張と出品メタデータから `ListingRecord` を組み立て、
//! `TableStore` に1行だけ追記する。
//!
//! 未検証の主張は型で排除する: [`VerifiedClaim`] は [`SignatureClaim::verify`]
//! が成功した場合にのみ構築できる。

use std::sync::Arc;

use dronox_crypto::{idempotency_key, VerificationFailure, VerifierRegistry};
use dronox_types::{ListingRecord, Network};

use crate::storage::{StorageError, TableStore};

// ---------------------------------------------------------------------------
// 署名の主張
// ---------------------------------------------------------------------------

/// クライアントが提示した「このウォレットがこのメッセージに署名した」という主張。
#[derive(Debug, Clone)]
pub struct SignatureClaim {
    /// 検証に使うネットワーク
    pub network: Network,
    /// 署名者のウォレットアドレス
    pub address: String,
    /// 署名対象メッセージ
    pub message: String,
    /// 署名文字列
    pub signature: String,
}

impl SignatureClaim {
    /// レジストリで署名を検証し、成功した場合のみ [`VerifiedClaim`] を返す。
    pub fn verify(self, registry: &VerifierRegistry) -> Result<VerifiedClaim, VerificationFailure> {
        let result = registry.verify_network(
            self.network,
            &self.address,
            self.message.as_bytes(),
            &self.signature,
        );
        if result.valid {
            return Ok(VerifiedClaim(self));
        }
        Err(result.reason.unwrap_or_else(|| {
            VerificationFailure::SignatureInvalid("検証結果が不整合です".to_string())
        }))
    }
}

/// 署名検証に成功した主張。
#[derive(Debug, Clone)]
pub struct VerifiedClaim(SignatureClaim);

impl VerifiedClaim {
    /// 検証済みウォレットアドレス。
    pub fn wallet(&self) -> &str {
        &self.0.address
    }

    fn idempotency_key(&self) -> String {
        idempotency_key(
            self.0.network,
            &self.0.address,
            &self.0.message,
            &self.0.signature,
        )
    }
}

// ---------------------------------------------------------------------------
// 出品メタデータ
// ---------------------------------------------------------------------------

/// クライアントが送信した出品情報（全項目任意）。
#[derive(Debug, Clone, Default)]
pub struct ListingMetadata {
    /// 出品名
    pub name: Option<String>,
    /// 価格（JSON数値または数値文字列）
    pub price: Option<serde_json::Value>,
    /// 画像URL
    pub image_url: Option<String>,
}

/// 出品情報の上限（文字数）。
#[derive(Debug, Clone, Copy)]
pub struct ListingLimits {
    /// 出品名の最大文字数
    pub max_name_len: usize,
    /// 画像URLの最大文字数
    pub max_image_url_len: usize,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            max_name_len: 200,
            max_image_url_len: 2048,
        }
    }
}

/// 出品登録のエラー。
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// メタデータの検証に失敗（ストレージには到達していない）
    #[error("出品情報が不正: {0}")]
    InvalidListing(String),
    /// ストレージへの書き込みに失敗
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn parse_price(value: &serde_json::Value) -> Result<f64, SubmitError> {
    let price = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| SubmitError::InvalidListing("price must be a number".to_string()))?;

    if !price.is_finite() || price < 0.0 {
        return Err(SubmitError::InvalidListing(
            "price must be a finite, non-negative number".to_string(),
        ));
    }
    Ok(price)
}

fn bounded_text(field: &str, value: &str, max_len: usize) -> Result<String, SubmitError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SubmitError::InvalidListing(format!("{field} must not be empty")));
    }
    if value.chars().count() > max_len {
        return Err(SubmitError::InvalidListing(format!(
            "{field} exceeds {max_len} characters"
        )));
    }
    Ok(value.to_string())
}

fn parse_image_url(value: &str, max_len: usize) -> Result<String, SubmitError> {
    let url = bounded_text("image_url", value, max_len)?;
    let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("http") | Some("https") => Ok(url),
        _ => Err(SubmitError::InvalidListing(
            "image_url must be an http(s) URL".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// 出品登録
// ---------------------------------------------------------------------------

/// 検証済みの出品を `TableStore` に登録する。
pub struct ListingSubmitter {
    store: Arc<dyn TableStore>,
    table: String,
    limits: ListingLimits,
    /// 行に重複排除キーを含めるか
    with_idempotency_key: bool,
}

impl ListingSubmitter {
    /// `table` に追記するSubmitterを構築する。重複排除キーは書き込まない。
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>, limits: ListingLimits) -> Self {
        Self {
            store,
            table: table.into(),
            limits,
            with_idempotency_key: false,
        }
    }

    /// 各行に `idempotency_key` を含める（テーブルに一意制約カラムがある場合）。
    pub fn with_idempotency_key(mut self) -> Self {
        self.with_idempotency_key = true;
        self
    }

    /// メタデータを検証し、1行だけ追記する。
    ///
    /// メタデータが不正な場合はストレージを呼ばない。ストレージエラーは再試行しない。
    pub async fn submit(
        &self,
        claim: VerifiedClaim,
        metadata: ListingMetadata,
    ) -> Result<ListingRecord, SubmitError> {
        let price = metadata.price.as_ref().map(parse_price).transpose()?;
        let name = metadata
            .name
            .as_deref()
            .map(|n| bounded_text("nft_name", n, self.limits.max_name_len))
            .transpose()?;
        let image_url = metadata
            .image_url
            .as_deref()
            .map(|u| parse_image_url(u, self.limits.max_image_url_len))
            .transpose()?;

        let idempotency_key = self
            .with_idempotency_key
            .then(|| claim.idempotency_key());
        let SignatureClaim {
            network,
            address,
            signature,
            ..
        } = claim.0;
        let record = ListingRecord {
            name,
            price,
            image_url,
            signature,
            network,
            verified: true,
            wallet: address,
            idempotency_key,
        };

        let row =
            serde_json::to_value(&record).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.insert(&self.table, row).await?;

        tracing::info!(
            network = %record.network,
            wallet = %record.wallet,
            table = %self.table,
            "出品を登録"
        );
        Ok(record)
    }
}
