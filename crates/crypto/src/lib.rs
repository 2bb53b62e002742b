//! # Dronox 署名検証
//!
//! ウォレットが `message` に付けた署名が、`address` の秘密鍵保持者によるものかを
//! ネットワークごとの方式で検証する。
//!
//! ## 検証方式
//! | ネットワーク | 方式 | メッセージハッシュ |
//! |------|------------|------------|
//! | Kaspa | BIP-340 Schnorr / ECDSA (secp256k1) | BLAKE2b-256 (key = `PersonalMessageSigningHash`) |
//! | EVM | ECDSA公開鍵リカバリ (secp256k1) | EIP-191 personal_sign (Keccak-256) |
//! | Solana | Ed25519 | メッセージそのもの |
//!
//! 検証は純粋関数であり、I/Oもログ出力も行わない。偽造・不正形式の入力は
//! 通常の運用状態として [`VerificationResult`] の値で返し、パニックしない。

use std::collections::HashMap;

use dronox_types::Network;
use sha2::{Digest, Sha256};

pub mod encoding;
pub mod evm;
pub mod kaspa;
pub mod solana;

pub use evm::EvmVerifier;
pub use kaspa::{KaspaAddress, KaspaAddressVersion, KaspaVerifier};
pub use solana::SolanaVerifier;

// ---------------------------------------------------------------------------
// 検証結果
// ---------------------------------------------------------------------------

/// 検証失敗の分類。どの段階で失敗したかを表す。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    /// 登録されていないネットワーク
    #[error("未対応のネットワーク: {0}")]
    UnsupportedNetwork(String),
    /// アドレスのデコード・チェックサム検証に失敗（暗号処理には到達しない）
    #[error("アドレスの形式が不正: {0}")]
    MalformedAddress(String),
    /// 署名のデコード・長さ検証に失敗（暗号処理には到達しない）
    #[error("署名の形式が不正: {0}")]
    MalformedSignature(String),
    /// 署名検証・公開鍵リカバリ・アドレス照合のいずれかが不一致
    #[error("署名が一致しません: {0}")]
    SignatureInvalid(String),
}

impl VerificationFailure {
    /// クライアントに返却する分類コード。
    pub fn code(&self) -> &'static str {
        match self {
            VerificationFailure::UnsupportedNetwork(_) => "unsupported_network",
            VerificationFailure::MalformedAddress(_) => "malformed_address",
            VerificationFailure::MalformedSignature(_) => "malformed_signature",
            VerificationFailure::SignatureInvalid(_) => "signature_invalid",
        }
    }
}

/// 1回の検証の結果。リクエストごとに生成され、永続化されない。
///
/// `valid == true` のとき `reason` は常に `None`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// 署名が有効か
    pub valid: bool,
    /// 無効な場合の理由
    pub reason: Option<VerificationFailure>,
}

impl VerificationResult {
    /// 検証成功。
    pub fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    /// 検証失敗。
    pub fn rejected(reason: VerificationFailure) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

impl From<Result<(), VerificationFailure>> for VerificationResult {
    fn from(result: Result<(), VerificationFailure>) -> Self {
        match result {
            Ok(()) => Self::accepted(),
            Err(reason) => Self::rejected(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// チェーン別検証トレイト
// ---------------------------------------------------------------------------

/// チェーンファミリーごとの署名検証方式。
///
/// 実装は次の順序を守る。前段で失敗した入力は後段に渡さない。
/// 1. アドレスのデコード → [`VerificationFailure::MalformedAddress`]
/// 2. 署名文字列のデコードと長さ検証 → [`VerificationFailure::MalformedSignature`]
/// 3. メッセージハッシュの計算と曲線演算 → [`VerificationFailure::SignatureInvalid`]
pub trait ChainVerifier: Send + Sync {
    /// この実装が担当するネットワーク。
    fn network(&self) -> Network;

    /// `address` の鍵で `message` に `signature` が付けられたかを検証する。
    ///
    /// `message` はウォレットが署名した生のバイト列。ネットワーク固有の
    /// プレフィックス・ハッシュ規約は実装側で適用する。
    fn verify(
        &self,
        address: &str,
        message: &[u8],
        signature: &str,
    ) -> Result<(), VerificationFailure>;
}

// ---------------------------------------------------------------------------
// ディスパッチャ
// ---------------------------------------------------------------------------

/// ネットワーク名から [`ChainVerifier`] を選んで検証するレジストリ。
///
/// チェーンの追加は実装の追加と [`VerifierRegistry::register`] の呼び出しのみで行い、
/// ディスパッチ処理自体は変更しない。
#[derive(Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<Network, Box<dyn ChainVerifier>>,
}

impl VerifierRegistry {
    /// 空のレジストリを構築する。
    pub fn new() -> Self {
        Self::default()
    }

    /// Kaspa / EVM / Solana を登録済みのレジストリを構築する。
    pub fn with_default_chains() -> Self {
        let mut registry = Self::new();
        registry
            .register(Box::new(KaspaVerifier))
            .register(Box::new(EvmVerifier))
            .register(Box::new(SolanaVerifier));
        registry
    }

    /// 検証方式を登録する。同じネットワークの既存登録は置き換える。
    pub fn register(&mut self, verifier: Box<dyn ChainVerifier>) -> &mut Self {
        self.verifiers.insert(verifier.network(), verifier);
        self
    }

    /// 登録済みネットワークの一覧（正規順）。
    pub fn networks(&self) -> Vec<Network> {
        Network::ALL
            .into_iter()
            .filter(|n| self.verifiers.contains_key(n))
            .collect()
    }

    /// ネットワーク名を解釈して検証する。
    ///
    /// 未知の名前・未登録のネットワークは `UnsupportedNetwork` で失敗する。
    pub fn verify(
        &self,
        network: &str,
        address: &str,
        message: &[u8],
        signature: &str,
    ) -> VerificationResult {
        match network.parse::<Network>() {
            Ok(network) => self.verify_network(network, address, message, signature),
            Err(_) => VerificationResult::rejected(VerificationFailure::UnsupportedNetwork(
                network.to_string(),
            )),
        }
    }

    /// 解釈済みのネットワークで検証する。
    pub fn verify_network(
        &self,
        network: Network,
        address: &str,
        message: &[u8],
        signature: &str,
    ) -> VerificationResult {
        match self.verifiers.get(&network) {
            Some(verifier) => verifier.verify(address, message, signature).into(),
            None => VerificationResult::rejected(VerificationFailure::UnsupportedNetwork(
                network.to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// 重複排除キー
// ---------------------------------------------------------------------------

/// SHA-256ハッシュ計算。
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// (network, address, message, signature) から決定的な重複排除キーを導出する。
///
/// 各フィールドは長さ（u64 BE）を前置して連結するため、境界をずらした入力が
/// 同じキーになることはない。
pub fn idempotency_key(network: Network, address: &str, message: &str, signature: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [network.as_str(), address, message, signature] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}
