//! # Dronox 共有型定義
//!
//! 署名検証サービス（Gateway）と検証ライブラリ（crypto）が共有する
//! ネットワーク識別子・HTTPワイヤ型・永続化レコードを提供する。
//!
//! ## エンコーディング規則
//! - Kaspaアドレス: `kaspa:` プレフィックス + cashaddr形式（チェックサム付き）
//! - EVMアドレス: `0x` + 40桁hex（大文字小文字混在時はEIP-55）
//! - Solanaアドレス: Base58エンコードされたEd25519公開鍵
//! - 署名: ウォレットが返す文字列表現のまま受け取り、チェーンごとにデコードする

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// ネットワーク識別子
// ---------------------------------------------------------------------------

/// 署名検証をサポートするチェーンの閉じた集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Kaspa（secp256k1 Schnorr / ECDSA、公開鍵はアドレスに埋め込まれる）
    Kaspa,
    /// EVM互換チェーン（ECDSA公開鍵リカバリ）
    Evm,
    /// Solana（Ed25519、アドレス = 公開鍵）
    Solana,
}

impl Network {
    /// 全ネットワーク。
    pub const ALL: [Network; 3] = [Network::Kaspa, Network::Evm, Network::Solana];

    /// ワイヤ上の正規名。
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Kaspa => "Kaspa",
            Network::Evm => "EVM",
            Network::Solana => "Solana",
        }
    }

    /// アドレスの形状からネットワークを推定する。
    ///
    /// `network` フィールドを送らないクライアント（MetaMaskのログインフロー等）向け。
    /// 推定できない場合は `None`。
    pub fn guess_from_address(address: &str) -> Option<Network> {
        let address = address.trim();
        if address.starts_with("0x") || address.starts_with("0X") {
            return Some(Network::Evm);
        }
        match address.split_once(':') {
            Some((prefix, _)) if prefix.to_ascii_lowercase().starts_with("kaspa") => {
                Some(Network::Kaspa)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知のネットワーク名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNetwork(pub String);

impl fmt::Display for UnknownNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown network: {}", self.0)
    }
}

impl std::error::Error for UnknownNetwork {}

impl FromStr for Network {
    type Err = UnknownNetwork;

    /// 大文字小文字を区別せずに解釈する。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kaspa" | "kas" => Ok(Network::Kaspa),
            "evm" | "ethereum" | "eth" => Ok(Network::Evm),
            "solana" | "sol" => Ok(Network::Solana),
            _ => Err(UnknownNetwork(s.to_string())),
        }
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// POST /verify
// ---------------------------------------------------------------------------

/// POST /verify リクエスト。
///
/// 必須3項目（address, signature, message）の欠落はハンドラ側で
/// `Missing fields` として扱うため、全フィールドを `Option` で受け取る。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyListingRequest {
    /// 署名者のウォレットアドレス
    pub address: Option<String>,
    /// ウォレットが返した署名文字列（hex / base64 / base58）
    pub signature: Option<String>,
    /// ウォレットが署名したメッセージ（UTF-8）
    pub message: Option<String>,
    /// 出品名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nft_name: Option<String>,
    /// 価格（JSON数値または数値文字列）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<serde_json::Value>,
    /// 画像URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// ネットワーク名（省略時はアドレスから推定、推定不可なら "Kaspa"）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// POST /verify 成功レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyListingResponse {
    /// 常に "verified"
    pub status: String,
    /// 検証済みウォレットアドレス
    pub wallet: String,
}

/// エラーレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// クライアント向けの分類済みエラーメッセージ
    pub error: String,
    /// 検証失敗の分類コード（`malformed_address` 等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// GET / レスポンス（死活監視）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// サービス名
    pub service: String,
    /// 常に "online"
    pub status: String,
}

// ---------------------------------------------------------------------------
// 永続化レコード
// ---------------------------------------------------------------------------

/// `listings` テーブルに追記される1行。
///
/// 署名検証に成功したリクエストからのみ生成される。更新・削除は行わない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// 出品名
    pub name: Option<String>,
    /// 価格
    pub price: Option<f64>,
    /// 画像URL
    pub image_url: Option<String>,
    /// クライアントが送信した署名文字列
    pub signature: String,
    /// 署名を検証したネットワーク
    pub network: Network,
    /// 署名検証済みフラグ（常にtrue）
    pub verified: bool,
    /// 署名者のウォレットアドレス
    pub wallet: String,
    /// (network, address, message, signature) から導出した重複排除キー（hex SHA-256）。
    ///
    /// 一意制約カラムを設定した場合のみ書き込む。未設定時は列自体を送らないため、
    /// `idempotency_key` 列を持たない既存の `listings` テーブルにもそのまま追記できる。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse_aliases() {
        assert_eq!("Kaspa".parse::<Network>().unwrap(), Network::Kaspa);
        assert_eq!("kaspa".parse::<Network>().unwrap(), Network::Kaspa);
        assert_eq!("EVM".parse::<Network>().unwrap(), Network::Evm);
        assert_eq!("ethereum".parse::<Network>().unwrap(), Network::Evm);
        assert_eq!(" Solana ".parse::<Network>().unwrap(), Network::Solana);
        assert!("bitcoin".parse::<Network>().is_err());
    }

    #[test]
    fn test_network_serde_uses_canonical_name() {
        let json = serde_json::to_string(&Network::Evm).unwrap();
        assert_eq!(json, "\"EVM\"");
        let parsed: Network = serde_json::from_str("\"eth\"").unwrap();
        assert_eq!(parsed, Network::Evm);
    }

    #[test]
    fn test_guess_from_address() {
        assert_eq!(
            Network::guess_from_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"),
            Some(Network::Evm)
        );
        assert_eq!(
            Network::guess_from_address("kaspatest:qqabc"),
            Some(Network::Kaspa)
        );
        assert_eq!(
            Network::guess_from_address("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"),
            None
        );
    }

    /// 欠落フィールドはNoneとして受理される
    #[test]
    fn test_verify_request_missing_fields_deserialize() {
        let req: VerifyListingRequest =
            serde_json::from_str(r#"{"address":"kaspa:q","message":"m"}"#).unwrap();
        assert!(req.signature.is_none());
        assert!(req.network.is_none());
    }
}
