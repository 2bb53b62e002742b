//! # Kaspa
//!
//! cashaddr形式のアドレスから公開鍵を取り出し、パーソナルメッセージハッシュに対する
//! secp256k1署名（BIP-340 Schnorr、またはECDSA）を検証する。

use std::fmt;

use blake2::digest::consts::U32;
use blake2::digest::{KeyInit, Mac};
use blake2::Blake2bMac;
use dronox_types::Network;
use k256::ecdsa::signature::hazmat::PrehashVerifier;

use crate::encoding::{decode_fixed, SignatureEncoding};
use crate::{ChainVerifier, VerificationFailure};

/// cashaddr文字セット（5ビット値 → 文字）。
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// チェックサム長（5ビットグループ数、40ビット）。
const CHECKSUM_LEN: usize = 8;

/// 受理するアドレスプレフィックス（mainnet, testnet, simnet, devnet）。
const PREFIXES: [&str; 4] = ["kaspa", "kaspatest", "kaspasim", "kaspadev"];

/// パーソナルメッセージ署名用BLAKE2bの鍵。
const PERSONAL_MESSAGE_KEY: &[u8] = b"PersonalMessageSigningHash";

/// 署名長（Schnorr / compact ECDSA 共通）。
pub const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// アドレス
// ---------------------------------------------------------------------------

/// アドレスのバージョンバイト。ペイロードの種類と長さを決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KaspaAddressVersion {
    /// 32バイトのx-only Schnorr公開鍵
    PubKey,
    /// 33バイトの圧縮ECDSA公開鍵
    PubKeyEcdsa,
    /// 32バイトのスクリプトハッシュ（メッセージ署名不可）
    ScriptHash,
}

impl KaspaAddressVersion {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::PubKey),
            1 => Some(Self::PubKeyEcdsa),
            8 => Some(Self::ScriptHash),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::PubKey => 0,
            Self::PubKeyEcdsa => 1,
            Self::ScriptHash => 8,
        }
    }

    fn payload_len(self) -> usize {
        match self {
            Self::PubKey | Self::ScriptHash => 32,
            Self::PubKeyEcdsa => 33,
        }
    }
}

/// デコード済みのKaspaアドレス。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KaspaAddress {
    /// ネットワークプレフィックス（`kaspa` 等）
    pub prefix: String,
    /// バージョン
    pub version: KaspaAddressVersion,
    /// 公開鍵またはスクリプトハッシュ
    pub payload: Vec<u8>,
}

impl KaspaAddress {
    /// アドレスを構築する。ペイロード長はバージョンと一致している必要がある。
    pub fn new(
        prefix: &str,
        version: KaspaAddressVersion,
        payload: Vec<u8>,
    ) -> Result<Self, VerificationFailure> {
        if !PREFIXES.contains(&prefix) {
            return Err(VerificationFailure::MalformedAddress(format!(
                "未知のプレフィックス: {prefix}"
            )));
        }
        if payload.len() != version.payload_len() {
            return Err(VerificationFailure::MalformedAddress(format!(
                "{version:?}のペイロードは{}バイトである必要があります (実際: {})",
                version.payload_len(),
                payload.len()
            )));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            version,
            payload,
        })
    }

    /// `prefix:payload` 形式の文字列をデコードし、チェックサムを検証する。
    pub fn decode(address: &str) -> Result<Self, VerificationFailure> {
        let malformed = |msg: &str| VerificationFailure::MalformedAddress(msg.to_string());

        let (prefix, encoded) = address
            .split_once(':')
            .ok_or_else(|| malformed("プレフィックスがありません"))?;
        if !PREFIXES.contains(&prefix) {
            return Err(VerificationFailure::MalformedAddress(format!(
                "未知のプレフィックス: {prefix}"
            )));
        }
        if encoded.len() <= CHECKSUM_LEN {
            return Err(malformed("ペイロードが短すぎます"));
        }

        let values = encoded
            .bytes()
            .map(|c| CHARSET.iter().position(|&x| x == c).map(|v| v as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| malformed("cashaddr文字セット外の文字を含みます"))?;

        let (data, checksum_groups) = values.split_at(values.len() - CHECKSUM_LEN);
        let expected = checksum_groups
            .iter()
            .fold(0u64, |acc, &v| (acc << 5) | v as u64);
        if checksum(prefix, data) != expected {
            return Err(malformed("チェックサムが一致しません"));
        }

        let bytes = convert_bits(data, 5, 8, false)
            .ok_or_else(|| malformed("ペイロードのビット変換に失敗しました"))?;
        let (&version_byte, payload) = bytes
            .split_first()
            .ok_or_else(|| malformed("バージョンバイトがありません"))?;
        let version = KaspaAddressVersion::from_byte(version_byte).ok_or_else(|| {
            VerificationFailure::MalformedAddress(format!("未知のバージョン: {version_byte}"))
        })?;

        Self::new(prefix, version, payload.to_vec())
    }

    /// cashaddr形式にエンコードする。
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(1 + self.payload.len());
        raw.push(self.version.to_byte());
        raw.extend_from_slice(&self.payload);

        // 8→5ビット変換はパディングありなので失敗しない
        let mut data = convert_bits(&raw, 8, 5, true).unwrap_or_default();
        let checksum = checksum(&self.prefix, &data);
        data.extend(
            (0..CHECKSUM_LEN).map(|i| ((checksum >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f) as u8),
        );

        let encoded: String = data.iter().map(|&v| CHARSET[v as usize] as char).collect();
        format!("{}:{}", self.prefix, encoded)
    }
}

impl fmt::Display for KaspaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// cashaddrのBCH多項式剰余。
fn polymod(values: impl Iterator<Item = u8>) -> u64 {
    let mut c = 1u64;
    for d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

/// プレフィックスの下位5ビット、区切りの0、データ、8個の0に対するチェックサム。
fn checksum(prefix: &str, data: &[u8]) -> u64 {
    polymod(
        prefix
            .bytes()
            .map(|c| c & 0x1f)
            .chain(std::iter::once(0))
            .chain(data.iter().copied())
            .chain([0u8; CHECKSUM_LEN]),
    )
}

/// `from` ビット単位の列を `to` ビット単位に詰め替える。
///
/// `pad = false` のときは余りビットが `from` 未満かつ全て0であることを要求する。
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let max_value = (1u32 << to) - 1;
    let mut acc = 0u32;
    let mut bits = 0u32;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        if (value as u32) >> from != 0 {
            return None;
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
        acc &= (1u32 << bits) - 1;
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return None;
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// メッセージハッシュ
// ---------------------------------------------------------------------------

/// Kaspaウォレットの `signMessage` が署名対象とするハッシュ。
///
/// `BLAKE2b-256(key = "PersonalMessageSigningHash", message)`
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut mac = <Blake2bMac<U32> as KeyInit>::new_from_slice(PERSONAL_MESSAGE_KEY)
        .expect("BLAKE2bの鍵は64バイト以下であるべき");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

// ---------------------------------------------------------------------------
// 検証
// ---------------------------------------------------------------------------

/// アドレスから取り出した検証鍵。
enum KaspaKey {
    Schnorr(k256::schnorr::VerifyingKey),
    Ecdsa(k256::ecdsa::VerifyingKey),
}

impl KaspaKey {
    fn from_address(address: &KaspaAddress) -> Result<Self, VerificationFailure> {
        match address.version {
            KaspaAddressVersion::PubKey => k256::schnorr::VerifyingKey::from_bytes(&address.payload)
                .map(KaspaKey::Schnorr)
                .map_err(|_| {
                    VerificationFailure::MalformedAddress(
                        "x-only公開鍵が曲線上の点ではありません".to_string(),
                    )
                }),
            KaspaAddressVersion::PubKeyEcdsa => {
                k256::ecdsa::VerifyingKey::from_sec1_bytes(&address.payload)
                    .map(KaspaKey::Ecdsa)
                    .map_err(|_| {
                        VerificationFailure::MalformedAddress(
                            "圧縮公開鍵が曲線上の点ではありません".to_string(),
                        )
                    })
            }
            KaspaAddressVersion::ScriptHash => Err(VerificationFailure::MalformedAddress(
                "スクリプトハッシュアドレスはメッセージに署名できません".to_string(),
            )),
        }
    }
}

/// Kaspaの署名検証方式。
#[derive(Debug, Clone, Copy, Default)]
pub struct KaspaVerifier;

impl ChainVerifier for KaspaVerifier {
    fn network(&self) -> Network {
        Network::Kaspa
    }

    fn verify(
        &self,
        address: &str,
        message: &[u8],
        signature: &str,
    ) -> Result<(), VerificationFailure> {
        // Step 1: アドレス → 公開鍵
        let address = KaspaAddress::decode(address)?;
        let key = KaspaKey::from_address(&address)?;

        // Step 2: 署名のデコード
        let sig_bytes = decode_fixed(
            signature,
            SIGNATURE_LEN,
            &[SignatureEncoding::Hex, SignatureEncoding::Base64],
        )?;

        // Step 3: パーソナルメッセージハッシュに対する検証
        let digest = personal_message_hash(message);
        match key {
            KaspaKey::Schnorr(key) => {
                let sig = k256::schnorr::Signature::try_from(sig_bytes.as_slice()).map_err(|_| {
                    VerificationFailure::MalformedSignature(
                        "Schnorr署名のスカラーが範囲外です".to_string(),
                    )
                })?;
                key.verify_prehash(&digest, &sig).map_err(|_| {
                    VerificationFailure::SignatureInvalid("Schnorr署名の検証に失敗".to_string())
                })
            }
            KaspaKey::Ecdsa(key) => {
                let sig = k256::ecdsa::Signature::from_slice(&sig_bytes).map_err(|_| {
                    VerificationFailure::MalformedSignature(
                        "ECDSA署名のスカラーが範囲外です".to_string(),
                    )
                })?;
                let sig = sig.normalize_s().unwrap_or(sig);
                key.verify_prehash(&digest, &sig).map_err(|_| {
                    VerificationFailure::SignatureInvalid("ECDSA署名の検証に失敗".to_string())
                })
            }
        }
    }
}
