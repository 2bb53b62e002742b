//! # 署名文字列のデコード
//!
//! ウォレットは署名をhex・base64・base58のいずれかで返す。チェーンごとに
//! 受理するエンコーディングと正確なバイト長を指定してデコードする。

use base58::FromBase58;
use base64::Engine;

use crate::VerificationFailure;

/// 署名文字列のエンコーディング。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    /// 16進数（`0x` プレフィックスは任意）
    Hex,
    /// Base64（Standard、パディング付き）
    Base64,
    /// Base58（Bitcoinアルファベット）
    Base58,
}

impl SignatureEncoding {
    fn decode(self, input: &str) -> Option<Vec<u8>> {
        match self {
            SignatureEncoding::Hex => {
                let digits = input
                    .strip_prefix("0x")
                    .or_else(|| input.strip_prefix("0X"))
                    .unwrap_or(input);
                hex::decode(digits).ok()
            }
            SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(input)
                .ok(),
            SignatureEncoding::Base58 => input.from_base58().ok(),
        }
    }
}

/// `encodings` を順に試し、ちょうど `expected_len` バイトになった最初の結果を返す。
///
/// どのエンコーディングでも長さが一致しない場合は `MalformedSignature`。
pub fn decode_fixed(
    input: &str,
    expected_len: usize,
    encodings: &[SignatureEncoding],
) -> Result<Vec<u8>, VerificationFailure> {
    if input.is_empty() {
        return Err(VerificationFailure::MalformedSignature(
            "署名が空です".to_string(),
        ));
    }

    encodings
        .iter()
        .filter_map(|encoding| encoding.decode(input))
        .find(|bytes| bytes.len() == expected_len)
        .ok_or_else(|| {
            VerificationFailure::MalformedSignature(format!(
                "{expected_len}バイトの署名としてデコードできません (受理形式: {encodings:?})"
            ))
        })
}
