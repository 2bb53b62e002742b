//! # EVM
//!
//! EIP-191 `personal_sign` 署名から公開鍵をリカバリし、導出したアドレスを
//! 主張されたアドレスと照合する。

use std::str::FromStr;

use alloy_primitives::{eip191_hash_message, keccak256, Address, B256};
use dronox_types::Network;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::encoding::{decode_fixed, SignatureEncoding};
use crate::{ChainVerifier, VerificationFailure};

/// `r || s || v` の署名長。
pub const SIGNATURE_LEN: usize = 65;

/// `0x` + 40桁hexのアドレスを解釈する。
///
/// 全小文字・全大文字はそのまま受理し、大文字小文字が混在する場合は
/// EIP-55チェックサムを要求する。
pub fn parse_address(address: &str) -> Result<Address, VerificationFailure> {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| {
            VerificationFailure::MalformedAddress("0xプレフィックスがありません".to_string())
        })?;
    if digits.len() != 40 || !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
        return Err(VerificationFailure::MalformedAddress(
            "アドレスは40桁の16進数である必要があります".to_string(),
        ));
    }

    let has_lower = digits.bytes().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(format!("0x{digits}"), None).map_err(|_| {
            VerificationFailure::MalformedAddress("EIP-55チェックサムが一致しません".to_string())
        })
    } else {
        Address::from_str(digits)
            .map_err(|e| VerificationFailure::MalformedAddress(format!("hexデコードに失敗: {e}")))
    }
}

/// 65バイト署名を (署名, リカバリID) に分解する。
///
/// `v` は 27/28 と 0/1 の両方を受理する。high-Sの署名はlow-Sに正規化し、
/// リカバリIDのパリティを反転させる。
fn split_signature(bytes: &[u8]) -> Result<(Signature, RecoveryId), VerificationFailure> {
    let (rs, tail) = bytes.split_at(SIGNATURE_LEN - 1);
    let parity = match tail.first() {
        Some(&v @ (27 | 28)) => v - 27,
        Some(&v @ (0 | 1)) => v,
        Some(v) => {
            return Err(VerificationFailure::MalformedSignature(format!(
                "不正なリカバリID: {v}"
            )))
        }
        None => {
            return Err(VerificationFailure::MalformedSignature(
                "リカバリIDがありません".to_string(),
            ))
        }
    };

    let signature = Signature::from_slice(rs).map_err(|_| {
        VerificationFailure::MalformedSignature("r または s が範囲外です".to_string())
    })?;
    let recovery_id = RecoveryId::from_byte(parity).ok_or_else(|| {
        VerificationFailure::MalformedSignature(format!("不正なリカバリID: {parity}"))
    })?;

    Ok(match signature.normalize_s() {
        Some(normalized) => (
            normalized,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (signature, recovery_id),
    })
}

/// メッセージハッシュと署名から署名者のアドレスを復元する。
pub fn recover_address(
    message_hash: &B256,
    signature: &Signature,
    recovery_id: RecoveryId,
) -> Result<Address, VerificationFailure> {
    let recovery_failed =
        || VerificationFailure::SignatureInvalid("公開鍵のリカバリに失敗".to_string());

    let key = VerifyingKey::recover_from_prehash(message_hash.as_slice(), signature, recovery_id)
        .map_err(|_| recovery_failed())?;
    let uncompressed = key.to_encoded_point(false);
    let pubkey_payload = uncompressed.as_bytes().get(1..).ok_or_else(recovery_failed)?;
    let hash = keccak256(pubkey_payload);
    let address_bytes = hash.as_slice().get(12..).ok_or_else(recovery_failed)?;
    Ok(Address::from_slice(address_bytes))
}

/// EVM互換チェーンの署名検証方式。
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmVerifier;

impl ChainVerifier for EvmVerifier {
    fn network(&self) -> Network {
        Network::Evm
    }

    fn verify(
        &self,
        address: &str,
        message: &[u8],
        signature: &str,
    ) -> Result<(), VerificationFailure> {
        // Step 1: アドレスの検証
        let claimed = parse_address(address)?;

        // Step 2: 署名のデコード
        let sig_bytes = decode_fixed(signature, SIGNATURE_LEN, &[SignatureEncoding::Hex])?;
        let (signature, recovery_id) = split_signature(&sig_bytes)?;

        // Step 3: EIP-191ハッシュからリカバリして照合
        let message_hash = eip191_hash_message(message);
        let recovered = recover_address(&message_hash, &signature, recovery_id)?;
        if recovered != claimed {
            return Err(VerificationFailure::SignatureInvalid(
                "復元したアドレスが一致しません".to_string(),
            ));
        }
        Ok(())
    }
}
