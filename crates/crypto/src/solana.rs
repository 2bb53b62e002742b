//! # Solana
//!
//! Base58アドレスをEd25519公開鍵としてデコードし、メッセージの生バイト列に対する
//! 署名を検証する（ウォレットの `signMessage` はプレフィックスを付けない）。

use base58::FromBase58;
use dronox_types::Network;
use ed25519_dalek::{Signature, VerifyingKey};

use crate::encoding::{decode_fixed, SignatureEncoding};
use crate::{ChainVerifier, VerificationFailure};

/// Ed25519署名長。
pub const SIGNATURE_LEN: usize = 64;

/// Base58アドレスをEd25519公開鍵に変換する。
pub fn parse_address(address: &str) -> Result<VerifyingKey, VerificationFailure> {
    let bytes = address.from_base58().map_err(|e| {
        VerificationFailure::MalformedAddress(format!("Base58デコードに失敗: {e:?}"))
    })?;
    let key_bytes: [u8; 32] = bytes.try_into().map_err(|_| {
        VerificationFailure::MalformedAddress("公開鍵は32バイトである必要があります".to_string())
    })?;
    VerifyingKey::from_bytes(&key_bytes).map_err(|_| {
        VerificationFailure::MalformedAddress("公開鍵が曲線上の点ではありません".to_string())
    })
}

/// Solanaの署名検証方式。
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaVerifier;

impl ChainVerifier for SolanaVerifier {
    fn network(&self) -> Network {
        Network::Solana
    }

    fn verify(
        &self,
        address: &str,
        message: &[u8],
        signature: &str,
    ) -> Result<(), VerificationFailure> {
        let key = parse_address(address)?;

        let sig_bytes = decode_fixed(
            signature,
            SIGNATURE_LEN,
            &[
                SignatureEncoding::Base58,
                SignatureEncoding::Hex,
                SignatureEncoding::Base64,
            ],
        )?;
        let sig_arr: [u8; SIGNATURE_LEN] = sig_bytes.try_into().map_err(|_| {
            VerificationFailure::MalformedSignature("署名は64バイトである必要があります".to_string())
        })?;
        let signature = Signature::from_bytes(&sig_arr);

        key.verify_strict(message, &signature).map_err(|_| {
            VerificationFailure::SignatureInvalid("Ed25519署名の検証に失敗".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base58::ToBase58;
    use base64::Engine;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn address_of(key: &SigningKey) -> String {
        key.verifying_key().to_bytes().to_base58()
    }

    #[test]
    fn test_valid_signature_in_each_encoding() {
        let key = SigningKey::generate(&mut OsRng);
        let sig = key.sign(b"list-nft:123").to_bytes();

        for encoded in [
            sig.to_base58(),
            hex::encode(sig),
            base64::engine::general_purpose::STANDARD.encode(sig),
        ] {
            assert!(SolanaVerifier
                .verify(&address_of(&key), b"list-nft:123", &encoded)
                .is_ok());
        }
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let sig = key.sign(b"list-nft:123").to_bytes();

        for bit in 0..SIGNATURE_LEN * 8 {
            let mut flipped = sig;
            flipped[bit / 8] ^= 1 << (bit % 8);
            let result = SolanaVerifier.verify(&address_of(&key), b"list-nft:123", &flipped.to_base58());
            assert!(result.is_err(), "ビット{bit}の反転が受理された");
        }
    }

    #[test]
    fn test_other_key_rejected() {
        let signer = SigningKey::generate(&mut OsRng);
        let claimed = SigningKey::generate(&mut OsRng);
        let sig = signer.sign(b"list-nft:123").to_bytes().to_base58();

        let err = SolanaVerifier
            .verify(&address_of(&claimed), b"list-nft:123", &sig)
            .unwrap_err();
        assert_eq!(err.code(), "signature_invalid");
    }

    #[test]
    fn test_malformed_inputs_classified() {
        let key = SigningKey::generate(&mut OsRng);
        let sig = key.sign(b"m").to_bytes().to_base58();

        // Base58アルファベット外の文字
        let err = SolanaVerifier.verify("0OIl", b"m", &sig).unwrap_err();
        assert_eq!(err.code(), "malformed_address");

        // 32バイトでない
        let err = SolanaVerifier
            .verify(&[1u8; 20].to_base58(), b"m", &sig)
            .unwrap_err();
        assert_eq!(err.code(), "malformed_address");

        let err = SolanaVerifier
            .verify(&address_of(&key), b"m", &[1u8; 63].to_base58())
            .unwrap_err();
        assert_eq!(err.code(), "malformed_signature");
    }
}
