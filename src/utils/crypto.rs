use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{Error, Result};

/// Generates a key pair and returns `(private_pkcs8_pem, public_spki_pem)`.
pub fn generate_key_pair(bits: usize) -> Result<(String, String)> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| Error::Crypto(format!("key generation failed: {}", e)))?;
    let public_key = private_key.to_public_key();

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::Crypto(e.to_string()))?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::Crypto(e.to_string()))?;

    Ok((private_pem, public_pem))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| Error::Crypto(e.to_string()))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|e| Error::Crypto(e.to_string()))
}

/// Public half of a stored private key, as base64 of its SPKI PEM.
pub fn encoded_public_key(private_pem: &str) -> Result<String> {
    let public_pem = private_key_from_pem(private_pem)?
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    Ok(STANDARD.encode(public_pem))
}

pub fn decode_public_key(encoded: &str) -> Result<RsaPublicKey> {
    let pem = STANDARD
        .decode(encoded)
        .map_err(|e| Error::Crypto(format!("invalid base64 public key: {}", e)))?;
    let pem = String::from_utf8(pem).map_err(|e| Error::Crypto(e.to_string()))?;
    public_key_from_pem(&pem)
}

fn request_signature_content(webhook_id: &str, timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(webhook_id.len() + timestamp.len() + payload.len());
    content.extend_from_slice(webhook_id.as_bytes());
    content.extend_from_slice(timestamp.as_bytes());
    content.extend_from_slice(payload);
    content
}

/// base64(RSASSA-PKCS1-v1_5 / SHA-256 over `webhook_id || timestamp || payload`).
pub fn sign_request(
    key: &RsaPrivateKey,
    webhook_id: &str,
    timestamp: &str,
    payload: &[u8],
) -> String {
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key.sign(&request_signature_content(webhook_id, timestamp, payload));
    STANDARD.encode(signature.to_bytes())
}

pub fn verify_request(
    key: &RsaPublicKey,
    webhook_id: &str,
    timestamp: &str,
    payload: &[u8],
    signature: &str,
) -> bool {
    let Ok(raw) = STANDARD.decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(raw.as_slice()) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(key.clone())
        .verify(&request_signature_content(webhook_id, timestamp, payload), &signature)
        .is_ok()
}
