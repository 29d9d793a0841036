//! Webhook signature verification (HMAC-SHA256)
//!
//! The gateway sends `x-signature: ts=<ts>,v1=<hex>` and signs the manifest
//! `id:{data_id};request-id:{x_request_id};ts:{ts};`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Missing or malformed x-signature header")]
    Malformed,
    #[error("Invalid signature hex")]
    InvalidHex,
    #[error("HMAC key error")]
    Key,
    #[error("Webhook signature mismatch")]
    Mismatch,
}

/// Canonical string the gateway signs
pub fn manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    format!("id:{data_id};request-id:{request_id};ts:{ts};")
}

/// Split `ts=...,v1=...` into its parts
fn parse_header(header: &str) -> Result<(&str, &str), SignatureError> {
    let mut ts = "";
    let mut v1 = "";
    for part in header.split(',') {
        let (key, value) = match part.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => continue,
        };
        match key {
            "ts" => ts = value,
            "v1" => v1 = value,
            _ => {}
        }
    }
    if ts.is_empty() || v1.is_empty() {
        return Err(SignatureError::Malformed);
    }
    Ok((ts, v1))
}

/// Verify a webhook delivery. Comparison is constant time (`verify_slice`).
pub fn verify(
    header: &str,
    data_id: &str,
    request_id: &str,
    secret: &str,
) -> Result<(), SignatureError> {
    let (ts, v1) = parse_header(header)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Key)?;
    mac.update(manifest(data_id, request_id, ts).as_bytes());

    let expected = hex::decode(v1).map_err(|_| SignatureError::InvalidHex)?;
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produce a header value for a manifest (used by tests and local tooling)
pub fn sign(data_id: &str, request_id: &str, ts: &str, secret: &str) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(manifest(data_id, request_id, ts).as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("ts={ts},v1={digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec-test";

    #[test]
    fn test_manifest_template() {
        assert_eq!(
            manifest("123", "req-1", "1700000000"),
            "id:123;request-id:req-1;ts:1700000000;"
        );
    }

    #[test]
    fn test_sign_then_verify() {
        let header = sign("123", "req-1", "1700000000", SECRET);
        assert!(verify(&header, "123", "req-1", SECRET).is_ok());
    }

    #[test]
    fn test_tampered_data_id_rejected() {
        let header = sign("123", "req-1", "1700000000", SECRET);
        assert_eq!(
            verify(&header, "124", "req-1", SECRET),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign("123", "req-1", "1700000000", SECRET);
        assert_eq!(
            verify(&header, "123", "req-1", "other"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_header_with_spaces() {
        let header = sign("9", "r", "42", SECRET).replace(',', ", ");
        assert!(verify(&header, "9", "r", SECRET).is_ok());
    }

    #[test]
    fn test_malformed_header() {
        assert_eq!(verify("", "1", "r", SECRET), Err(SignatureError::Malformed));
        assert_eq!(verify("ts=1", "1", "r", SECRET), Err(SignatureError::Malformed));
        assert_eq!(
            verify("ts=1,v1=zz", "1", "r", SECRET),
            Err(SignatureError::InvalidHex)
        );
    }
}
