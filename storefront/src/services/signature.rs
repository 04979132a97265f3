// storefront/src/services/signature.rs

//! MercadoPago webhook signatures.
//!
//! The `x-signature` header looks like `ts=1704908010,v1=<hex>`, where `v1`
//! is HMAC-SHA256 over the manifest
//! `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`. Parts whose value is
//! absent are left out of the manifest.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
  #[error("missing x-signature header")]
  Missing,
  #[error("malformed x-signature header")]
  Malformed,
  #[error("signature mismatch")]
  Mismatch,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SignatureHeader {
  pub ts: String,
  pub v1: String,
}

pub fn parse_header(raw: &str) -> Result<SignatureHeader, SignatureError> {
  let mut ts = None;
  let mut v1 = None;
  for part in raw.split(',') {
    match part.trim().split_once('=') {
      Some(("ts", value)) => ts = Some(value.trim().to_string()),
      Some(("v1", value)) => v1 = Some(value.trim().to_string()),
      _ => {}
    }
  }
  match (ts, v1) {
    (Some(ts), Some(v1)) if !ts.is_empty() && !v1.is_empty() => Ok(SignatureHeader { ts, v1 }),
    _ => Err(SignatureError::Malformed),
  }
}

pub fn manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
  let mut out = String::new();
  if let Some(id) = data_id.filter(|s| !s.is_empty()) {
    // Alphanumeric ids are signed lowercased.
    out.push_str(&format!("id:{};", id.to_lowercase()));
  }
  if let Some(request_id) = request_id.filter(|s| !s.is_empty()) {
    out.push_str(&format!("request-id:{};", request_id));
  }
  out.push_str(&format!("ts:{};", ts));
  out
}

/// Checks `x-signature` against `secret` in constant time.
pub fn verify(
  secret: &str,
  signature_header: Option<&str>,
  request_id: Option<&str>,
  data_id: Option<&str>,
) -> Result<(), SignatureError> {
  let header = parse_header(signature_header.ok_or(SignatureError::Missing)?)?;
  let expected = hex::decode(&header.v1).map_err(|_| SignatureError::Malformed)?;
  let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
  mac.update(manifest(data_id, request_id, &header.ts).as_bytes());
  mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}
