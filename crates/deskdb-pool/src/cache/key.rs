//! Cache keys and parameter digests

use std::fmt;

use deskdb_core::Value;
use ring::digest::{Context, SHA256, digest};
use serde::{Deserialize, Serialize};

/// Canonical encoding of a parameter list
fn encode_params(params: &[Value]) -> Vec<u8> {
    // serializing plain values into memory cannot fail
    serde_json::to_vec(params).unwrap_or_default()
}

/// Hex-encoded SHA-256 of the canonical parameter encoding.
///
/// Safe to log: identical bindings produce identical digests without
/// revealing the values.
pub fn params_digest(params: &[Value]) -> String {
    hex::encode(digest(&SHA256, &encode_params(params)))
}

/// Identifies one statement text under one parameter binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(sql: &str, params: &[Value]) -> Self {
        let mut context = Context::new(&SHA256);
        context.update(sql.as_bytes());
        // separator keeps "ab"+"c" and "a"+"bc" apart
        context.update(&[0]);
        context.update(&encode_params(params));
        Self(hex::encode(context.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
