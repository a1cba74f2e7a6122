//! Path and query parameter parsing with structured error messages.

use crate::error::ApiError;
use dv_types::{Hash256, SignatureBytes};
use std::collections::HashMap;

pub type QueryMap = HashMap<String, String>;

/// Parses a uint path segment, e.g. `{epoch}` or `{slot}`.
pub fn uint_path(name: &str, value: &str) -> Result<u64, ApiError> {
    value.parse::<u64>().map_err(|_| {
        ApiError::bad_request(format!("invalid uint path parameter {} [{}]", name, value))
    })
}

/// Parses a required uint query parameter.
pub fn uint_query(query: &QueryMap, name: &str) -> Result<u64, ApiError> {
    let value = query
        .get(name)
        .ok_or_else(|| ApiError::bad_request(format!("missing uint query parameter {}", name)))?;
    value.parse::<u64>().map_err(|_| {
        ApiError::bad_request(format!("invalid uint query parameter {} [{}]", name, value))
    })
}

pub fn opt_uint_query(query: &QueryMap, name: &str) -> Result<Option<u64>, ApiError> {
    match query.get(name) {
        None => Ok(None),
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| {
                ApiError::bad_request(format!(
                    "invalid uint query parameter {} [{}]",
                    name, value
                ))
            }),
    }
}

/// Parses a required 0x-prefixed hex query parameter of exactly `len` bytes.
fn hex_query(query: &QueryMap, name: &str, len: usize) -> Result<Vec<u8>, ApiError> {
    let value = query.get(name).ok_or_else(|| {
        ApiError::bad_request(format!("missing 0x-hex query parameter {}", name))
    })?;
    let stripped = value.strip_prefix("0x").ok_or_else(|| {
        ApiError::bad_request(format!(
            "invalid 0x-hex query parameter {} [{}]",
            name, value
        ))
    })?;
    let bytes = hex::decode(stripped).map_err(|_| {
        ApiError::bad_request(format!(
            "invalid 0x-hex query parameter {} [{}]",
            name, value
        ))
    })?;
    if bytes.len() != len {
        return Err(ApiError::bad_request(format!(
            "invalid length for 0x-hex query parameter {}, expect {} bytes",
            name, len
        )));
    }
    Ok(bytes)
}

pub fn signature_query(query: &QueryMap, name: &str) -> Result<SignatureBytes, ApiError> {
    let bytes = hex_query(query, name, 96)?;
    SignatureBytes::from_bytes(&bytes)
        .map_err(|e| ApiError::bad_request(format!("invalid {} value: {}", name, e)))
}

pub fn root_query(query: &QueryMap, name: &str) -> Result<Hash256, ApiError> {
    let bytes = hex_query(query, name, 32)?;
    Ok(Hash256::from_slice(&bytes))
}

pub fn opt_root_query(query: &QueryMap, name: &str) -> Result<Option<Hash256>, ApiError> {
    if !query.contains_key(name) {
        return Ok(None);
    }
    root_query(query, name).map(Some)
}
