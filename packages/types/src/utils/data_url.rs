//! Helpers for the `data:` URIs the journey graph stores image payloads in.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::Path;

/// Wraps an already base64-encoded payload in a data URI.
pub fn encode(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Base64-encodes raw bytes into a data URI.
pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> String {
    encode(mime_type, &STANDARD.encode(bytes))
}

/// Splits a data URI into `(mime_type, base64_data)`.
///
/// Only the `;base64` form is supported, which is the only form this
/// application ever produces or receives.
pub fn decode(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    Some((mime_type.to_string(), data.to_string()))
}

/// Splits a data URI and decodes its payload back into raw bytes.
pub fn to_bytes(url: &str) -> Option<(String, Vec<u8>)> {
    let (mime_type, data) = decode(url)?;
    let bytes = STANDARD.decode(data.as_bytes()).ok()?;
    Some((mime_type, bytes))
}

/// Best-effort mime type for a file the user picked from disk.
pub fn mime_for_path(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
