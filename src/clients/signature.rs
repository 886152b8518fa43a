use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;

use crate::errors::StoreError;

// Same set JavaScript's encodeURIComponent leaves untouched.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Formats a timestamp the way the `x-ms-date` header expects (RFC 1123).
#[must_use]
pub fn rfc1123_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[must_use]
pub fn string_to_sign(verb: &str, resource_type: &str, resource_link: &str, date: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    )
}

/// Base64 HMAC-SHA256 of the canonical request string under the decoded key.
///
/// # Errors
///
/// Returns `ConfigurationError` if the HMAC cannot be keyed.
pub fn compute_signature(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, StoreError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| StoreError::ConfigurationError(format!("Failed to create HMAC: {e}")))?;
    mac.update(string_to_sign(verb, resource_type, resource_link, date).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Value for the `authorization` header of a master-key signed request.
///
/// # Errors
///
/// Returns `ConfigurationError` if the HMAC cannot be keyed.
pub fn authorization_token(
    key: &[u8],
    verb: &str,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, StoreError> {
    let signature = compute_signature(key, verb, resource_type, resource_link, date)?;
    let token = format!("type=master&ver=1.0&sig={signature}");
    Ok(utf8_percent_encode(&token, URI_COMPONENT).to_string())
}
