//! OAuth 1.0a request signing (HMAC-SHA1), as required by the v1.1 API.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha1::Sha1;

use crate::TwitterApiError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

/// Per-request values that make a signature unique.
#[derive(Debug, Clone)]
pub(crate) struct OAuthNonce {
    pub(crate) nonce: String,
    pub(crate) timestamp: u64,
}

impl OAuthNonce {
    pub(crate) fn generate(timestamp: u64) -> Self {
        let nonce = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self { nonce, timestamp }
    }
}

/// RFC 3986 percent-encoding: everything except unreserved characters.
pub(crate) fn percent_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn oauth_parameters(credentials: &OAuthCredentials, nonce: &OAuthNonce) -> Vec<(String, String)> {
    vec![
        ("oauth_consumer_key".to_string(), credentials.consumer_key.clone()),
        ("oauth_nonce".to_string(), nonce.nonce.clone()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), nonce.timestamp.to_string()),
        ("oauth_token".to_string(), credentials.access_token.clone()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ]
}

pub(crate) fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(String, String)],
    oauth_params: &[(String, String)],
) -> String {
    let mut encoded = params
        .iter()
        .chain(oauth_params)
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

pub(crate) fn sign(
    credentials: &OAuthCredentials,
    base_string: &str,
) -> Result<String, TwitterApiError> {
    let key = format!(
        "{}&{}",
        percent_encode(&credentials.consumer_secret),
        percent_encode(&credentials.access_secret)
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|error| TwitterApiError::Signing(error.to_string()))?;
    mac.update(base_string.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Builds the `Authorization: OAuth ...` header for one request.
///
/// `url` must not carry a query string; query and form parameters go in
/// `params` so they are covered by the signature.
pub(crate) fn authorization_header(
    credentials: &OAuthCredentials,
    method: &str,
    url: &str,
    params: &[(String, String)],
    nonce: &OAuthNonce,
) -> Result<String, TwitterApiError> {
    let mut oauth_params = oauth_parameters(credentials, nonce);
    let base_string = signature_base_string(method, url, params, &oauth_params);
    let signature = sign(credentials, &base_string)?;
    oauth_params.push(("oauth_signature".to_string(), signature));
    oauth_params.sort();
    let fields = oauth_params
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {fields}"))
}
