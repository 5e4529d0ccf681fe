//! Shared `Authorization: Basic <base64>` parsing, grounded on the teacher's
//! `basic_auth.rs` plugin. There is no standalone Basic authenticator in the
//! request-authentication pipeline — Basic auth only ever authenticates the
//! OAuth2 client on the token endpoint (§4.3 [SUPPLEMENT]).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Decodes `Authorization: Basic <base64>` into (username, password).
/// Returns `None` for a missing/wrong scheme, invalid base64, non-UTF8
/// payload, or a payload with no `:` separator.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (user, pass) = credentials.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
