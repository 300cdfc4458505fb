// jws.rs — HS256 compact tokens over canonical JSON.
//
// Token layout: base64url(header) "." base64url(payload) "." base64url(mac),
// no padding, with the header fixed to {"alg":"HS256","typ":"JWT"} and the
// payload being the canonical JSON of the record. The MAC is HMAC-SHA256
// over the first two segments.
//
// Verification checks the MAC and then also requires the token payload to be
// byte-identical to the canonical form of the record the caller presents.
// A valid token for one record therefore never validates a different one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use serde::Serialize;

use crate::canonical::canonical_bytes;
use crate::error::AttestError;

/// The fixed protected header of every token.
pub const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Sign `record` with `secret`, returning a compact `header.payload.signature` token.
///
/// Fails only if the record cannot be serialized.
pub fn sign<T: Serialize + ?Sized>(secret: &[u8], record: &T) -> Result<String, AttestError> {
    let payload = canonical_bytes(record)?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HEADER_JSON),
        URL_SAFE_NO_PAD.encode(&payload)
    );
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, signing_input.as_bytes());
    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    ))
}

/// Verify that `token` is a valid signature by `secret` over exactly `record`.
///
/// Returns `Ok(false)` for any malformed or non-matching token. An error is
/// returned only when `record` itself cannot be serialized.
pub fn verify<T: Serialize + ?Sized>(
    secret: &[u8],
    record: &T,
    token: &str,
) -> Result<bool, AttestError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Ok(false);
    };

    let Ok(tag) = URL_SAFE_NO_PAD.decode(signature) else {
        return Ok(false);
    };
    let signing_input = &token[..header.len() + 1 + payload.len()];
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    if hmac::verify(&key, signing_input.as_bytes(), &tag).is_err() {
        return Ok(false);
    }

    let expected = URL_SAFE_NO_PAD.encode(canonical_bytes(record)?);
    Ok(expected == payload)
}

/// Decode the payload segment of a token without checking its signature.
///
/// Useful for inspecting what a token claims to cover.
pub fn decode_payload(token: &str) -> Result<serde_json::Value, AttestError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AttestError::InvalidToken {
            reason: format!("expected 3 segments, found {}", parts.len()),
        });
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| AttestError::InvalidToken {
            reason: format!("payload is not base64url: {}", e),
        })?;
    Ok(serde_json::from_slice(&bytes)?)
}
