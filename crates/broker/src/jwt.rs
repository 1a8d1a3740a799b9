//! App JWT minting (§4.A.1): RS256, 10-minute expiry, regenerated per call.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use prhub_core::{HubError, HubResult};
use serde::Serialize;

const JWT_TTL_SECS: i64 = 10 * 60;

#[derive(Debug, Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Mints a fresh App JWT. Cheap enough to call on every outbound request;
/// never cache it beyond a single request.
///
/// # Errors
///
/// Returns [`HubError::ConfigMissing`] if `private_key_pem` isn't a valid
/// RS256 key, and [`HubError::Internal`] if token encoding otherwise fails.
pub fn mint_app_jwt(app_id: &str, private_key_pem: &[u8]) -> HubResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        iat: now,
        exp: now + JWT_TTL_SECS,
        iss: app_id.to_string(),
    };

    let key = EncodingKey::from_rsa_pem(private_key_pem).map_err(|e| HubError::ConfigMissing {
        var: format!("PLATFORM_PRIVATE_KEY (invalid RS256 key: {e})"),
    })?;

    encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| HubError::Internal {
        reason: format!("failed to encode App JWT: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_key_is_config_missing() {
        let result = mint_app_jwt("123", b"not a real key");
        assert!(matches!(result, Err(HubError::ConfigMissing { .. })));
    }
}
