//! Display-only identity extraction from JWT access tokens.
//!
//! The payload segment is decoded without any signature check. The result
//! is meant for greetings and labels, never for authorization decisions.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Identity of the signed-in user, derived from token claims.
///
/// `mail` and `principal_name` may be empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
    pub mail: String,
    pub principal_name: String,
}

impl UserIdentity {
    /// Identity used when the token cannot be decoded at all.
    pub fn fallback() -> Self {
        Self {
            id: "microsoft-user".to_string(),
            display_name: "Microsoft User".to_string(),
            mail: String::new(),
            principal_name: "user@microsoft.com".to_string(),
        }
    }

    fn from_claims(claims: &Map<String, Value>) -> Self {
        let claim = |name: &str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
        };

        Self {
            id: claim("oid")
                .or_else(|| claim("sub"))
                .unwrap_or("unknown-user")
                .to_string(),
            display_name: claim("name")
                .or_else(|| claim("preferred_username"))
                .unwrap_or("User")
                .to_string(),
            mail: claim("email")
                .or_else(|| claim("preferred_username"))
                .unwrap_or_default()
                .to_string(),
            principal_name: claim("preferred_username")
                .or_else(|| claim("email"))
                .or_else(|| claim("upn"))
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Decode the identity carried by `token`.
///
/// Never fails: malformed tokens yield [`UserIdentity::fallback`].
pub fn extract_identity(token: &str) -> UserIdentity {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        warn!(
            segments = segments.len(),
            "Token is not a three-part JWT, using fallback identity"
        );
        return UserIdentity::fallback();
    }

    match decode_claims(segments[1]) {
        Some(claims) => {
            let identity = UserIdentity::from_claims(&claims);
            debug!(user_id = %identity.id, "Decoded identity from token claims");
            identity
        }
        None => {
            warn!("Token payload could not be decoded, using fallback identity");
            UserIdentity::fallback()
        }
    }
}

fn decode_claims(segment: &str) -> Option<Map<String, Value>> {
    let trimmed = segment.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()?;

    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}
