use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use thiserror::Error;

/// Authorization level carried in the session token's role claim.
///
/// Any role string the console does not recognize deserializes to `User`,
/// the least-privileged level.
#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    User,
}

/// Claims embedded in the session token by the backend at login time.
///
/// The console only decodes the payload segment; signature verification is
/// the server's job — an operator tampering with their own token gains
/// nothing, since every request is re-authorized server-side.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct TokenClaims {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: Role,
    /// Expiry as a Unix timestamp, seconds.
    #[serde(default)]
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is not a three-segment JWT")]
    Malformed,

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a valid claims object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode the claims out of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Result<TokenClaims, DecodeError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(DecodeError::Malformed),
    };
    if segments.next().is_some() {
        return Err(DecodeError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.sig", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_admin_claims() {
        let token = encode_unsigned(&json!({
            "username": "ops",
            "role": "admin",
            "exp": 1_767_225_600,
        }));

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.username, "ops");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp, 1_767_225_600);
    }

    #[test]
    fn unknown_role_falls_back_to_user() {
        let token = encode_unsigned(&json!({ "username": "x", "role": "superuser" }));
        assert_eq!(decode_claims(&token).unwrap().role, Role::User);
    }

    #[test]
    fn missing_claims_default() {
        let token = encode_unsigned(&json!({}));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.role, Role::User);
        assert!(claims.username.is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_claims("not-a-token"),
            Err(DecodeError::Malformed)
        ));
        assert!(decode_claims("a.%%%.c").is_err());
        assert!(decode_claims("a.b.c.d").is_err());
    }
}
