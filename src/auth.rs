//! Authentication module for bearer token validation.
//!
//! Extracts the bearer token from the Authorization header and verifies it as an
//! HS256-signed JWT against a shared secret.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Default audience expected in the `aud` claim
pub const DEFAULT_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    Missing,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,
}

/// Claims read from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub role: Option<String>,
}

/// Verifies tokens against one shared secret and audience.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.leeway = 0;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a raw token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                _ => {
                    log::debug!("token rejected: {err}");
                    Err(AuthError::Invalid)
                }
            },
        }
    }

    /// Verify the token carried by an Authorization header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let token = header
            .and_then(extract_bearer_token)
            .ok_or(AuthError::Missing)?;
        self.verify(token)
    }
}

/// Extracts the bearer token from an Authorization header value.
///
/// Expected format: "Bearer <token>"
/// Returns `None` if the header doesn't match the expected format.
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();

    // Case-insensitive "Bearer " prefix check (RFC 6750 allows case-insensitive)
    if header.len() < 7 || !header.is_char_boundary(7) {
        return None;
    }

    let (prefix, token) = header.split_at(7);
    if prefix.eq_ignore_ascii_case("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    } else {
        None
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(SECRET, DEFAULT_AUDIENCE)
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        assert_eq!(extract_bearer_token("Bearer secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("bearer secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("BEARER secret123"), Some("secret123"));
        assert_eq!(extract_bearer_token("  Bearer secret123  "), Some("secret123"));
    }

    #[test]
    fn test_extract_bearer_token_invalid() {
        assert_eq!(extract_bearer_token(""), None);
        assert_eq!(extract_bearer_token("Basic secret123"), None);
        assert_eq!(extract_bearer_token("Bearer"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Bearersecret123"), None);
        assert_eq!(extract_bearer_token("secret123"), None);
        assert_eq!(extract_bearer_token("Beäre token"), None);
    }

    #[test]
    fn test_verify_valid_token() {
        let token = test_tokens::valid(SECRET);
        let claims = verifier().verify(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_verify_expired_token() {
        let token = test_tokens::expired(SECRET);
        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = test_tokens::valid("other-secret");
        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn test_verify_wrong_audience() {
        let exp = chrono::Utc::now().timestamp() as u64 + 3600;
        let token = test_tokens::sign(SECRET, "anon", exp);
        assert_eq!(verifier().verify(&token).unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn test_verify_garbage() {
        assert_eq!(verifier().verify("not.a.jwt").unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn test_verify_header() {
        let header = format!("Bearer {}", test_tokens::valid(SECRET));
        assert!(verifier().verify_header(Some(&header)).is_ok());
        assert_eq!(
            verifier().verify_header(None).unwrap_err(),
            AuthError::Missing
        );
        assert_eq!(
            verifier().verify_header(Some("Basic abc")).unwrap_err(),
            AuthError::Missing
        );
    }
}
