//! Business bearer tokens.
//!
//! Every authenticated call carries `Authorization: <token>`; the token is an
//! HS256-signed JWT whose `biz_id` claim scopes the call to one business.

use crate::errors::ApsisError;
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload};

const BIZ_CLAIM: &str = "biz_id";

/// Signs a bearer token for a business.
pub fn issue(secret: &str, biz_id: i64) -> Result<String, ApsisError> {
    let mut header = JwsHeader::new();
    header.set_token_type("JWT");

    let mut payload = JwtPayload::new();
    payload
        .set_claim(BIZ_CLAIM, Some(serde_json::json!(biz_id)))
        .map_err(|e| ApsisError::Jose(e.to_string()))?;

    let signer = HS256.signer_from_bytes(secret.as_bytes())?;
    Ok(jwt::encode_with_signer(&payload, &header, &signer)?)
}

/// Verifies a bearer token and returns the business id it carries.
pub fn verify(secret: &str, token: &str) -> Result<i64, ApsisError> {
    let verifier = HS256.verifier_from_bytes(secret.as_bytes())?;
    let (payload, _header) = jwt::decode_with_verifier(token, &verifier)?;
    payload
        .claim(BIZ_CLAIM)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ApsisError::Jose(format!("token missing {BIZ_CLAIM} claim")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify() {
        let token = issue("topsecret", 42).unwrap();
        assert_eq!(verify("topsecret", &token).unwrap(), 42);
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue("topsecret", 42).unwrap();
        assert!(verify("other", &token).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(verify("topsecret", "not-a-token").is_err());
    }
}
