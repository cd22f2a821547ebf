//! Session token validation
//!
//! Accounts live in the hosted auth provider; the worker only validates
//! the JWT access tokens it issues and extracts the caller's identity.

use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Request;

/// Caller role, as carried in the token. Tokens with a role outside this
/// set fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
    Technician,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User email
    pub email: String,
    pub role: Role,
    /// Issued at (unix timestamp)
    pub iat: usize,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

/// Authentication result from extract_auth
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthInfo {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_technician(&self) -> bool {
        self.role == Role::Technician
    }
}

/// Generate a JWT access token (used in tests and by the dev tooling;
/// production tokens come from the auth provider with the same shape)
pub fn generate_token(user_id: Uuid, email: &str, role: Role, secret: &str) -> Result<String> {
    let now = chrono::Utc::now().timestamp() as usize;
    let exp = now + 8 * 60 * 60; // 8 hours

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role,
        iat: now,
        exp,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a JWT token and return claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(token_data.claims)
}

/// Extract authentication info from a NATS request.
pub fn extract_auth<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthInfo> {
    let token = request
        .token
        .as_ref()
        .ok_or_else(|| anyhow!("No authentication provided — JWT token is required"))?;

    let claims = validate_token(token, jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|e| anyhow!("Invalid user_id in token: {}", e))?;

    Ok(AuthInfo {
        user_id,
        role: claims.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-at-least-32-bytes-long";

    fn make_request(token: Option<String>) -> Request<serde_json::Value> {
        Request {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let user_id = Uuid::new_v4();
        let token =
            generate_token(user_id, "test@example.com", Role::Customer, TEST_SECRET).unwrap();

        let claims = validate_token(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, Role::Customer);
    }

    #[test]
    fn test_validate_token_wrong_secret() {
        let user_id = Uuid::new_v4();
        let token =
            generate_token(user_id, "test@example.com", Role::Customer, TEST_SECRET).unwrap();

        assert!(validate_token(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_validate_token_malformed() {
        assert!(validate_token("not.a.valid.token", TEST_SECRET).is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        for (role, name) in [
            (Role::Admin, "\"admin\""),
            (Role::Customer, "\"customer\""),
            (Role::Technician, "\"technician\""),
        ] {
            assert_eq!(serde_json::to_string(&role).unwrap(), name);
        }
    }

    #[test]
    fn test_unknown_role_fails_validation() {
        // A token minted with a role outside the marketplace's set
        #[derive(Serialize)]
        struct ForeignClaims {
            sub: String,
            email: String,
            role: String,
            iat: usize,
            exp: usize,
        }

        let now = Utc::now().timestamp() as usize;
        let claims = ForeignClaims {
            sub: Uuid::new_v4().to_string(),
            email: "w@example.com".to_string(),
            role: "warehouse".to_string(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(validate_token(&token, TEST_SECRET).is_err());
    }

    #[test]
    fn test_extract_auth_with_valid_token() {
        let user_id = Uuid::new_v4();
        let token =
            generate_token(user_id, "admin@example.com", Role::Admin, TEST_SECRET).unwrap();

        let auth = extract_auth(&make_request(Some(token)), TEST_SECRET).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert!(auth.is_admin());
    }

    #[test]
    fn test_extract_auth_technician_role() {
        let user_id = Uuid::new_v4();
        let token =
            generate_token(user_id, "tech@example.com", Role::Technician, TEST_SECRET).unwrap();

        let auth = extract_auth(&make_request(Some(token)), TEST_SECRET).unwrap();
        assert!(auth.is_technician());
        assert!(!auth.is_admin());
    }

    #[test]
    fn test_extract_auth_no_token_fails() {
        assert!(extract_auth(&make_request(None), TEST_SECRET).is_err());
    }

    #[test]
    fn test_extract_auth_invalid_token_fails() {
        let request = make_request(Some("bad-token".to_string()));
        assert!(extract_auth(&request, TEST_SECRET).is_err());
    }
}
