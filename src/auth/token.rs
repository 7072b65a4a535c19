use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, Role};
use crate::error::AppError;

/// Issuers in the wider platform emit `sub` either as a string or as the
/// numeric user primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    Text(String),
    Number(i64),
}

impl Subject {
    pub fn into_string(self) -> String {
        match self {
            Subject::Text(s) => s,
            Subject::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Subject,
    pub role: String,
    pub exp: u64,
}

/// HS256 token codec shared by the HTTP and WebSocket auth paths.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `user_id` valid for `ttl_secs` seconds.
    pub fn issue(&self, user_id: &str, role: Role, ttl_secs: u64) -> Result<String, AppError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl_secs;
        let claims = Claims {
            sub: Subject::Text(user_id.to_string()),
            role: role.as_str().to_string(),
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        let role = Role::parse(&data.claims.role)
            .ok_or_else(|| AppError::Auth("Unknown role in token".to_string()))?;
        let user_id = data.claims.sub.into_string();
        if user_id.is_empty() {
            return Err(AppError::Auth("Token has empty subject".to_string()));
        }

        Ok(AuthUser { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let tokens = TokenService::new("secret");
        let token = tokens.issue("42", Role::Student, 60).unwrap();

        let user = tokens.verify(&token).unwrap();
        assert_eq!(user.user_id, "42");
        assert_eq!(user.role, Role::Student);
    }

    #[test]
    fn test_numeric_subject() {
        let tokens = TokenService::new("secret");
        let claims = serde_json::json!({
            "sub": 7,
            "role": "admin",
            "exp": chrono::Utc::now().timestamp() + 60,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let user = tokens.verify(&token).unwrap();
        assert_eq!(user.user_id, "7");
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenService::new("one").issue("42", Role::Admin, 60).unwrap();
        assert!(matches!(
            TokenService::new("two").verify(&token),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_expired_rejected() {
        let tokens = TokenService::new("secret");
        let claims = Claims {
            sub: Subject::Text("42".to_string()),
            role: "student".to_string(),
            exp: 1_000,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let tokens = TokenService::new("secret");
        let claims = Claims {
            sub: Subject::Text("42".to_string()),
            role: "janitor".to_string(),
            exp: chrono::Utc::now().timestamp() as u64 + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        assert!(tokens.verify(&token).is_err());
    }
}
