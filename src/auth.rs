//! Session tokens and the acting principal.
//!
//! Every privileged operation takes an [`Actor`]; the gateway derives it from
//! a verified HS256 token.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::models::{Role, UserId};

/// Who is performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::User,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), EngineError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(EngineError::Forbidden("admin role required".into()))
        }
    }

    /// Owner of the resource or an admin
    pub fn can_act_for(&self, owner: UserId) -> bool {
        self.is_admin() || self.user_id == owner
    }
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub role: Role,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn actor(&self) -> Result<Actor, AuthError> {
        let user_id = self.sub.parse().map_err(|_| AuthError::InvalidSubject)?;
        Ok(Actor {
            user_id,
            role: self.role,
        })
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid or expired token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token subject is not a user id")]
    InvalidSubject,
}

#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(24),
        }
    }

    /// Issue a session token (used by operator tooling and tests)
    pub fn issue(&self, actor: Actor, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            sub: actor.user_id.to_string(),
            role: actor.role,
            exp: (now + self.ttl).timestamp().max(0) as usize,
            iat: now.timestamp().max(0) as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Actor, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        token_data.claims.actor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let verifier = TokenVerifier::new("test-secret");
        let token = verifier.issue(Actor::admin(7), Utc::now()).unwrap();
        let actor = verifier.verify(&token).unwrap();
        assert_eq!(actor, Actor::admin(7));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenVerifier::new("a").issue(Actor::user(1), Utc::now()).unwrap();
        assert!(matches!(
            TokenVerifier::new("b").verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = TokenVerifier::new("secret");
        let token = verifier
            .issue(Actor::user(1), Utc::now() - Duration::days(3))
            .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_actor_permissions() {
        assert!(Actor::user(1).require_admin().is_err());
        assert!(Actor::admin(1).require_admin().is_ok());
        assert!(Actor::user(1).can_act_for(1));
        assert!(!Actor::user(1).can_act_for(2));
        assert!(Actor::admin(9).can_act_for(2));
    }
}
