//! JWT 认证适配器
//!
//! 实现领域层的 `AuthService` 边界：验证 bearer token 并返回用户身份。

use async_trait::async_trait;
use axum::http::HeaderMap;
use config::JwtConfig;
use domain::{AuthError, AuthService, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            user_id: user_id.into(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::InvalidToken(format!("token generation failed: {}", err)))
    }
}

#[async_trait]
impl AuthService for JwtService {
    async fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| UserId::new(token_data.claims.user_id))
            .map_err(|err| AuthError::InvalidToken(err.to_string()))
    }
}

/// 从 headers 中提取 bearer token
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-with-at-least-32-characters".to_string(),
            expiration_hours: 1,
        })
    }

    #[tokio::test]
    async fn token_round_trip() {
        let jwt = service();
        let user_id = UserId(Uuid::new_v4());

        let token = jwt.generate_token(user_id).unwrap();
        let verified = jwt.verify_token(&token).await.unwrap();
        assert_eq!(verified, user_id);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let jwt = service();
        assert!(jwt.verify_token("not-a-token").await.is_err());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let jwt = service();
        let claims = Claims {
            user_id: Uuid::new_v4(),
            exp: (chrono::Utc::now() - chrono::Duration::hours(2)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &jwt.encoding_key).unwrap();
        assert!(jwt.verify_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn token_from_other_secret_is_rejected() {
        let jwt = service();
        let other = JwtService::new(JwtConfig {
            secret: "another-secret-key-with-at-least-32-chars".to_string(),
            expiration_hours: 1,
        });
        let token = other.generate_token(UserId(Uuid::new_v4())).unwrap();
        assert!(jwt.verify_token(&token).await.is_err());
    }
}
