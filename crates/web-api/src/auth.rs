//! JWT 认证模块
//!
//! 验证外部身份服务签发的 HS256 token，并把它换成调用者身份。
//! `generate_token` 只用于开发与测试环境。

use application::{ApplicationError, Principal, TokenVerifier};
use axum::http::HeaderMap;
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
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
    pub fn generate_token(&self, user_id: UserId, username: &str) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            sub: Uuid::from(user_id),
            username: username.to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApiError::internal_server_error(format!("Token generation failed: {}", err))
        })
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        self.decode_claims(token)
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))
    }

    /// 从 headers 中提取和验证 token
    pub fn extract_principal_from_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<Principal, ApiError> {
        let auth_header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))?;

        let claims = self.verify_token(token)?;
        Ok(principal_from(claims))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
    }
}

impl TokenVerifier for JwtService {
    fn verify(&self, token: &str) -> Result<Principal, ApplicationError> {
        self.decode_claims(token)
            .map(principal_from)
            .map_err(|err| ApplicationError::unauthenticated(err.to_string()))
    }
}

fn principal_from(claims: Claims) -> Principal {
    Principal {
        user_id: UserId::from(claims.sub),
        username: claims.username,
    }
}
