//! Authentication: bcrypt password hashes and HS256 access tokens.

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::user::{LoginRequest, RegisterRequest, TokenResponse, User};

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct AuthService {
    db: SqlitePool,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_hours: i64,
    allow_signup: bool,
}

impl AuthService {
    pub fn new(db: SqlitePool, config: &Config) -> Self {
        Self {
            db,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_expiry_hours: config.jwt_expiry_hours,
            allow_signup: config.allow_signup,
        }
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<TokenResponse> {
        if !self.allow_signup {
            return Err(AppError::Unauthorized("Signup is disabled".into()));
        }
        if req.username.trim().is_empty() || req.password.len() < 8 {
            return Err(AppError::Validation(
                "username is required and password must be at least 8 characters".into(),
            ));
        }

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(&req.username)
            .fetch_optional(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Validation("username is already taken".into()));
        }

        let password_hash = hash(&req.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("password hash: {}", e)))?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: req.username.clone(),
            password_hash,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await?;

        let token = self.issue_token(&user)?;
        Ok(TokenResponse { token, user })
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<TokenResponse> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at, updated_at FROM users WHERE username = ?",
        )
        .bind(&req.username)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Authentication("invalid username or password".into()))?;

        let valid = verify(&req.password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("password verify: {}", e)))?;
        if !valid {
            return Err(AppError::Authentication(
                "invalid username or password".into(),
            ));
        }

        let token = self.issue_token(&user)?;
        Ok(TokenResponse { token, user })
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            exp: (now + Duration::hours(self.token_expiry_hours)).timestamp(),
            iat: now.timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn test_config() -> Config {
        Config {
            database_path: ":memory:".into(),
            bind_address: "127.0.0.1:0".into(),
            backup_dir: "./backups".into(),
            encryption_key: "enc".into(),
            jwt_secret: "jwt-secret".into(),
            jwt_expiry_hours: 24,
            allow_signup: true,
        }
    }

    #[tokio::test]
    async fn test_register_login_roundtrip() {
        let pool = memory_pool().await;
        let service = AuthService::new(pool, &test_config());

        let registered = service
            .register(&RegisterRequest {
                username: "admin".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();
        assert!(!registered.token.is_empty());

        let logged_in = service
            .login(&LoginRequest {
                username: "admin".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();

        let claims = service.validate_token(&logged_in.token).unwrap();
        assert_eq!(claims.sub, registered.user.id);
        assert_eq!(claims.username, "admin");
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let pool = memory_pool().await;
        let service = AuthService::new(pool, &test_config());

        service
            .register(&RegisterRequest {
                username: "admin".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();

        assert!(matches!(
            service
                .login(&LoginRequest {
                    username: "admin".into(),
                    password: "wrong".into(),
                })
                .await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_username() {
        let pool = memory_pool().await;
        let service = AuthService::new(pool, &test_config());

        let req = RegisterRequest {
            username: "admin".into(),
            password: "correct horse".into(),
        };
        service.register(&req).await.unwrap();
        assert!(matches!(
            service.register(&req).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_signup_can_be_disabled() {
        let pool = memory_pool().await;
        let mut config = test_config();
        config.allow_signup = false;
        let service = AuthService::new(pool, &config);

        assert!(matches!(
            service
                .register(&RegisterRequest {
                    username: "admin".into(),
                    password: "correct horse".into(),
                })
                .await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let pool = memory_pool().await;
        let service = AuthService::new(pool, &test_config());
        assert!(service.validate_token("not-a-token").is_err());
    }
}
