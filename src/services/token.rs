use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Account, Claims};

/// Session token issuer. Stateless: no refresh or revocation logic lives here.
pub struct TokenService;

impl TokenService {
    /// Issue a signed access token for an authenticated account
    pub fn issue(config: &Config, account: &Account) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::minutes(config.jwt.access_token_expire_minutes as i64);

        let claims = Claims {
            sub: account.id.clone(),
            email: account.email.clone(),
            role: account.role.clone(),
            profile_id: account.profile_id.clone(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate an access token and extract claims
    pub fn validate(token: &str, config: &Config) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let keys = std::iter::once(config.jwt.secret.as_str())
            .chain(config.jwt.previous_secrets.iter().map(|s| s.as_str()));

        for secret in keys {
            if let Ok(token_data) = decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &validation,
            ) {
                return Ok(token_data.claims);
            }
        }

        Err(AppError::Unauthorized("Invalid token".to_string()))
    }

    pub fn expires_in(config: &Config) -> u64 {
        config.jwt.access_token_expire_minutes * 60
    }
}
