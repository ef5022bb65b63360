use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::ceremony::CredentialCeremony;
use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Account, AuthMethod, LoginChallenge, Passkey};
use crate::services::{AccountService, DeviceService};

/// Passkey login ceremony: NoChallenge -> Issued -> Consumed.
/// At most one live challenge per account; beginning again supersedes it.
pub struct BiometricLoginService;

impl BiometricLoginService {
    /// Start an authentication ceremony against the account's bound passkeys
    pub async fn begin(
        db: &Database,
        ceremony: &dyn CredentialCeremony,
        config: &Config,
        account_id: &str,
    ) -> Result<serde_json::Value> {
        AccountService::get_account(db, account_id).await?;

        let credentials: Vec<String> = sqlx::query_scalar(
            "SELECT credential_json FROM passkeys WHERE account_id = ? ORDER BY created_at DESC",
        )
        .bind(account_id)
        .fetch_all(db.pool())
        .await?;

        if credentials.is_empty() {
            return Err(AppError::BiometricNotEnabled);
        }

        let (options, state_json) = ceremony.begin_login(&credentials)?;

        Self::store_challenge(db, account_id, &state_json, config).await?;

        Ok(options)
    }

    /// Verify the client's assertion, consume the challenge, touch the
    /// passkey, and record the device binding. The caller issues the session
    /// token from the returned account.
    pub async fn complete(
        db: &Database,
        ceremony: &dyn CredentialCeremony,
        account_id: &str,
        response: &serde_json::Value,
        device_token: Option<&str>,
        device_type: Option<&str>,
    ) -> Result<Account> {
        let challenge = Self::load_challenge(db, account_id).await?;

        // The assertion names the credential it was produced with
        let credential_id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::BadRequest("Invalid ceremony response".to_string()))?;

        let passkey: Option<Passkey> =
            sqlx::query_as("SELECT * FROM passkeys WHERE credential_id = ? AND account_id = ?")
                .bind(credential_id)
                .bind(account_id)
                .fetch_optional(db.pool())
                .await?;
        let passkey = passkey.ok_or(AppError::CredentialNotFound)?;

        let updated_credential =
            ceremony.finish_login(&challenge.state_json, &passkey.credential_json, response)?;

        let now = Utc::now().to_rfc3339();
        let mut tx = db.pool().begin().await?;

        // Consume the challenge; the first completion to delete it wins
        let affected = sqlx::query("DELETE FROM login_challenges WHERE id = ?")
            .bind(&challenge.id)
            .execute(tx.as_mut())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::ChallengeNotFound);
        }

        match updated_credential {
            Some(credential_json) => {
                sqlx::query(
                    "UPDATE passkeys SET credential_json = ?, last_used_at = ? WHERE id = ?",
                )
                .bind(&credential_json)
                .bind(&now)
                .bind(&passkey.id)
                .execute(tx.as_mut())
                .await?;
            }
            None => {
                sqlx::query("UPDATE passkeys SET last_used_at = ? WHERE id = ?")
                    .bind(&now)
                    .bind(&passkey.id)
                    .execute(tx.as_mut())
                    .await?;
            }
        }

        tx.commit().await?;

        if let Some(token) = device_token {
            if let Err(e) =
                DeviceService::record_login(db, token, account_id, AuthMethod::Biometric, device_type)
                    .await
            {
                tracing::warn!("device binding failed: {e}");
            }
        }

        tracing::info!(account_id = %account_id, passkey_id = %passkey.id, "passkey login");
        AccountService::get_account(db, account_id).await
    }

    /// Upsert the account's sole login challenge
    async fn store_challenge(
        db: &Database,
        account_id: &str,
        state_json: &str,
        config: &Config,
    ) -> Result<()> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at =
            (now + Duration::seconds(config.passkey.challenge_ttl_seconds as i64)).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO login_challenges (id, account_id, state_json, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                id = excluded.id,
                state_json = excluded.state_json,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(&id)
        .bind(account_id)
        .bind(state_json)
        .bind(&expires_at)
        .bind(&now.to_rfc3339())
        .execute(db.pool())
        .await?;

        Ok(())
    }

    /// Load the account's live challenge. An expired one counts as absent and
    /// is deleted on sight.
    async fn load_challenge(db: &Database, account_id: &str) -> Result<LoginChallenge> {
        let challenge: Option<LoginChallenge> =
            sqlx::query_as("SELECT * FROM login_challenges WHERE account_id = ?")
                .bind(account_id)
                .fetch_optional(db.pool())
                .await?;

        let challenge = challenge.ok_or(AppError::ChallengeNotFound)?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&challenge.expires_at)
            .map_err(|_| AppError::Internal("Invalid challenge expiry format".to_string()))?;
        if expires_at < Utc::now() {
            sqlx::query("DELETE FROM login_challenges WHERE id = ?")
                .bind(&challenge.id)
                .execute(db.pool())
                .await?;
            return Err(AppError::ChallengeNotFound);
        }

        Ok(challenge)
    }
}
