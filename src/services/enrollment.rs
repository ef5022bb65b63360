use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::ceremony::CredentialCeremony;
use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Passkey, RegistrationChallenge};
use crate::services::{AccountService, PasskeyService};

/// Passkey enrollment ceremony: NoChallenge -> Issued -> Consumed.
/// At most one live challenge per account; beginning again supersedes it.
pub struct EnrollmentService;

impl EnrollmentService {
    /// Start an enrollment ceremony and return the client options payload
    pub async fn begin(
        db: &Database,
        ceremony: &dyn CredentialCeremony,
        config: &Config,
        account_id: &str,
        display_name: &str,
    ) -> Result<serde_json::Value> {
        let account = AccountService::get_account(db, account_id).await?;

        // Existing credentials are excluded from re-enrollment
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT credential_json FROM passkeys WHERE account_id = ?")
                .bind(account_id)
                .fetch_all(db.pool())
                .await?;

        let (options, state_json) =
            ceremony.begin_enrollment(&account.id, &account.email, display_name, &existing)?;

        Self::store_challenge(db, account_id, &state_json, config).await?;

        Ok(options)
    }

    /// Verify the client's ceremony response, consume the challenge, and bind
    /// the new credential through the passkey registry.
    pub async fn complete(
        db: &Database,
        ceremony: &dyn CredentialCeremony,
        account_id: &str,
        response: &serde_json::Value,
        name: Option<String>,
        device_type: Option<String>,
    ) -> Result<Passkey> {
        let challenge = Self::load_challenge(db, account_id).await?;

        let credential = ceremony.finish_enrollment(&challenge.state_json, response)?;

        // Credential identifiers are globally unique across accounts
        let duplicate: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM passkeys WHERE credential_id = ?")
                .bind(&credential.credential_id)
                .fetch_optional(db.pool())
                .await?;
        if duplicate.is_some() {
            return Err(AppError::AlreadyExists(
                "Credential already registered".to_string(),
            ));
        }

        let mut tx = db.pool().begin().await?;

        // Consume the challenge; a concurrent completion that got here first
        // already deleted it and this attempt must fail.
        let affected = sqlx::query("DELETE FROM registration_challenges WHERE id = ?")
            .bind(&challenge.id)
            .execute(tx.as_mut())
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::ChallengeNotFound);
        }

        let passkey =
            PasskeyService::register_tx(tx.as_mut(), account_id, &credential, name, device_type)
                .await?;

        tx.commit().await?;

        tracing::info!(account_id = %account_id, passkey_id = %passkey.id, "passkey enrolled");
        Ok(passkey)
    }

    /// Upsert the account's sole registration challenge
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
            INSERT INTO registration_challenges (id, account_id, state_json, expires_at, created_at)
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
    async fn load_challenge(db: &Database, account_id: &str) -> Result<RegistrationChallenge> {
        let challenge: Option<RegistrationChallenge> =
            sqlx::query_as("SELECT * FROM registration_challenges WHERE account_id = ?")
                .bind(account_id)
                .fetch_optional(db.pool())
                .await?;

        let challenge = challenge.ok_or(AppError::ChallengeNotFound)?;

        let expires_at = chrono::DateTime::parse_from_rfc3339(&challenge.expires_at)
            .map_err(|_| AppError::Internal("Invalid challenge expiry format".to_string()))?;
        if expires_at < Utc::now() {
            sqlx::query("DELETE FROM registration_challenges WHERE id = ?")
                .bind(&challenge.id)
                .execute(db.pool())
                .await?;
            return Err(AppError::ChallengeNotFound);
        }

        Ok(challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::testing::{enroll_response, FakeCeremony};
    use crate::models::AccountRole;

    async fn account(db: &Database, email: &str) -> String {
        AccountService::create_account(db, email, "secret1", AccountRole::Customer)
            .await
            .unwrap()
            .id
    }

    fn challenge_of(options: &serde_json::Value) -> String {
        options["challenge"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn enrollment_binds_a_passkey_and_enables_biometrics() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let config = Config::default();
        let id = account(&db, "a@x.com").await;

        let options = EnrollmentService::begin(&db, &ceremony, &config, &id, "Alice")
            .await
            .unwrap();
        let state = challenge_of(&options);

        let passkey = EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response(&state, "cred-1"),
            Some("phone".to_string()),
            Some("platform".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(passkey.credential_id, "cred-1");
        assert_eq!(passkey.name.as_deref(), Some("phone"));

        let account = AccountService::get_account(&db, &id).await.unwrap();
        assert!(account.biometric_enabled);

        // Consumed: completing again finds no challenge
        let err = EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response(&state, "cred-2"),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ChallengeNotFound));
    }

    #[tokio::test]
    async fn begin_requires_an_existing_account() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let config = Config::default();

        let err = EnrollmentService::begin(&db, &ceremony, &config, "nope", "Ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn complete_without_begin_fails() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let id = account(&db, "b@x.com").await;

        let err = EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response("never-issued", "cred-1"),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ChallengeNotFound));
    }

    #[tokio::test]
    async fn tampered_response_fails_and_binds_nothing() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let config = Config::default();
        let id = account(&db, "c@x.com").await;

        EnrollmentService::begin(&db, &ceremony, &config, &id, "Carol")
            .await
            .unwrap();

        let err = EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response("forged-state", "cred-1"),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM passkeys")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
        let account = AccountService::get_account(&db, &id).await.unwrap();
        assert!(!account.biometric_enabled);
    }

    #[tokio::test]
    async fn beginning_again_supersedes_the_first_challenge() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let config = Config::default();
        let id = account(&db, "d@x.com").await;

        let first = EnrollmentService::begin(&db, &ceremony, &config, &id, "Dana")
            .await
            .unwrap();
        let second = EnrollmentService::begin(&db, &ceremony, &config, &id, "Dana")
            .await
            .unwrap();

        // One live challenge row
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM registration_challenges WHERE account_id = ?")
                .bind(&id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(count.0, 1);

        // The superseded challenge no longer verifies
        let err = EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response(&challenge_of(&first), "cred-1"),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::VerificationFailed(_)));

        EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response(&challenge_of(&second), "cred-1"),
            None,
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn duplicate_credential_ids_are_rejected_globally() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let config = Config::default();
        let first = account(&db, "e@x.com").await;
        let second = account(&db, "f@x.com").await;

        let options = EnrollmentService::begin(&db, &ceremony, &config, &first, "Eve")
            .await
            .unwrap();
        EnrollmentService::complete(
            &db,
            &ceremony,
            &first,
            &enroll_response(&challenge_of(&options), "shared-cred"),
            None,
            None,
        )
        .await
        .unwrap();

        let options = EnrollmentService::begin(&db, &ceremony, &config, &second, "Frank")
            .await
            .unwrap();
        let err = EnrollmentService::complete(
            &db,
            &ceremony,
            &second,
            &enroll_response(&challenge_of(&options), "shared-cred"),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn expired_challenges_count_as_absent() {
        let db = Database::in_memory().await.unwrap();
        let ceremony = FakeCeremony::new();
        let config = Config::default();
        let id = account(&db, "g@x.com").await;

        let options = EnrollmentService::begin(&db, &ceremony, &config, &id, "Gia")
            .await
            .unwrap();

        let past = (Utc::now() - Duration::seconds(1)).to_rfc3339();
        sqlx::query("UPDATE registration_challenges SET expires_at = ? WHERE account_id = ?")
            .bind(&past)
            .bind(&id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = EnrollmentService::complete(
            &db,
            &ceremony,
            &id,
            &enroll_response(&challenge_of(&options), "cred-1"),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::ChallengeNotFound));
    }
}
