use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::mailer::{self, Mailer};
use crate::models::{OtpChallenge, OtpPurpose};
use crate::services::AccountService;

/// OTP challenge manager. One live code per account, latest wins.
pub struct OtpService;

impl OtpService {
    /// Uniform random 6-digit code
    fn generate_code() -> String {
        OsRng.gen_range(100_000..=999_999).to_string()
    }

    /// Issue a fresh code for the account, replacing any live one, and
    /// dispatch it by email. Issuance is transactional with delivery: if the
    /// send fails the new code is rolled back, so an undeliverable OTP never
    /// blocks re-issuance until TTL expiry.
    ///
    /// The returned code is for internal callers; it reaches API responses
    /// only when `otp.expose_code` is enabled.
    pub async fn issue(
        db: &Database,
        mailer: &dyn Mailer,
        config: &Config,
        account_id: &str,
        purpose: OtpPurpose,
    ) -> Result<String> {
        let account = AccountService::get_account(db, account_id).await?;

        let code = Self::generate_code();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = (now + Duration::seconds(config.otp.ttl_seconds as i64)).to_rfc3339();

        let mut tx = db.pool().begin().await?;

        // Latest wins: single upsert keyed on account_id
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (id, account_id, code, purpose, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                id = excluded.id,
                code = excluded.code,
                purpose = excluded.purpose,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(&id)
        .bind(account_id)
        .bind(&code)
        .bind(purpose.as_str())
        .bind(&expires_at)
        .bind(&now.to_rfc3339())
        .execute(tx.as_mut())
        .await?;

        let message = mailer::otp_message(
            purpose,
            &account.email,
            &code,
            config.otp.ttl_seconds / 60,
        );
        if let Err(e) = mailer.send(&message) {
            tx.rollback().await?;
            return Err(AppError::Email(e.to_string()));
        }

        tx.commit().await?;
        Ok(code)
    }

    /// Validate a submitted code. Single-shot: the stored row is consumed
    /// atomically on match, so a concurrent validator loses the race and
    /// observes a mismatch. The caller marks the account verified afterwards.
    pub async fn validate(db: &Database, account_id: &str, submitted_code: &str) -> Result<()> {
        let otp: Option<OtpChallenge> =
            sqlx::query_as("SELECT * FROM otp_challenges WHERE account_id = ?")
                .bind(account_id)
                .fetch_optional(db.pool())
                .await?;

        let otp = otp.ok_or(AppError::OtpMismatch)?;

        if otp.code != submitted_code {
            return Err(AppError::OtpMismatch);
        }

        let expires_at = chrono::DateTime::parse_from_rfc3339(&otp.expires_at)
            .map_err(|_| AppError::Internal("Invalid OTP expiry format".to_string()))?;
        if expires_at < Utc::now() {
            sqlx::query("DELETE FROM otp_challenges WHERE id = ?")
                .bind(&otp.id)
                .execute(db.pool())
                .await?;
            return Err(AppError::OtpExpired);
        }

        // Consume: check-and-delete in one statement
        let affected = sqlx::query("DELETE FROM otp_challenges WHERE id = ? AND code = ?")
            .bind(&otp.id)
            .bind(submitted_code)
            .execute(db.pool())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::OtpMismatch);
        }

        Ok(())
    }

    /// Garbage-collect expired OTPs and ceremony challenges. Validation
    /// already rejects expired rows on its own; this just keeps the tables
    /// small.
    pub async fn sweep_expired(db: &Database) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut swept = 0;

        for table in ["otp_challenges", "registration_challenges", "login_challenges"] {
            swept += sqlx::query(&format!("DELETE FROM {} WHERE expires_at < ?", table))
                .bind(&now)
                .execute(db.pool())
                .await?
                .rows_affected();
        }

        Ok(swept)
    }

    /// Spawn a background task that sweeps expired rows on a fixed cadence
    pub fn spawn_expiry_sweep(
        db: Database,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match Self::sweep_expired(&db).await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("swept {} expired challenge rows", n),
                    Err(e) => tracing::error!("challenge sweep failed: {e}"),
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mailer::testing::{FailingMailer, RecordingMailer};
    use crate::models::AccountRole;

    async fn account(db: &Database, email: &str) -> String {
        AccountService::create_account(db, email, "secret1", AccountRole::Customer)
            .await
            .unwrap()
            .id
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = OtpService::generate_code();
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[tokio::test]
    async fn reissue_invalidates_the_previous_code() {
        let db = Database::in_memory().await.unwrap();
        let mailer = RecordingMailer::default();
        let config = Config::default();
        let id = account(&db, "a@x.com").await;

        let first = OtpService::issue(&db, &mailer, &config, &id, OtpPurpose::Registration)
            .await
            .unwrap();
        let second = OtpService::issue(&db, &mailer, &config, &id, OtpPurpose::Resend)
            .await
            .unwrap();

        // Exactly one live row, holding the latest code
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM otp_challenges")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);

        if first != second {
            let err = OtpService::validate(&db, &id, &first).await.unwrap_err();
            assert!(matches!(err, AppError::OtpMismatch));
        }
        OtpService::validate(&db, &id, &second).await.unwrap();
    }

    #[tokio::test]
    async fn validation_is_single_shot() {
        let db = Database::in_memory().await.unwrap();
        let mailer = RecordingMailer::default();
        let config = Config::default();
        let id = account(&db, "b@x.com").await;

        let code = OtpService::issue(&db, &mailer, &config, &id, OtpPurpose::Registration)
            .await
            .unwrap();

        OtpService::validate(&db, &id, &code).await.unwrap();
        AccountService::mark_verified(&db, &id).await.unwrap();

        let retry = OtpService::validate(&db, &id, &code).await.unwrap_err();
        assert!(matches!(retry, AppError::OtpMismatch));

        let account = AccountService::get_account(&db, &id).await.unwrap();
        assert!(account.verified);
    }

    #[tokio::test]
    async fn expired_codes_are_rejected_and_deleted() {
        let db = Database::in_memory().await.unwrap();
        let mailer = RecordingMailer::default();
        let config = Config::default();
        let id = account(&db, "c@x.com").await;

        let code = OtpService::issue(&db, &mailer, &config, &id, OtpPurpose::Registration)
            .await
            .unwrap();

        let past = (Utc::now() - Duration::seconds(1)).to_rfc3339();
        sqlx::query("UPDATE otp_challenges SET expires_at = ? WHERE account_id = ?")
            .bind(&past)
            .bind(&id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = OtpService::validate(&db, &id, &code).await.unwrap_err();
        assert!(matches!(err, AppError::OtpExpired));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM otp_challenges")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn delivery_failure_rolls_the_code_back() {
        let db = Database::in_memory().await.unwrap();
        let config = Config::default();
        let id = account(&db, "d@x.com").await;

        let err = OtpService::issue(&db, &FailingMailer, &config, &id, OtpPurpose::Registration)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Email(_)));

        // No live but undeliverable code is left behind
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM otp_challenges")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn concurrent_issues_leave_one_live_row() {
        let db = Database::in_memory().await.unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let config = Arc::new(Config::default());
        let id = account(&db, "e@x.com").await;

        let a = {
            let (db, mailer, config, id) =
                (db.clone(), mailer.clone(), config.clone(), id.clone());
            tokio::spawn(async move {
                OtpService::issue(&db, mailer.as_ref(), &config, &id, OtpPurpose::Registration)
                    .await
            })
        };
        let b = {
            let (db, mailer, config, id) =
                (db.clone(), mailer.clone(), config.clone(), id.clone());
            tokio::spawn(async move {
                OtpService::issue(&db, mailer.as_ref(), &config, &id, OtpPurpose::Registration)
                    .await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM otp_challenges WHERE account_id = ?")
            .bind(&id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn issue_dispatches_the_purpose_template() {
        let db = Database::in_memory().await.unwrap();
        let mailer = RecordingMailer::default();
        let config = Config::default();
        let id = account(&db, "f@x.com").await;

        let code = OtpService::issue(&db, &mailer, &config, &id, OtpPurpose::PasswordReset)
            .await
            .unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "f@x.com");
        assert!(sent[0].subject.contains("Reset"));
        assert!(sent[0].html_body.contains(&code));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let db = Database::in_memory().await.unwrap();
        let mailer = RecordingMailer::default();
        let config = Config::default();
        let live = account(&db, "g@x.com").await;
        let stale = account(&db, "h@x.com").await;

        OtpService::issue(&db, &mailer, &config, &live, OtpPurpose::Registration)
            .await
            .unwrap();
        OtpService::issue(&db, &mailer, &config, &stale, OtpPurpose::Registration)
            .await
            .unwrap();

        let past = (Utc::now() - Duration::seconds(1)).to_rfc3339();
        sqlx::query("UPDATE otp_challenges SET expires_at = ? WHERE account_id = ?")
            .bind(&past)
            .bind(&stale)
            .execute(db.pool())
            .await
            .unwrap();

        let swept = OtpService::sweep_expired(&db).await.unwrap();
        assert_eq!(swept, 1);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM otp_challenges")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
