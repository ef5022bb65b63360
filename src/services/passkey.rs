use chrono::Utc;
use uuid::Uuid;

use crate::ceremony::EnrolledCredential;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Passkey, PasskeySummary};
use crate::services::AccountService;

/// Passkey registry. Sole owner of the passkeys table and of the account's
/// derived biometric-enabled flag: the flag is recomputed here after every
/// mutation so it always equals "at least one passkey bound".
pub struct PasskeyService;

impl PasskeyService {
    /// Insert a verified credential and flip the biometric flag, inside the
    /// enrollment transaction.
    pub(crate) async fn register_tx(
        conn: &mut sqlx::SqliteConnection,
        account_id: &str,
        credential: &EnrolledCredential,
        name: Option<String>,
        device_type: Option<String>,
    ) -> Result<Passkey> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO passkeys (id, account_id, credential_id, credential_json, name, device_type, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&id)
        .bind(account_id)
        .bind(&credential.credential_id)
        .bind(&credential.credential_json)
        .bind(name.as_deref())
        .bind(device_type.as_deref())
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        AccountService::set_biometric_enabled_tx(conn, account_id, true).await?;

        Ok(Passkey {
            id,
            account_id: account_id.to_string(),
            credential_id: credential.credential_id.clone(),
            credential_json: credential.credential_json.clone(),
            name,
            device_type,
            created_at: now,
            last_used_at: None,
        })
    }

    /// List the account's passkeys, newest first, credential material omitted
    pub async fn list(db: &Database, account_id: &str) -> Result<Vec<PasskeySummary>> {
        let keys: Vec<Passkey> = sqlx::query_as(
            "SELECT * FROM passkeys WHERE account_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(account_id)
        .fetch_all(db.pool())
        .await?;

        Ok(keys.into_iter().map(PasskeySummary::from).collect())
    }

    /// Rename a passkey owned by the account
    pub async fn rename(
        db: &Database,
        account_id: &str,
        passkey_id: &str,
        new_name: &str,
    ) -> Result<()> {
        let affected = sqlx::query("UPDATE passkeys SET name = ? WHERE id = ? AND account_id = ?")
            .bind(new_name)
            .bind(passkey_id)
            .bind(account_id)
            .execute(db.pool())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Passkey not found".to_string()));
        }
        Ok(())
    }

    /// Delete a passkey owned by the account. Clears the biometric flag when
    /// the last one goes; this is the only path that clears it.
    pub async fn remove(db: &Database, account_id: &str, passkey_id: &str) -> Result<()> {
        let mut tx = db.pool().begin().await?;

        let affected = sqlx::query("DELETE FROM passkeys WHERE id = ? AND account_id = ?")
            .bind(passkey_id)
            .bind(account_id)
            .execute(tx.as_mut())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Passkey not found".to_string()));
        }

        let remaining: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM passkeys WHERE account_id = ?")
                .bind(account_id)
                .fetch_one(tx.as_mut())
                .await?;

        if remaining.0 == 0 {
            AccountService::set_biometric_enabled_tx(tx.as_mut(), account_id, false).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
