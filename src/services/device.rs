use chrono::Utc;

use crate::db::Database;
use crate::error::Result;
use crate::models::AuthMethod;

/// Best-effort device bindings. A device token maps to the most recent
/// account that authenticated from it; informational only, so callers log
/// failures instead of failing the login.
pub struct DeviceService;

impl DeviceService {
    pub async fn record_login(
        db: &Database,
        device_token: &str,
        account_id: &str,
        method: AuthMethod,
        device_type: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO devices (token, account_id, last_method, device_type, last_login_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(token) DO UPDATE SET
                account_id = excluded.account_id,
                last_method = excluded.last_method,
                device_type = excluded.device_type,
                last_login_at = excluded.last_login_at
            "#,
        )
        .bind(device_token)
        .bind(account_id)
        .bind(method.as_str())
        .bind(device_type)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountRole, Device};
    use crate::services::AccountService;

    #[tokio::test]
    async fn rebinding_keeps_the_latest_account_and_method() {
        let db = Database::in_memory().await.unwrap();
        let first = AccountService::create_account(&db, "a@x.com", "secret1", AccountRole::Customer)
            .await
            .unwrap();
        let second =
            AccountService::create_account(&db, "b@x.com", "secret1", AccountRole::Customer)
                .await
                .unwrap();

        DeviceService::record_login(&db, "device-1", &first.id, AuthMethod::Password, None)
            .await
            .unwrap();
        DeviceService::record_login(
            &db,
            "device-1",
            &second.id,
            AuthMethod::Biometric,
            Some("ios"),
        )
        .await
        .unwrap();

        let device: Device = sqlx::query_as("SELECT * FROM devices WHERE token = ?")
            .bind("device-1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(device.account_id, second.id);
        assert_eq!(device.last_method, "biometric");
        assert_eq!(device.device_type.as_deref(), Some("ios"));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}
