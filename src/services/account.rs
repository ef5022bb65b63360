use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Account, AccountRole};

/// Account directory service
pub struct AccountService;

impl AccountService {
    /// Canonical form used for every identity lookup
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Register a new account
    pub async fn create_account(
        db: &Database,
        email: &str,
        password: &str,
        role: AccountRole,
    ) -> Result<Account> {
        let email = Self::normalize_email(email);

        // Validate email
        if !email.contains('@') {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }

        // Validate password
        if password.len() < 6 {
            return Err(AppError::BadRequest(
                "Password must be at least 6 characters".to_string(),
            ));
        }

        // Check if email already exists
        let existing: Option<Account> = sqlx::query_as("SELECT * FROM accounts WHERE email = ?")
            .bind(&email)
            .fetch_optional(db.pool())
            .await?;

        if existing.is_some() {
            return Err(AppError::AlreadyExists("Email already registered".to_string()));
        }

        // Hash password with a fresh per-account salt
        let password_hash = Self::hash_password(password)?;

        let account_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, password_hash, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Self::get_account(db, &account_id).await
    }

    /// Get account by ID
    pub async fn get_account(db: &Database, account_id: &str) -> Result<Account> {
        let account: Account = sqlx::query_as("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

        Ok(account)
    }

    /// Get account by normalized email
    pub async fn get_by_email(db: &Database, email: &str) -> Result<Account> {
        let email = Self::normalize_email(email);
        let account: Option<Account> = sqlx::query_as("SELECT * FROM accounts WHERE email = ?")
            .bind(&email)
            .fetch_optional(db.pool())
            .await?;

        account.ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// Check credentials and return the account
    pub async fn authenticate_password(
        db: &Database,
        email: &str,
        password: &str,
    ) -> Result<Account> {
        let account = Self::get_by_email(db, email).await?;

        if !Self::verify_password(password, &account.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        Ok(account)
    }

    /// Mark the account's email as verified. Idempotent.
    pub async fn mark_verified(db: &Database, account_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected =
            sqlx::query("UPDATE accounts SET verified = 1, updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(account_id)
                .execute(db.pool())
                .await?
                .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    /// Record that the account's profile record exists. Idempotent.
    pub async fn mark_profile_complete(
        db: &Database,
        account_id: &str,
        profile_id: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE accounts SET profile_completed = 1, profile_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(profile_id)
        .bind(&now)
        .bind(account_id)
        .execute(db.pool())
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    /// Replace the stored password hash with a freshly salted one
    pub async fn set_password(db: &Database, account_id: &str, new_password: &str) -> Result<()> {
        if new_password.len() < 6 {
            return Err(AppError::BadRequest(
                "Password must be at least 6 characters".to_string(),
            ));
        }

        let new_hash = Self::hash_password(new_password)?;
        let now = Utc::now().to_rfc3339();
        let affected =
            sqlx::query("UPDATE accounts SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(&new_hash)
                .bind(&now)
                .bind(account_id)
                .execute(db.pool())
                .await?
                .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    /// Change password after verifying the old one
    pub async fn change_password(
        db: &Database,
        account_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let account = Self::get_account(db, account_id).await?;

        if !Self::verify_password(old_password, &account.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        Self::set_password(db, account_id, new_password).await
    }

    /// Write the derived biometric flag. Only the passkey registry calls this,
    /// always inside the transaction that mutated the passkey table.
    pub async fn set_biometric_enabled_tx(
        conn: &mut sqlx::SqliteConnection,
        account_id: &str,
        enabled: bool,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected =
            sqlx::query("UPDATE accounts SET biometric_enabled = ?, updated_at = ? WHERE id = ?")
                .bind(enabled)
                .bind(&now)
                .bind(account_id)
                .execute(&mut *conn)
                .await?
                .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }

    /// Hash password using Argon2
    fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(password_hash)
    }

    /// Verify password against hash
    fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}
