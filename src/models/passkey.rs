use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Passkey {
    pub id: String,
    pub account_id: String,
    pub credential_id: String,
    pub credential_json: String,
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

/// Passkey listing entry, credential material omitted
#[derive(Debug, Clone, Serialize)]
pub struct PasskeySummary {
    pub id: String,
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

impl From<Passkey> for PasskeySummary {
    fn from(passkey: Passkey) -> Self {
        Self {
            id: passkey.id,
            name: passkey.name,
            device_type: passkey.device_type,
            created_at: passkey.created_at,
            last_used_at: passkey.last_used_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BeginEnrollRequest {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BeginEnrollResponse {
    pub options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FinishEnrollRequest {
    pub credential: serde_json::Value,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FinishEnrollResponse {
    pub passkey_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BeginBiometricLoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct BeginBiometricLoginResponse {
    pub options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct FinishBiometricLoginRequest {
    pub email: String,
    pub credential: serde_json::Value,
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenamePasskeyRequest {
    pub name: String,
}
