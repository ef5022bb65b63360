use sqlx::FromRow;

/// How a device last authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Password,
    Biometric,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Password => "password",
            AuthMethod::Biometric => "biometric",
        }
    }
}

/// Best-effort device binding; informational only
#[derive(Debug, Clone, FromRow)]
pub struct Device {
    pub token: String,
    pub account_id: String,
    pub last_method: String,
    pub device_type: Option<String>,
    pub last_login_at: String,
}
