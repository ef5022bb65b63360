use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    Customer,
    Operator,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Customer => "customer",
            AccountRole::Operator => "operator",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "operator" => AccountRole::Operator,
            _ => AccountRole::Customer,
        }
    }
}

/// Account model
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub verified: bool,
    pub profile_completed: bool,
    pub biometric_enabled: bool,
    pub profile_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Account {
    pub fn get_role(&self) -> AccountRole {
        AccountRole::from_str(&self.role)
    }
}

/// Account response (without credential material)
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub role: String,
    pub verified: bool,
    pub profile_completed: bool,
    pub biometric_enabled: bool,
    pub profile_id: Option<String>,
    pub created_at: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            role: account.role,
            verified: account.verified,
            profile_completed: account.profile_completed,
            biometric_enabled: account.biometric_enabled,
            profile_id: account.profile_id,
            created_at: account.created_at,
        }
    }
}

/// Signup request
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Signup response
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub account: AccountResponse,
    pub otp_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_token: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

/// Login response. Three shapes: needs-OTP, needs-profile, fully-authenticated.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub otp_required: bool,
    pub profile_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

/// OTP verification request
#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub code: String,
}

/// OTP resend request
#[derive(Debug, Deserialize)]
pub struct OtpResendRequest {
    pub email: String,
}

/// OTP issuance acknowledgement
#[derive(Debug, Serialize)]
pub struct OtpIssuedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_code: Option<String>,
}

/// Change password request
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Profile completion notification from the profile subsystem
#[derive(Debug, Deserialize)]
pub struct CompleteProfileRequest {
    pub profile_id: String,
}

/// Current authenticated account (extracted from JWT)
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub id: String,
    pub email: String,
    pub role: AccountRole,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub jti: String,
    pub exp: usize, // expiration time
    pub iat: usize, // issued at
}
