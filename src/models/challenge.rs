use sqlx::FromRow;

/// What an OTP was issued for; selects the email template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Registration,
    Resend,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Registration => "registration",
            OtpPurpose::Resend => "resend",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

/// One live OTP per account, replaced on re-issue
#[derive(Debug, Clone, FromRow)]
pub struct OtpChallenge {
    pub id: String,
    pub account_id: String,
    pub code: String,
    pub purpose: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Pending passkey enrollment ceremony state
#[derive(Debug, Clone, FromRow)]
pub struct RegistrationChallenge {
    pub id: String,
    pub account_id: String,
    pub state_json: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Pending passkey authentication ceremony state
#[derive(Debug, Clone, FromRow)]
pub struct LoginChallenge {
    pub id: String,
    pub account_id: String,
    pub state_json: String,
    pub expires_at: String,
    pub created_at: String,
}
