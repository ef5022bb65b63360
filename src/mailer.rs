use crate::models::OtpPurpose;

/// A rendered message ready for delivery
#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction. OTP issuance treats a send failure as fatal
/// and rolls the issued code back, so implementations must only return `Ok`
/// once the message has been handed off.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Local dev sender that logs the message instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Render the OTP email for a given purpose
pub fn otp_message(purpose: OtpPurpose, to: &str, code: &str, ttl_minutes: u64) -> EmailMessage {
    let (subject, lead) = match purpose {
        OtpPurpose::Registration => (
            "Verify your Bookline account",
            "Welcome to Bookline! Use this code to verify your email address:",
        ),
        OtpPurpose::Resend => (
            "Your new Bookline verification code",
            "Here is your new verification code:",
        ),
        OtpPurpose::PasswordReset => (
            "Reset your Bookline password",
            "Use this code to reset your password:",
        ),
    };

    let html_body = format!(
        "<p>{}</p><p style=\"font-size:24px;letter-spacing:4px\"><strong>{}</strong></p>\
         <p>The code expires in {} minutes. If you did not request it, you can ignore this email.</p>",
        lead, code, ttl_minutes
    );

    EmailMessage {
        to: to.to_string(),
        subject: subject.to_string(),
        html_body,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures sent messages for assertions
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<EmailMessage>>,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Always fails, for delivery-rollback tests
    pub struct FailingMailer;

    impl Mailer for FailingMailer {
        fn send(&self, _message: &EmailMessage) -> anyhow::Result<()> {
            anyhow::bail!("smtp unavailable")
        }
    }
}
