use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;
use webauthn_rs::prelude::*;

use crate::config::PasskeyConfig;
use crate::error::{AppError, Result};

/// A credential produced by a verified enrollment ceremony
#[derive(Debug, Clone)]
pub struct EnrolledCredential {
    pub credential_id: String,
    pub credential_json: String,
}

/// Challenge-response ceremony primitives, scoped to the configured
/// relying-party identity. Challenge state and stored credentials cross this
/// boundary as serialized JSON so the storage layer stays agnostic of the
/// underlying library, and tests can swap in a deterministic implementation.
pub trait CredentialCeremony: Send + Sync {
    /// Returns (client options payload, server-side challenge state)
    fn begin_enrollment(
        &self,
        account_id: &str,
        email: &str,
        display_name: &str,
        existing_credentials: &[String],
    ) -> Result<(serde_json::Value, String)>;

    /// Verifies the client response against the stored challenge state
    fn finish_enrollment(
        &self,
        state_json: &str,
        response: &serde_json::Value,
    ) -> Result<EnrolledCredential>;

    /// Returns (client options payload, server-side challenge state)
    fn begin_login(&self, credentials: &[String]) -> Result<(serde_json::Value, String)>;

    /// Verifies the client assertion against the stored challenge state and
    /// credential. Returns updated credential material when the authenticator
    /// reported a counter change.
    fn finish_login(
        &self,
        state_json: &str,
        credential_json: &str,
        response: &serde_json::Value,
    ) -> Result<Option<String>>;
}

/// Production ceremony backed by webauthn-rs
pub struct WebauthnCeremony {
    webauthn: Webauthn,
}

impl WebauthnCeremony {
    pub fn from_config(config: &PasskeyConfig) -> Result<Self> {
        let rp_origin_raw = config.rp_origin.trim();
        let rp_origin = url::Url::parse(rp_origin_raw).or_else(|_| {
            if rp_origin_raw.contains("://") {
                Err(url::ParseError::RelativeUrlWithoutBase)
            } else {
                url::Url::parse(&format!("http://{}", rp_origin_raw))
            }
        });
        let rp_origin = rp_origin.map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid rp_origin: {} (expected like http://localhost:3000)",
                rp_origin_raw
            ))
        })?;
        let builder = WebauthnBuilder::new(&config.rp_id, &rp_origin).map_err(|_| {
            AppError::BadRequest(format!(
                "Invalid passkey config (rp_id={}, rp_origin={})",
                config.rp_id, rp_origin
            ))
        })?;
        let builder = builder.rp_name(&config.rp_name);
        let webauthn = builder
            .build()
            .map_err(|e| AppError::Internal(format!("WebAuthn build error: {:?}", e)))?;
        Ok(Self { webauthn })
    }

    fn parse_stored(credential_json: &str) -> Result<webauthn_rs::prelude::Passkey> {
        serde_json::from_str(credential_json)
            .map_err(|_| AppError::Internal("Deserialize passkey failed".to_string()))
    }
}

impl CredentialCeremony for WebauthnCeremony {
    fn begin_enrollment(
        &self,
        account_id: &str,
        email: &str,
        display_name: &str,
        existing_credentials: &[String],
    ) -> Result<(serde_json::Value, String)> {
        let mut exclude: Vec<CredentialID> = Vec::new();
        for json in existing_credentials {
            let pk = Self::parse_stored(json)?;
            exclude.push(pk.cred_id().clone());
        }
        let exclude = if exclude.is_empty() { None } else { Some(exclude) };

        let uid = Uuid::parse_str(account_id).unwrap_or_else(|_| Uuid::new_v4());
        let (ccr, reg_state) = self
            .webauthn
            .start_passkey_registration(uid, email, display_name, exclude)
            .map_err(|e| AppError::BadRequest(format!("start registration failed: {:?}", e)))?;

        let options = serde_json::to_value(&ccr)
            .map_err(|_| AppError::Internal("Serialize registration options failed".to_string()))?;
        let state_json = serde_json::to_string(&reg_state)
            .map_err(|_| AppError::Internal("Serialize registration state failed".to_string()))?;
        Ok((options, state_json))
    }

    fn finish_enrollment(
        &self,
        state_json: &str,
        response: &serde_json::Value,
    ) -> Result<EnrolledCredential> {
        let reg: RegisterPublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|_| AppError::BadRequest("Invalid ceremony response".to_string()))?;
        let reg_state: PasskeyRegistration = serde_json::from_str(state_json)
            .map_err(|_| AppError::Internal("Deserialize registration state failed".to_string()))?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&reg, &reg_state)
            .map_err(|e| AppError::VerificationFailed(format!("{:?}", e)))?;

        let credential_id = URL_SAFE_NO_PAD.encode(passkey.cred_id());
        let credential_json = serde_json::to_string(&passkey)
            .map_err(|_| AppError::Internal("Serialize passkey failed".to_string()))?;
        Ok(EnrolledCredential {
            credential_id,
            credential_json,
        })
    }

    fn begin_login(&self, credentials: &[String]) -> Result<(serde_json::Value, String)> {
        let mut passkeys: Vec<webauthn_rs::prelude::Passkey> = Vec::new();
        for json in credentials {
            passkeys.push(Self::parse_stored(json)?);
        }
        if passkeys.is_empty() {
            return Err(AppError::BadRequest("No passkeys registered".to_string()));
        }

        let (req, auth_state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| AppError::BadRequest(format!("start authentication failed: {:?}", e)))?;

        let options = serde_json::to_value(&req).map_err(|_| {
            AppError::Internal("Serialize authentication options failed".to_string())
        })?;
        let state_json = serde_json::to_string(&auth_state).map_err(|_| {
            AppError::Internal("Serialize authentication state failed".to_string())
        })?;
        Ok((options, state_json))
    }

    fn finish_login(
        &self,
        state_json: &str,
        credential_json: &str,
        response: &serde_json::Value,
    ) -> Result<Option<String>> {
        let rsp: PublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|_| AppError::BadRequest("Invalid ceremony response".to_string()))?;
        let auth_state: PasskeyAuthentication = serde_json::from_str(state_json).map_err(|_| {
            AppError::Internal("Deserialize authentication state failed".to_string())
        })?;

        let result = self
            .webauthn
            .finish_passkey_authentication(&rsp, &auth_state)
            .map_err(|e| AppError::VerificationFailed(format!("{:?}", e)))?;

        let mut passkey = Self::parse_stored(credential_json)?;
        if passkey.cred_id() != result.cred_id() {
            return Err(AppError::VerificationFailed(
                "asserted credential does not match stored credential".to_string(),
            ));
        }

        // Counter updates must be persisted for clone detection
        if passkey.update_credential(&result) == Some(true) {
            let updated = serde_json::to_string(&passkey)
                .map_err(|_| AppError::Internal("Serialize passkey failed".to_string()))?;
            Ok(Some(updated))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};

    use serde_json::json;

    use super::*;

    /// Deterministic ceremony for tests: the "signature" check is simply that
    /// the response echoes the exact challenge state that was issued.
    #[derive(Default)]
    pub struct FakeCeremony {
        seq: AtomicU64,
    }

    impl FakeCeremony {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl CredentialCeremony for FakeCeremony {
        fn begin_enrollment(
            &self,
            account_id: &str,
            _email: &str,
            _display_name: &str,
            _existing_credentials: &[String],
        ) -> Result<(serde_json::Value, String)> {
            let state = format!("enroll-{}-{}", account_id, self.seq.fetch_add(1, Ordering::SeqCst));
            Ok((json!({ "challenge": state }), state))
        }

        fn finish_enrollment(
            &self,
            state_json: &str,
            response: &serde_json::Value,
        ) -> Result<EnrolledCredential> {
            if response.get("state").and_then(|v| v.as_str()) != Some(state_json) {
                return Err(AppError::VerificationFailed("challenge mismatch".to_string()));
            }
            let credential_id = response
                .get("credential_id")
                .and_then(|v| v.as_str())
                .unwrap_or("fake-credential")
                .to_string();
            let credential_json =
                json!({ "credential_id": credential_id, "counter": 0 }).to_string();
            Ok(EnrolledCredential {
                credential_id,
                credential_json,
            })
        }

        fn begin_login(&self, credentials: &[String]) -> Result<(serde_json::Value, String)> {
            if credentials.is_empty() {
                return Err(AppError::BadRequest("No passkeys registered".to_string()));
            }
            let state = format!("login-{}", self.seq.fetch_add(1, Ordering::SeqCst));
            Ok((json!({ "challenge": state }), state))
        }

        fn finish_login(
            &self,
            state_json: &str,
            credential_json: &str,
            response: &serde_json::Value,
        ) -> Result<Option<String>> {
            if response.get("state").and_then(|v| v.as_str()) != Some(state_json) {
                return Err(AppError::VerificationFailed("challenge mismatch".to_string()));
            }
            let stored: serde_json::Value = serde_json::from_str(credential_json)
                .map_err(|_| AppError::Internal("Deserialize passkey failed".to_string()))?;
            if response.get("id") != stored.get("credential_id") {
                return Err(AppError::VerificationFailed("credential mismatch".to_string()));
            }
            Ok(None)
        }
    }

    /// A well-formed enrollment response for `FakeCeremony`
    pub fn enroll_response(state: &str, credential_id: &str) -> serde_json::Value {
        json!({ "state": state, "credential_id": credential_id, "id": credential_id })
    }

    /// A well-formed login assertion for `FakeCeremony`
    pub fn login_response(state: &str, credential_id: &str) -> serde_json::Value {
        json!({ "state": state, "id": credential_id })
    }
}
