use axum::{extract::State, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{
    AccountResponse, BeginBiometricLoginRequest, BeginBiometricLoginResponse, BeginEnrollRequest,
    BeginEnrollResponse, CurrentAccount, FinishBiometricLoginRequest, FinishEnrollRequest,
    FinishEnrollResponse, LoginResponse, PasskeySummary, RenamePasskeyRequest,
};
use crate::services::{
    AccountService, BiometricLoginService, EnrollmentService, PasskeyService, TokenService,
};
use crate::AppState;

/// Start a passkey enrollment ceremony for the authenticated account
/// POST /api/v1/auth/passkey/enroll/begin
pub async fn begin_enroll(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<BeginEnrollRequest>,
) -> Result<Json<ApiResponse<BeginEnrollResponse>>> {
    let display_name = req.display_name.unwrap_or_else(|| current.email.clone());

    let options = EnrollmentService::begin(
        &state.db,
        state.ceremony.as_ref(),
        &state.config,
        &current.id,
        &display_name,
    )
    .await?;

    Ok(Json(ApiResponse::success(BeginEnrollResponse { options })))
}

/// Complete the enrollment ceremony and bind the new passkey
/// POST /api/v1/auth/passkey/enroll/finish
pub async fn finish_enroll(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<FinishEnrollRequest>,
) -> Result<Json<ApiResponse<FinishEnrollResponse>>> {
    let passkey = EnrollmentService::complete(
        &state.db,
        state.ceremony.as_ref(),
        &current.id,
        &req.credential,
        req.name,
        req.device_type,
    )
    .await?;

    Ok(Json(ApiResponse::success(FinishEnrollResponse {
        passkey_id: passkey.id,
    })))
}

/// Start a passkey login ceremony
/// POST /api/v1/auth/passkey/login/begin
pub async fn begin_login(
    State(state): State<AppState>,
    Json(req): Json<BeginBiometricLoginRequest>,
) -> Result<Json<ApiResponse<BeginBiometricLoginResponse>>> {
    let account = AccountService::get_by_email(&state.db, &req.email).await?;

    let options = BiometricLoginService::begin(
        &state.db,
        state.ceremony.as_ref(),
        &state.config,
        &account.id,
    )
    .await?;

    Ok(Json(ApiResponse::success(BeginBiometricLoginResponse {
        options,
    })))
}

/// Complete the passkey login ceremony and issue a session token
/// POST /api/v1/auth/passkey/login/finish
pub async fn finish_login(
    State(state): State<AppState>,
    Json(req): Json<FinishBiometricLoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let account = AccountService::get_by_email(&state.db, &req.email).await?;

    let account = BiometricLoginService::complete(
        &state.db,
        state.ceremony.as_ref(),
        &account.id,
        &req.credential,
        req.device_token.as_deref(),
        req.device_type.as_deref(),
    )
    .await?;

    let access_token = TokenService::issue(&state.config, &account)?;

    Ok(Json(ApiResponse::success(LoginResponse {
        otp_required: false,
        profile_required: !account.profile_completed,
        access_token: Some(access_token),
        token_type: "Bearer".to_string(),
        expires_in: TokenService::expires_in(&state.config),
        account: Some(AccountResponse::from(account)),
        debug_code: None,
    })))
}

/// List the account's passkeys
/// GET /api/v1/auth/passkeys
pub async fn list_passkeys(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<Vec<PasskeySummary>>>> {
    let keys = PasskeyService::list(&state.db, &current.id).await?;
    Ok(Json(ApiResponse::success(keys)))
}

/// Rename a passkey
/// PATCH /api/v1/auth/passkeys/:id
pub async fn rename_passkey(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    axum::extract::Path(passkey_id): axum::extract::Path<String>,
    Json(req): Json<RenamePasskeyRequest>,
) -> Result<Json<ApiResponse<()>>> {
    PasskeyService::rename(&state.db, &current.id, &passkey_id, &req.name).await?;
    Ok(Json(ApiResponse::<()>::success_message(
        "Passkey renamed successfully",
    )))
}

/// Delete a passkey
/// DELETE /api/v1/auth/passkeys/:id
pub async fn delete_passkey(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    axum::extract::Path(passkey_id): axum::extract::Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    PasskeyService::remove(&state.db, &current.id, &passkey_id).await?;
    Ok(Json(ApiResponse::<()>::success_message(
        "Passkey deleted successfully",
    )))
}
