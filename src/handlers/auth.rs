use axum::{extract::State, Extension, Json};

use crate::error::{ApiResponse, Result};
use crate::models::{
    AccountResponse, AccountRole, AuthMethod, ChangePasswordRequest, CompleteProfileRequest,
    CurrentAccount, LoginRequest, LoginResponse, OtpIssuedResponse, OtpPurpose, OtpResendRequest,
    OtpVerifyRequest, SignupRequest, SignupResponse,
};
use crate::services::{AccountService, DeviceService, OtpService, TokenService};
use crate::AppState;

fn debug_code(state: &AppState, code: String) -> Option<String> {
    // Development convenience only; the code always goes out by email
    if state.config.otp.expose_code {
        Some(code)
    } else {
        None
    }
}

/// Register a new account
/// POST /api/v1/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<ApiResponse<SignupResponse>>> {
    let role = req
        .role
        .as_deref()
        .map(AccountRole::from_str)
        .unwrap_or(AccountRole::Customer);

    let account =
        AccountService::create_account(&state.db, &req.email, &req.password, role).await?;

    let code = OtpService::issue(
        &state.db,
        state.mailer.as_ref(),
        &state.config,
        &account.id,
        OtpPurpose::Registration,
    )
    .await?;

    Ok(Json(ApiResponse::success(SignupResponse {
        account: AccountResponse::from(account),
        otp_required: true,
        debug_code: debug_code(&state, code),
    })))
}

/// Password login
/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let account =
        AccountService::authenticate_password(&state.db, &req.email, &req.password).await?;

    // Unverified accounts must confirm an OTP before a token is issued
    if !account.verified {
        let code = OtpService::issue(
            &state.db,
            state.mailer.as_ref(),
            &state.config,
            &account.id,
            OtpPurpose::Registration,
        )
        .await?;

        return Ok(Json(ApiResponse::success(LoginResponse {
            otp_required: true,
            profile_required: false,
            access_token: None,
            token_type: "Bearer".to_string(),
            expires_in: 0,
            account: None,
            debug_code: debug_code(&state, code),
        })));
    }

    if let Some(token) = req.device_token.as_deref() {
        if let Err(e) = DeviceService::record_login(
            &state.db,
            token,
            &account.id,
            AuthMethod::Password,
            req.device_type.as_deref(),
        )
        .await
        {
            tracing::warn!("device binding failed: {e}");
        }
    }

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

/// Validate an OTP and mark the account verified
/// POST /api/v1/auth/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<OtpVerifyRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let account = AccountService::get_by_email(&state.db, &req.email).await?;

    OtpService::validate(&state.db, &account.id, &req.code).await?;
    AccountService::mark_verified(&state.db, &account.id).await?;

    let account = AccountService::get_account(&state.db, &account.id).await?;
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

/// Issue a fresh OTP, invalidating any previous one
/// POST /api/v1/auth/otp/resend
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(req): Json<OtpResendRequest>,
) -> Result<Json<ApiResponse<OtpIssuedResponse>>> {
    let account = AccountService::get_by_email(&state.db, &req.email).await?;

    let code = OtpService::issue(
        &state.db,
        state.mailer.as_ref(),
        &state.config,
        &account.id,
        OtpPurpose::Resend,
    )
    .await?;

    Ok(Json(ApiResponse::success(OtpIssuedResponse {
        debug_code: debug_code(&state, code),
    })))
}

/// Current account
/// GET /api/v1/account/me
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<AccountResponse>>> {
    let account = AccountService::get_account(&state.db, &current.id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

/// Change password
/// PUT /api/v1/account/password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    AccountService::change_password(&state.db, &current.id, &req.old_password, &req.new_password)
        .await?;
    Ok(Json(ApiResponse::<()>::success_message(
        "Password changed successfully",
    )))
}

/// Profile subsystem callback: the account's profile record now exists
/// PUT /api/v1/account/profile
pub async fn complete_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Json(req): Json<CompleteProfileRequest>,
) -> Result<Json<ApiResponse<AccountResponse>>> {
    AccountService::mark_profile_complete(&state.db, &current.id, &req.profile_id).await?;
    let account = AccountService::get_account(&state.db, &current.id).await?;
    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}
