use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::models::{AccountRole, CurrentAccount};
use crate::services::TokenService;
use crate::AppState;

/// Authentication middleware
/// Extracts and validates JWT from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Get Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return Err(AppError::Unauthorized(
                "Missing or invalid Authorization header".to_string(),
            ));
        }
    };

    // Validate token
    let claims = TokenService::validate(token, &state.config)?;

    // The account must still exist
    let (db_email, db_role): (String, String) =
        sqlx::query_as("SELECT email, role FROM accounts WHERE id = ?")
            .bind(&claims.sub)
            .fetch_one(state.db.pool())
            .await
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

    let current_account = CurrentAccount {
        id: claims.sub,
        email: db_email,
        role: AccountRole::from_str(&db_role),
    };

    // Insert current account into request extensions
    request.extensions_mut().insert(current_account);

    Ok(next.run(request).await)
}
