pub mod auth;
pub mod passkey;
