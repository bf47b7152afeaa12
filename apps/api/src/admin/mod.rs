// Admin console: cookie sessions, operator accounts and TOTP second factor.

pub mod auth;
pub mod handlers;
pub mod totp;
pub mod users;
