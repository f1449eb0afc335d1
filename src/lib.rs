pub mod app;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod json_web;
pub mod middleware;
pub mod services;

#[cfg(test)]
mod test_support;

pub use app::{App, AppConfig, AppRegistry, Auth};
pub use credentials::Credentials;
pub use error::{AuthError, AuthResult};
pub use json_web::{CustomClaims, VerifiedToken};
