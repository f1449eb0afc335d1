use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::{
    app::{AppConfig, DEFAULT_CREDENTIALS_PATH},
    error::{AuthError, AuthResult},
    services::ServerOptions,
};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Settings for the demo server, read from the process environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub credentials_path: PathBuf,
    pub cert_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub http_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`ServerConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AuthResult<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bind_address = var("BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_owned())
            .parse::<SocketAddr>()
            .map_err(|e| AuthError::Configuration(format!("BIND_ADDRESS: {e}")))?;

        let credentials_path = var("FIREBASE_CREDENTIALS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH));

        let allowed_origins = match var("ALLOWED_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_owned)
                .collect(),
            None => vec!["*".to_owned()],
        };

        let http_timeout = var("HTTP_TIMEOUT_SECS")
            .map(|secs| {
                secs.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| AuthError::Configuration(format!("HTTP_TIMEOUT_SECS: {e}")))
            })
            .transpose()?;

        Ok(Self {
            bind_address,
            credentials_path,
            cert_url: var("FIREBASE_CERTS_URL"),
            allowed_origins,
            http_timeout,
        })
    }

    pub fn app_config(&self) -> AppConfig {
        let mut config = AppConfig::new().with_credentials_path(self.credentials_path.clone());
        if let Some(url) = &self.cert_url {
            config = config.with_cert_url(url.clone());
        }
        if let Some(timeout) = self.http_timeout {
            config = config.with_http_timeout(timeout);
        }
        config
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions::default().with_allowed_origins(self.allowed_origins.clone())
    }
}
