use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::RwLock;
use url::Url;

use crate::{
    clock::{Clock, SystemClock},
    credentials::Credentials,
    error::{AuthError, AuthResult},
    json_web::{
        CertificateStore, CustomClaims, HttpTransport, IssuerScope, ReqwestTransport, TokenIssuer,
        TokenVerifier, VerifiedToken, CLIENT_CERT_URL, DEFAULT_MAX_STALENESS,
        DEFAULT_TOKEN_LIFETIME,
    },
};

pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";
pub const DEFAULT_CREDENTIALS_PATH: &str = "firebase-credentials.json";

/// Settings for one application instance. Everything is checked when the
/// [`App`] is built.
pub struct AppConfig {
    name: String,
    credentials: Option<Credentials>,
    credentials_path: PathBuf,
    cert_url: String,
    http_timeout: Option<Duration>,
    max_staleness: Duration,
    issuer_scope: Option<IssuerScope>,
    token_lifetime: Duration,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Arc<dyn Clock>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_APP_NAME.to_owned(),
            credentials: None,
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            cert_url: CLIENT_CERT_URL.to_owned(),
            http_timeout: None,
            max_staleness: DEFAULT_MAX_STALENESS,
            issuer_scope: None,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            transport: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = normalize_name(name);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Where to read credentials from when none were given directly.
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    pub fn with_cert_url(mut self, url: impl Into<String>) -> Self {
        self.cert_url = url.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness;
        self
    }

    /// Defaults to [`IssuerScope::custom_token`] for the app's credentials.
    pub fn with_issuer_scope(mut self, scope: IssuerScope) -> Self {
        self.issuer_scope = Some(scope);
        self
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Replaces the reqwest client used to download certificates.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Verification and minting for one set of credentials.
pub struct Auth {
    verifier: TokenVerifier,
    issuer: TokenIssuer,
}

impl Auth {
    pub fn new(verifier: TokenVerifier, issuer: TokenIssuer) -> Self {
        Self { verifier, issuer }
    }

    pub async fn verify_id_token(&self, token: &str) -> AuthResult<VerifiedToken> {
        self.verifier.verify(token).await
    }

    pub fn create_custom_token(&self, uid: &str, claims: &CustomClaims) -> AuthResult<String> {
        self.issuer.issue(uid, claims)
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

pub struct App {
    name: String,
    credentials: Credentials,
    auth: Arc<Auth>,
}

impl App {
    pub fn new(config: AppConfig) -> AuthResult<Self> {
        let credentials = match config.credentials {
            Some(credentials) => credentials,
            None => Credentials::from_file(&config.credentials_path)?,
        };

        Url::parse(&config.cert_url).map_err(|e| {
            AuthError::Configuration(format!("certificate url {}: {e}", config.cert_url))
        })?;

        let transport = match config.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_timeout(config.http_timeout)?),
        };
        let certs = Arc::new(
            CertificateStore::new(config.cert_url, transport, config.clock.clone())
                .with_max_staleness(config.max_staleness),
        );

        let scope = config
            .issuer_scope
            .unwrap_or_else(|| IssuerScope::custom_token(&credentials));
        let issuer = TokenIssuer::new(&credentials, scope, config.clock.clone())?
            .with_lifetime(config.token_lifetime);
        let verifier = TokenVerifier::new(credentials.project_id.clone(), certs, config.clock);

        tracing::info!(
            "Initialized app {} for project {}",
            config.name,
            credentials.project_id
        );

        Ok(Self {
            name: config.name,
            credentials,
            auth: Arc::new(Auth::new(verifier, issuer)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn auth(&self) -> Arc<Auth> {
        Arc::clone(&self.auth)
    }
}

/// Named application instances living side by side in one process.
#[derive(Default)]
pub struct AppRegistry {
    apps: RwLock<HashMap<String, Arc<App>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an app from `config` and registers it under the config's name.
    pub async fn initialize(&self, config: AppConfig) -> AuthResult<Arc<App>> {
        if self.apps.read().await.contains_key(&config.name) {
            return Err(already_exists(&config.name));
        }

        let app = Arc::new(App::new(config)?);

        let mut apps = self.apps.write().await;
        if apps.contains_key(app.name()) {
            return Err(already_exists(app.name()));
        }
        apps.insert(app.name().to_owned(), Arc::clone(&app));
        Ok(app)
    }

    /// An empty name looks up the default app.
    pub async fn get(&self, name: &str) -> AuthResult<Arc<App>> {
        let name = normalize_name(name);
        self.apps
            .read()
            .await
            .get(&name)
            .cloned()
            .ok_or_else(|| AuthError::Configuration(format!("app {name} not yet initialized")))
    }
}

fn already_exists(name: &str) -> AuthError {
    AuthError::Configuration(format!("app {name} already exists"))
}

fn normalize_name(name: &str) -> String {
    match name.trim() {
        "" => DEFAULT_APP_NAME.to_owned(),
        name => name.to_owned(),
    }
}
