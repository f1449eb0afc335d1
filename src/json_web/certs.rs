use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, SystemTime},
};

use jsonwebtoken::DecodingKey;
use openssl::x509::X509;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use super::transport::HttpTransport;
use crate::{
    clock::Clock,
    error::{AuthError, AuthResult},
};

/// Google's published signing certificates for Firebase ID tokens.
pub const CLIENT_CERT_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Used when the response carries no usable `Cache-Control: max-age`.
pub const DEFAULT_CERTS_CACHE_TIME: Duration = Duration::from_secs(60 * 60);

/// Oldest a certificate set may get while refreshes keep failing.
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(60 * 60 * 24);

/// A parsed signing certificate. The public key is converted once, up front.
#[derive(Clone)]
pub struct Certificate {
    x509: X509,
    decoding_key: DecodingKey,
}

impl Certificate {
    pub fn from_pem(pem: &[u8]) -> Result<Self, String> {
        let x509 = X509::from_pem(pem).map_err(|e| e.to_string())?;
        let public_key = x509
            .public_key()
            .and_then(|key| key.public_key_to_pem())
            .map_err(|e| e.to_string())?;
        let decoding_key = DecodingKey::from_rsa_pem(&public_key).map_err(|e| e.to_string())?;

        Ok(Self { x509, decoding_key })
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", self.x509.subject_name())
            .finish_non_exhaustive()
    }
}

/// One downloaded certificate document. Replaced whole, never edited.
struct CertificateSet {
    certs: HashMap<String, Arc<Certificate>>,
    fetched_at: SystemTime,
    expires_at: SystemTime,
}

/// Time-bounded cache of the identity provider's signing certificates.
///
/// Lookups inside the cache window only take a read lock. Once the window has
/// passed, the caller downloads a fresh document *before* taking the write
/// lock, so a slow provider never blocks readers of a still-valid set.
/// Concurrent callers that all see an expired set each fetch; fetches are
/// idempotent.
pub struct CertificateStore {
    url: String,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    max_staleness: Duration,
    state: RwLock<Option<Arc<CertificateSet>>>,
}

impl CertificateStore {
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            url: url.into(),
            transport,
            clock,
            max_staleness: DEFAULT_MAX_STALENESS,
            state: RwLock::new(None),
        }
    }

    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = max_staleness;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Looks up the certificate for `kid`, refreshing the cache first if it
    /// has expired.
    ///
    /// An unknown `kid` is [`AuthError::KeyNotFound`]; rotated keys end up
    /// here routinely.
    pub async fn get(&self, kid: &str) -> AuthResult<Arc<Certificate>> {
        let set = self.current().await?;
        set.certs
            .get(kid)
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(kid.to_owned()))
    }

    /// Downloads the certificate document regardless of the cache window.
    pub async fn refresh(&self) -> AuthResult<()> {
        let set = Arc::new(self.download().await?);
        *self.state.write().await = Some(set);
        Ok(())
    }

    /// When the cached set stops being served without a refresh, if one is loaded.
    pub async fn expires_at(&self) -> Option<SystemTime> {
        self.state.read().await.as_ref().map(|set| set.expires_at)
    }

    async fn current(&self) -> AuthResult<Arc<CertificateSet>> {
        let now = self.clock.now();
        if let Some(set) = self.state.read().await.as_ref() {
            if now < set.expires_at {
                return Ok(Arc::clone(set));
            }
        }

        match self.download().await {
            Ok(set) => {
                let set = Arc::new(set);
                *self.state.write().await = Some(Arc::clone(&set));
                Ok(set)
            }
            Err(error) => {
                let state = self.state.read().await;
                match state.as_ref() {
                    Some(stale) if self.within_staleness(stale, now) => {
                        tracing::warn!(
                            "Certificate refresh from {} failed, serving cached set: {}",
                            self.url,
                            error
                        );
                        Ok(Arc::clone(stale))
                    }
                    _ => Err(error),
                }
            }
        }
    }

    fn within_staleness(&self, set: &CertificateSet, now: SystemTime) -> bool {
        set.fetched_at
            .checked_add(self.max_staleness)
            .map_or(true, |limit| now < limit)
    }

    async fn download(&self) -> AuthResult<CertificateSet> {
        tracing::debug!("Fetching signing certificates from {}", self.url);
        let response = self.transport.get(&self.url).await?;
        if response.status != StatusCode::OK {
            return Err(AuthError::FetchFailure(format!(
                "download {} failed: {}",
                self.url, response.status
            )));
        }

        let certs = parse_certificates(&response.body)?;
        let fetched_at = self.clock.now();
        let expires_at = fetched_at
            .checked_add(cache_time(response.cache_control.as_deref()))
            .unwrap_or(fetched_at + DEFAULT_CERTS_CACHE_TIME);
        tracing::debug!("Loaded {} signing certificates", certs.len());

        Ok(CertificateSet {
            certs,
            fetched_at,
            expires_at,
        })
    }
}

/// Parses a document of the form `{"kid": "-----BEGIN CERTIFICATE-----..."}`.
///
/// A single bad certificate rejects the whole document.
fn parse_certificates(body: &[u8]) -> AuthResult<HashMap<String, Arc<Certificate>>> {
    let document = serde_json::from_slice::<HashMap<String, String>>(body)
        .map_err(|e| AuthError::FetchFailure(format!("malformed certificate document: {e}")))?;

    document
        .into_iter()
        .map(|(kid, pem)| {
            let certificate = Certificate::from_pem(pem.as_bytes()).map_err(|e| {
                AuthError::FetchFailure(format!("certificate {kid} could not be parsed: {e}"))
            })?;
            Ok((kid, Arc::new(certificate)))
        })
        .collect()
}

/// Reads `max-age` out of a `Cache-Control` header value.
fn cache_time(cache_control: Option<&str>) -> Duration {
    cache_control
        .into_iter()
        .flat_map(|value| value.split(','))
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|seconds| seconds.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_CERTS_CACHE_TIME)
}
