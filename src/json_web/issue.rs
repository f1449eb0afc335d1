use std::{sync::Arc, time::Duration};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::pkey::PKey;
use serde::Serialize;

use super::{claims::CustomClaims, verify::id_token_issuer, verify::MAX_SUBJECT_LENGTH};
use crate::{
    clock::Clock,
    credentials::Credentials,
    error::{AuthError, AuthResult},
};

/// Audience of Firebase Auth custom tokens.
pub const FIREBASE_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Firebase refuses custom tokens that live longer than an hour.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// The issuer/audience pair a minted token is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerScope {
    pub issuer: String,
    pub audience: String,
}

impl IssuerScope {
    /// Tokens meant to be exchanged with Firebase Auth (`signInWithCustomToken`).
    pub fn custom_token(credentials: &Credentials) -> Self {
        Self {
            issuer: credentials.client_email.clone(),
            audience: FIREBASE_AUDIENCE.to_owned(),
        }
    }

    /// Tokens shaped like ID tokens for `project_id`, which a
    /// [`super::TokenVerifier`] for the same project accepts.
    pub fn id_token(project_id: &str) -> Self {
        Self {
            issuer: id_token_issuer(project_id),
            audience: project_id.to_owned(),
        }
    }
}

#[derive(Serialize)]
struct MintedClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    sub: &'a str,
    iat: u64,
    exp: u64,
    #[serde(flatten)]
    custom: &'a CustomClaims,
}

/// Mints RS256 tokens signed with a service account's private key.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    key_id: Option<String>,
    scope: IssuerScope,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Fails with [`AuthError::Configuration`] if the private key can't be used,
    /// so a bad key stops the app at startup rather than on the first request.
    pub fn new(
        credentials: &Credentials,
        scope: IssuerScope,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        let pem = credentials.private_key.as_bytes();
        // jsonwebtoken only unwraps the PEM here; openssl parses the key itself.
        PKey::private_key_from_pem(pem)
            .map_err(|e| AuthError::Configuration(format!("private key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthError::Configuration(format!("private key: {e}")))?;

        Ok(Self {
            encoding_key,
            key_id: credentials.private_key_id.clone(),
            scope,
            lifetime: DEFAULT_TOKEN_LIFETIME,
            clock,
        })
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn scope(&self) -> &IssuerScope {
        &self.scope
    }

    pub fn issue(&self, subject: &str, claims: &CustomClaims) -> AuthResult<String> {
        let length = subject.chars().count();
        if length == 0 || length > MAX_SUBJECT_LENGTH {
            return Err(AuthError::Signing(format!(
                "subject must be 1 to {MAX_SUBJECT_LENGTH} characters"
            )));
        }
        claims.check_reserved()?;

        let issued_at = self.clock.unix_seconds();
        let expires_at = issued_at
            .checked_add(self.lifetime.as_secs())
            .ok_or_else(|| {
                AuthError::Configuration(format!("token lifetime {:?} is too long", self.lifetime))
            })?;
        let minted = MintedClaims {
            iss: &self.scope.issuer,
            aud: &self.scope.audience,
            sub: subject,
            iat: issued_at,
            exp: expires_at,
            custom: claims,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        encode(&header, &minted, &self.encoding_key).map_err(|e| AuthError::Signing(e.to_string()))
    }
}
