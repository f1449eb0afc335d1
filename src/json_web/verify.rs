use std::{sync::Arc, time::Duration};

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::{Map, Value};

use super::{certs::CertificateStore, claims::IdTokenClaims};
use crate::{
    clock::Clock,
    error::{AuthError, AuthResult, ClaimKind},
};

/// How far past `exp` a token is still accepted, to absorb clock drift
/// between the issuer and us.
pub const ACCEPTABLE_EXP_SKEW: Duration = Duration::from_secs(300);

pub const MAX_SUBJECT_LENGTH: usize = 128;

/// The issuer Firebase puts in ID tokens for `project_id`.
pub fn id_token_issuer(project_id: &str) -> String {
    format!("https://securetoken.google.com/{project_id}")
}

/// A token whose signature and claims have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    claims: IdTokenClaims,
    key_id: String,
}

impl VerifiedToken {
    pub(crate) fn new(claims: IdTokenClaims, key_id: String) -> Self {
        Self { claims, key_id }
    }

    pub fn claims(&self) -> &IdTokenClaims {
        &self.claims
    }

    /// Key id of the certificate the signature was checked against.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn uid(&self) -> &str {
        &self.claims.sub
    }

    pub fn issuer(&self) -> &str {
        &self.claims.iss
    }

    pub fn audience(&self) -> &str {
        &self.claims.aud
    }

    pub fn expires_at(&self) -> u64 {
        self.claims.exp
    }

    pub fn issued_at(&self) -> Option<u64> {
        self.claims.iat
    }

    pub fn name(&self) -> Option<&str> {
        self.claims.name.as_deref()
    }

    pub fn picture(&self) -> Option<&str> {
        self.claims.picture.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    pub fn email_verified(&self) -> Option<bool> {
        self.claims.email_verified
    }

    pub fn roles(&self) -> Option<Vec<&str>> {
        self.claims.roles()
    }

    /// Any claim not modeled above, e.g. custom claims.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.extra.get(name)
    }

    pub fn into_claims(self) -> IdTokenClaims {
        self.claims
    }
}

/// Verifies Firebase ID tokens for a single project.
pub struct TokenVerifier {
    project_id: String,
    issuer: String,
    certs: Arc<CertificateStore>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(
        project_id: impl Into<String>,
        certs: Arc<CertificateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let project_id = project_id.into();
        Self {
            issuer: id_token_issuer(&project_id),
            project_id,
            certs,
            clock,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn certificates(&self) -> &Arc<CertificateStore> {
        &self.certs
    }

    /// Checks the signature and claims of a compact serialized token.
    ///
    /// The key id is read from the header before the signature is known to be
    /// good; the header is covered by the signature that is checked next.
    pub async fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        let header =
            decode_header(token).map_err(|e| AuthError::MalformedCredential(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }
        let key_id = header.kid.ok_or(AuthError::MissingKeyId)?;

        let certificate = self.certs.get(&key_id).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Expiry is checked below against our own clock.
        validation.validate_exp = false;
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        // Decoded loosely so a missing claim is reported by name rather than
        // as a deserialization failure.
        let data = decode::<Map<String, Value>>(token, certificate.decoding_key(), &validation)
            .map_err(AuthError::from_jwt)?;
        let claims = self.typed_claims(data.claims)?;

        self.validate_times(&claims)?;
        validate_subject(&claims.sub)?;

        Ok(VerifiedToken::new(claims, key_id))
    }

    fn typed_claims(&self, mut claims: Map<String, Value>) -> AuthResult<IdTokenClaims> {
        for (name, present) in [
            ("exp", claims.get("exp").is_some_and(Value::is_u64)),
            ("iss", claims.get("iss").is_some_and(Value::is_string)),
            ("aud", claims.get("aud").is_some_and(|aud| aud.is_string() || aud.is_array())),
            ("sub", claims.get("sub").is_some_and(Value::is_string)),
        ] {
            if !present {
                return Err(AuthError::ClaimInvalid(ClaimKind::from_name(name)));
            }
        }

        // An audience list has already been checked to contain the project.
        if claims.get("aud").is_some_and(Value::is_array) {
            claims.insert("aud".to_owned(), Value::from(self.project_id.as_str()));
        }

        serde_json::from_value(Value::Object(claims))
            .map_err(|e| AuthError::MalformedCredential(e.to_string()))
    }

    fn validate_times(&self, claims: &IdTokenClaims) -> AuthResult<()> {
        let now = self.clock.unix_seconds();
        let skew = ACCEPTABLE_EXP_SKEW.as_secs();

        if claims.exp.saturating_add(skew) < now {
            return Err(AuthError::ClaimInvalid(ClaimKind::Expiry));
        }
        if claims.iat.is_some_and(|iat| iat > now.saturating_add(skew)) {
            return Err(AuthError::ClaimInvalid(ClaimKind::Other("iat".into())));
        }
        Ok(())
    }
}

fn validate_subject(subject: &str) -> AuthResult<()> {
    let length = subject.chars().count();
    if length == 0 || length > MAX_SUBJECT_LENGTH {
        return Err(AuthError::ClaimInvalid(ClaimKind::Subject));
    }
    Ok(())
}
