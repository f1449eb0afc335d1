use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderValue, Method},
    routing::any,
    Extension, Json, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    app::Auth,
    error::{AuthError, AuthResult},
    json_web::{CustomClaims, IdTokenClaims, VerifiedToken},
    middleware::authenticated,
};

/// Builds the custom claims embedded in tokens minted by `/token`.
#[async_trait]
pub trait ClaimsFactory: Send + Sync {
    async fn claims(&self, token: &VerifiedToken) -> AuthResult<CustomClaims>;
}

#[async_trait]
impl<F> ClaimsFactory for F
where
    F: Fn(&VerifiedToken) -> AuthResult<CustomClaims> + Send + Sync,
{
    async fn claims(&self, token: &VerifiedToken) -> AuthResult<CustomClaims> {
        self(token)
    }
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub generate_uri: String,
    pub verify_uri: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            generate_uri: "/token".to_owned(),
            verify_uri: "/verify".to_owned(),
            allowed_origins: vec!["*".to_owned()],
        }
    }
}

impl ServerOptions {
    pub fn with_generate_uri(mut self, uri: impl Into<String>) -> Self {
        self.generate_uri = uri.into();
        self
    }

    pub fn with_verify_uri(mut self, uri: impl Into<String>) -> Self {
        self.verify_uri = uri.into();
        self
    }

    /// An empty list, or one containing `*`, allows any origin.
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> AuthResult<()> {
        for uri in [&self.generate_uri, &self.verify_uri] {
            if !uri.starts_with('/') {
                return Err(AuthError::Configuration(format!(
                    "endpoint path {uri} must start with '/'"
                )));
            }
        }
        if self.generate_uri == self.verify_uri {
            return Err(AuthError::Configuration(format!(
                "token and verify endpoints share the path {}",
                self.verify_uri
            )));
        }
        Ok(())
    }

    /// CORS for the configured origins, always allowing the `Authorization` header.
    pub fn cors_layer(&self) -> AuthResult<CorsLayer> {
        let origin = if self.allowed_origins.is_empty()
            || self.allowed_origins.iter().any(|origin| origin == "*")
        {
            AllowOrigin::any()
        } else {
            let origins = self
                .allowed_origins
                .iter()
                .map(|origin| {
                    HeaderValue::from_str(origin).map_err(|_| {
                        AuthError::Configuration(format!("invalid allowed origin {origin}"))
                    })
                })
                .collect::<AuthResult<Vec<_>>>()?;
            AllowOrigin::list(origins)
        };

        Ok(CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::HEAD])
            .allow_headers([AUTHORIZATION]))
    }
}

#[derive(Clone)]
struct TokenState {
    auth: Arc<Auth>,
    claims: Arc<dyn ClaimsFactory>,
}

/// Exchanges a verified ID token for a custom token carrying the claims from
/// `claims`, and echoes verified claims back as JSON.
///
/// Both endpoints take the credential from the `authorization` query
/// parameter or an `Authorization: Bearer` header.
pub fn auth_server<F>(auth: Arc<Auth>, claims: F, options: ServerOptions) -> AuthResult<Router>
where
    F: ClaimsFactory + 'static,
{
    options.validate()?;
    let cors = options.cors_layer()?;

    let state = TokenState {
        auth: Arc::clone(&auth),
        claims: Arc::new(claims),
    };

    let router = Router::new()
        .route(&options.generate_uri, any(generate))
        .route(&options.verify_uri, any(verify))
        .with_state(state);

    Ok(authenticated(router, auth).layer(cors))
}

async fn generate(
    State(state): State<TokenState>,
    Extension(token): Extension<VerifiedToken>,
) -> AuthResult<String> {
    let claims = state.claims.claims(&token).await?;
    let minted = state.auth.create_custom_token(token.uid(), &claims)?;
    tracing::debug!("Minted custom token for {}", token.uid());
    Ok(minted)
}

async fn verify(Extension(token): Extension<VerifiedToken>) -> Json<IdTokenClaims> {
    Json(token.into_claims())
}
