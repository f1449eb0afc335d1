use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use reqwest::StatusCode;

use crate::{
    app::Auth,
    error::{AuthError, AuthResult},
    json_web::VerifiedToken,
};

/// Query parameter that may carry the credential. Sending it this way lets
/// browsers skip the CORS preflight an `Authorization` header would cause.
pub const AUTHORIZATION_PARAM: &str = "authorization";

const BEARER: &str = "Bearer ";

pub fn create_span(request: &Request) -> tracing::Span {
    let method = request.method();
    let uri = request.uri().path();

    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str())
        .unwrap_or("<unknown>");

    tracing::debug_span!("request", %method, %uri, matched_path)
}

#[allow(clippy::unused_async)]
pub async fn handle_error() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "That endpoint does not exist.")
}

pub fn authorization_from_param(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == AUTHORIZATION_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub fn authorization_from_header(headers: &HeaderMap) -> AuthResult<Option<String>> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix(BEARER))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AuthError::MalformedCredential(
                "Authorization header format must be 'Bearer {token}'".into(),
            )
        })?;

    Ok(Some(token.to_owned()))
}

/// The query parameter wins over the header. With neither the result is
/// `MissingCredential`.
pub fn authorization_from_request(uri: &Uri, headers: &HeaderMap) -> AuthResult<String> {
    if let Some(token) = authorization_from_param(uri) {
        return Ok(token);
    }
    authorization_from_header(headers)?.ok_or(AuthError::MissingCredential)
}

/// Decides whether a verified caller may reach a route.
pub trait AccessPredicate: Send + Sync {
    fn permits(&self, token: &VerifiedToken) -> AuthResult<bool>;
}

impl<F> AccessPredicate for F
where
    F: Fn(&VerifiedToken) -> AuthResult<bool> + Send + Sync,
{
    fn permits(&self, token: &VerifiedToken) -> AuthResult<bool> {
        self(token)
    }
}

/// Any valid token will do.
#[derive(Debug, Clone, Copy, Default)]
pub struct Authenticated;

impl AccessPredicate for Authenticated {
    fn permits(&self, _token: &VerifiedToken) -> AuthResult<bool> {
        Ok(true)
    }
}

/// Passes if the token claims at least one of the roles.
#[derive(Debug, Clone, Default)]
pub struct AnyRole(HashSet<String>);

impl AnyRole {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }
}

impl AccessPredicate for AnyRole {
    fn permits(&self, token: &VerifiedToken) -> AuthResult<bool> {
        let claimed = token.roles().unwrap_or_default();
        Ok(claimed.iter().any(|role| self.0.contains(*role)))
    }
}

/// Passes only if the token claims every one of the roles.
#[derive(Debug, Clone, Default)]
pub struct AllRoles(HashSet<String>);

impl AllRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }
}

impl AccessPredicate for AllRoles {
    fn permits(&self, token: &VerifiedToken) -> AuthResult<bool> {
        let claimed = token.roles().unwrap_or_default();
        Ok(self
            .0
            .iter()
            .all(|required| claimed.contains(&required.as_str())))
    }
}

#[derive(Clone)]
struct Gate {
    auth: Arc<Auth>,
    predicate: Arc<dyn AccessPredicate>,
}

impl Gate {
    async fn admit(&self, credential: AuthResult<String>) -> AuthResult<VerifiedToken> {
        let token = self.auth.verify_id_token(&credential?).await?;

        match self.predicate.permits(&token) {
            Ok(true) => Ok(token),
            Ok(false) => Err(AuthError::Forbidden),
            Err(error) => {
                tracing::warn!("Access predicate failed for {}: {}", token.uid(), error);
                Err(AuthError::Forbidden)
            }
        }
    }
}

async fn authorization(State(gate): State<Gate>, mut request: Request, next: Next) -> Response {
    let credential = authorization_from_request(request.uri(), request.headers());

    match gate.admit(credential).await {
        Ok(token) => {
            tracing::debug!("Authorized {}", token.uid());
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}

/// Guards every route already on `router`: callers need a valid bearer token
/// that satisfies `predicate`. Handlers can pull the token out with
/// `Extension<VerifiedToken>`.
pub fn authorize<S, P>(router: Router<S>, auth: Arc<Auth>, predicate: P) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    P: AccessPredicate + 'static,
{
    let gate = Gate {
        auth,
        predicate: Arc::new(predicate),
    };
    router.route_layer(axum::middleware::from_fn_with_state(gate, authorization))
}

pub fn authenticated<S>(router: Router<S>, auth: Arc<Auth>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    authorize(router, auth, Authenticated)
}

pub fn any_role<S>(router: Router<S>, auth: Arc<Auth>, roles: &[&str]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    authorize(router, auth, AnyRole::new(roles.iter().copied()))
}

pub fn all_roles<S>(router: Router<S>, auth: Arc<Auth>, roles: &[&str]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    authorize(router, auth, AllRoles::new(roles.iter().copied()))
}
