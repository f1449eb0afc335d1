use std::error::Error;

use axum::{routing::get, Json, Router};
use firebase_auth::{
    config::ServerConfig,
    middleware::{self, any_role},
    services::auth_server,
    AppRegistry, AuthResult, CustomClaims, VerifiedToken,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct Greeting {
    id: u64,
    message: &'static str,
}

async fn api() -> Json<Greeting> {
    Json(Greeting {
        id: 1,
        message: "Hello World",
    })
}

/// This is where the user would be looked up to decide which claims the
/// minted token should carry.
fn custom_claims(token: &VerifiedToken) -> AuthResult<CustomClaims> {
    tracing::debug!("Building claims for {}", token.uid());
    Ok(CustomClaims::new().with("uid", 1).with_roles(["operator"]))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let registry = AppRegistry::new();
    let app = registry.initialize(config.app_config()).await?;
    let auth = app.auth();

    let options = config.server_options();
    let api_routes = any_role(
        Router::new().route("/api", get(api)),
        auth.clone(),
        &["operator"],
    )
    .layer(options.cors_layer()?);

    let router = auth_server(auth, custom_claims, options)?
        .merge(api_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::create_span)
                .on_failure(()),
        )
        .fallback(middleware::handle_error);

    let listener = TcpListener::bind(config.bind_address).await?;
    tracing::debug!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}
