use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthResult};

/// Claim names that carry token structure and may not be set by
/// application supplied custom claims.
pub const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "c_hash", "cnf", "exp", "firebase",
    "iat", "iss", "jti", "nbf", "nonce", "sub",
];

pub const ROLES_CLAIM: &str = "roles";

/// Payload of a Firebase ID token, or of any token minted for the same
/// issuer/audience pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String, // Issuer
    pub aud: String, // Audience (the project id)
    pub sub: String, // Subject (the Firebase uid)
    pub exp: u64,    // Expiration time in unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>, // Issued at time in unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Provider specific and custom claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdTokenClaims {
    /// The `roles` claim, if present and a list of strings.
    pub fn roles(&self) -> Option<Vec<&str>> {
        string_list(self.extra.get(ROLES_CLAIM)?)
    }
}

/// Application defined claims to embed in a minted token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomClaims {
    #[serde(flatten)]
    values: Map<String, Value>,
}

impl CustomClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = roles
            .into_iter()
            .map(|role| Value::String(role.into()))
            .collect::<Vec<_>>();
        self.with(ROLES_CLAIM, roles)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn roles(&self) -> Option<Vec<&str>> {
        string_list(self.values.get(ROLES_CLAIM)?)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fails on the first claim name that would override token structure.
    pub fn check_reserved(&self) -> AuthResult<()> {
        match self
            .values
            .keys()
            .find(|name| RESERVED_CLAIMS.contains(&name.as_str()))
        {
            Some(name) => Err(AuthError::ReservedClaim(name.clone())),
            None => Ok(()),
        }
    }
}

fn string_list(value: &Value) -> Option<Vec<&str>> {
    value.as_array()?.iter().map(Value::as_str).collect()
}
