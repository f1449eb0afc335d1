use std::{fs::File, io::Read, path::Path};

use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// Service account credentials as downloaded from the Firebase console.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl Credentials {
    pub fn from_reader(reader: impl Read) -> AuthResult<Self> {
        let credentials: Self = serde_json::from_reader(reader)
            .map_err(|e| AuthError::Configuration(format!("credentials: {e}")))?;
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AuthError::Configuration(format!("credentials {}: {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    fn validate(&self) -> AuthResult<()> {
        let missing = [
            ("project_id", &self.project_id),
            ("private_key", &self.private_key),
            ("client_email", &self.client_email),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        match missing {
            Some((field, _)) => Err(AuthError::Configuration(format!(
                "credentials are missing {field}"
            ))),
            None => Ok(()),
        }
    }
}

// Keeps the private key out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}
