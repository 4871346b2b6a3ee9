//! Seed identity providers.
//!
//! Each provider yields at most one seed [`Identity`]. Malformed input is
//! reported as [`GcpError::MalformedCredential`] so the caller can log it and
//! carry on with the remaining seeds.

use crate::{GcpClient, GcpError};
use common::{Credential, Identity};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Label used for a token given directly on the command line.
pub const USER_PROVIDED_TOKEN: &str = "access_token_user_provided";

const METADATA_BASE: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default";

#[derive(Debug, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
}

/// Loads `{"access_token": "..."}` from `path`. The identity is named after
/// the file's base name.
///
/// # Errors
/// [`GcpError::IoError`] if the file cannot be read,
/// [`GcpError::MalformedCredential`] if it is not JSON or has no token.
pub fn from_token_file(path: &Path) -> Result<Identity, GcpError> {
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let text = std::fs::read_to_string(path)?;
    let parsed: TokenFile =
        serde_json::from_str(&text).map_err(|e| GcpError::MalformedCredential {
            source_name: label.clone(),
            reason: e.to_string(),
        })?;
    let token = non_empty(parsed.access_token, &label)?;
    Ok(Identity::seed(label, Credential::new(token)))
}

/// Wraps a raw bearer token.
pub fn from_raw_token(token: &str) -> Result<Identity, GcpError> {
    let token = non_empty(Some(token.trim().to_string()), USER_PROVIDED_TOKEN)?;
    Ok(Identity::seed(USER_PROVIDED_TOKEN, Credential::new(token)))
}

/// Asks the GCE metadata server for the default service account and its token.
pub async fn from_metadata(client: &GcpClient) -> Result<Identity, GcpError> {
    info!("retrieving access token from instance metadata");
    let token: TokenFile = client
        .http()
        .get(format!("{METADATA_BASE}/token"))
        .header("Metadata-Flavor", "Google")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let token = non_empty(token.access_token, "metadata")?;

    let email = client
        .http()
        .get(format!("{METADATA_BASE}/email"))
        .header("Metadata-Flavor", "Google")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let email = email.trim();
    if email.is_empty() {
        return Err(GcpError::MalformedCredential {
            source_name: "metadata".into(),
            reason: "empty service account email".into(),
        });
    }
    Ok(Identity::seed(email, Credential::new(token)))
}

fn non_empty(token: Option<String>, label: &str) -> Result<String, GcpError> {
    match token {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(GcpError::MalformedCredential {
            source_name: label.to_string(),
            reason: "missing access_token".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa-prod.json");
        fs::write(&path, r#"{"access_token": "ya29.abc", "expires_in": 3599}"#).unwrap();

        let seed = from_token_file(&path).unwrap();
        assert_eq!(seed.name(), "sa-prod.json");
        assert_eq!(seed.credential().bearer(), "ya29.abc");
        assert!(seed.is_seed());
    }

    #[test]
    fn test_malformed_token_files() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        let empty = dir.path().join("empty.json");
        fs::write(&empty, r#"{"access_token": ""}"#).unwrap();

        for path in [&garbage, &empty] {
            assert!(matches!(
                from_token_file(path),
                Err(GcpError::MalformedCredential { .. })
            ));
        }
        assert!(matches!(
            from_token_file(&dir.path().join("missing.json")),
            Err(GcpError::IoError(_))
        ));
    }

    #[test]
    fn test_raw_token() {
        let seed = from_raw_token(" ya29.xyz \n").unwrap();
        assert_eq!(seed.name(), USER_PROVIDED_TOKEN);
        assert_eq!(seed.credential().bearer(), "ya29.xyz");
        assert!(from_raw_token("   ").is_err());
    }
}
