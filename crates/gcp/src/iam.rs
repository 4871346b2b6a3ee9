//! IAM Credentials: minting tokens for other service accounts.

use crate::{GcpClient, GcpError};
use async_trait::async_trait;
use common::{Credential, Identity};
use pivot::{Impersonator, PivotError};
use serde_json::{json, Value};

const IAM_CREDENTIALS_BASE: &str = "https://iamcredentials.googleapis.com/v1";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Impersonates through `generateAccessToken`.
#[derive(Debug, Clone)]
pub struct IamCredentials {
    client: GcpClient,
}

impl IamCredentials {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Impersonator for IamCredentials {
    async fn assume(&self, identity: &Identity, target: &str) -> Result<Credential, PivotError> {
        let url = format!(
            "{IAM_CREDENTIALS_BASE}/projects/-/serviceAccounts/{target}:generateAccessToken"
        );
        let body = json!({ "scope": [CLOUD_PLATFORM_SCOPE] });
        let response = self
            .client
            .post_json(identity.credential(), &url, &body)
            .await
            .map_err(|e| impersonation_error(target, e))?;
        access_token(&response)
            .map(Credential::new)
            .ok_or_else(|| PivotError::Impersonation {
                target: target.to_string(),
                reason: "response has no accessToken".into(),
            })
    }
}

fn impersonation_error(target: &str, e: GcpError) -> PivotError {
    PivotError::Impersonation {
        target: target.to_string(),
        reason: e.to_string(),
    }
}

fn access_token(response: &Value) -> Option<String> {
    response
        .get("accessToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token() {
        let response = json!({"accessToken": "ya29.minted", "expireTime": "2026-01-01T00:00:00Z"});
        assert_eq!(access_token(&response).as_deref(), Some("ya29.minted"));
        assert_eq!(access_token(&json!({"accessToken": ""})), None);
        assert_eq!(access_token(&json!({})), None);
    }
}
