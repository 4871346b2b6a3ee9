//! Thin authenticated JSON client with `nextPageToken` paging.

use crate::GcpError;
use common::Credential;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on pages fetched for one listing.
const MAX_PAGES: usize = 1000;

/// Shared HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: Client,
}

impl GcpClient {
    /// # Errors
    /// Returns [`GcpError::Http`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, GcpError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, GcpError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub async fn get_json(&self, credential: &Credential, url: &str) -> Result<Value, GcpError> {
        self.send(url, self.http.get(url).bearer_auth(credential.bearer()))
            .await
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        credential: &Credential,
        url: &str,
        body: &B,
    ) -> Result<Value, GcpError> {
        self.send(
            url,
            self.http
                .post(url)
                .bearer_auth(credential.bearer())
                .json(body),
        )
        .await
    }

    /// Follows `nextPageToken` and concatenates the `items_key` arrays of every
    /// page.
    pub async fn list_paged(
        &self,
        credential: &Credential,
        url: &str,
        items_key: &str,
    ) -> Result<Vec<Value>, GcpError> {
        let mut items = Vec::new();
        self.for_each_page(credential, url, |page| {
            items.extend(take_items(page, items_key));
        })
        .await?;
        Ok(items)
    }

    /// Pages through an aggregated list (`items: {scope: {items_key: [...]}}`)
    /// and flattens every scope into one list.
    pub async fn list_aggregated(
        &self,
        credential: &Credential,
        url: &str,
        items_key: &str,
    ) -> Result<Vec<Value>, GcpError> {
        let mut items = Vec::new();
        self.for_each_page(credential, url, |page| {
            items.extend(flatten_aggregated(page, items_key));
        })
        .await?;
        Ok(items)
    }

    async fn for_each_page(
        &self,
        credential: &Credential,
        url: &str,
        mut on_page: impl FnMut(Value),
    ) -> Result<(), GcpError> {
        let mut token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut request = self.http.get(url).bearer_auth(credential.bearer());
            if let Some(token) = &token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page = self.send(url, request).await?;
            token = next_page_token(&page);
            on_page(page);
            if token.is_none() {
                return Ok(());
            }
        }
        debug!(url, "page limit reached, truncating listing");
        Ok(())
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Value, GcpError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GcpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

pub(crate) fn next_page_token(page: &Value) -> Option<String> {
    page.get("nextPageToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub(crate) fn take_items(mut page: Value, items_key: &str) -> Vec<Value> {
    match page.get_mut(items_key).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

pub(crate) fn flatten_aggregated(mut page: Value, items_key: &str) -> Vec<Value> {
    let Some(Value::Object(scopes)) = page.get_mut("items").map(Value::take) else {
        return Vec::new();
    };
    scopes
        .into_iter()
        .flat_map(|(_, scope)| take_items(scope, items_key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_next_page_token() {
        assert_eq!(
            next_page_token(&json!({"nextPageToken": "abc"})),
            Some("abc".to_string())
        );
        assert_eq!(next_page_token(&json!({"nextPageToken": ""})), None);
        assert_eq!(next_page_token(&json!({})), None);
    }

    #[test]
    fn test_take_items() {
        let page = json!({"projects": [{"projectId": "p1"}], "nextPageToken": "t"});
        assert_eq!(take_items(page, "projects").len(), 1);
        assert!(take_items(json!({}), "projects").is_empty());
        assert!(take_items(json!({"projects": "nope"}), "projects").is_empty());
    }

    #[test]
    fn test_flatten_aggregated() {
        let page = json!({
            "items": {
                "zones/us-central1-a": {"instances": [{"name": "vm-1"}, {"name": "vm-2"}]},
                "zones/europe-west1-b": {"warning": {"code": "NO_RESULTS_ON_PAGE"}},
                "zones/asia-east1-a": {"instances": [{"name": "vm-3"}]}
            }
        });
        let mut names: Vec<String> = flatten_aggregated(page, "instances")
            .iter()
            .map(|i| i["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["vm-1", "vm-2", "vm-3"]);
    }
}
