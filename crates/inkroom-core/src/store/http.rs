//! HTTP backing store client.

use super::{BoardSnapshot, BoardStore, BoxFuture, Project, StoreError, StoreResult};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Backing store reached over HTTP with a bearer credential.
///
/// Endpoints, relative to the API base:
/// - `GET board/<slug>/state/` -> `{ "events": [...], "notes": [...] }`
/// - `GET projects/` -> `[{ "slug": ..., "name": ... }]`
pub struct HttpBoardStore {
    client: Client,
    api_base: Url,
    token: String,
}

impl HttpBoardStore {
    /// Create a client for the API rooted at `api_base`.
    pub fn new(api_base: &str, token: impl Into<String>) -> StoreResult<Self> {
        let api_base = if api_base.ends_with('/') {
            Url::parse(api_base)?
        } else {
            Url::parse(&format!("{}/", api_base))?
        };
        Ok(Self {
            client: Client::new(),
            api_base,
            token: token.into(),
        })
    }

    /// Absolute URL of an API path.
    pub fn endpoint(&self, path: &str) -> StoreResult<Url> {
        Ok(self.api_base.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> StoreResult<T> {
        let url = self.endpoint(path)?;
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

impl BoardStore for HttpBoardStore {
    fn board_state(&self, slug: &str) -> BoxFuture<'_, StoreResult<BoardSnapshot>> {
        let slug = slug.to_string();
        Box::pin(async move {
            match self.get_json(&format!("board/{}/state/", slug)).await {
                Err(StoreError::Status { status: 404, .. }) => Err(StoreError::NotFound(slug)),
                other => other,
            }
        })
    }

    fn projects(&self) -> BoxFuture<'_, StoreResult<Vec<Project>>> {
        Box::pin(async move { self.get_json("projects/").await })
    }
}
