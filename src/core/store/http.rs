use super::{key_segments, ContentStore, StorageClass, StoreError};
use crate::core::location::LocationReference;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

const STORAGE_CLASS_HEADER: &str = "x-amz-storage-class";

/// Object store reached over path-style HTTP (`{endpoint}/{container}/{key}`).
pub struct HttpContentStore {
    endpoint: Url,
    client: reqwest::Client,
    storage_class: StorageClass,
    auth_token: Option<String>,
}

impl HttpContentStore {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self {
            endpoint,
            client,
            storage_class: StorageClass::default(),
            auth_token: None,
        })
    }

    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = storage_class;
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|token| !token.trim().is_empty());
        self
    }

    fn object_url(&self, container: &str, key: &str) -> Result<Url, StoreError> {
        let segments = key_segments(key)?;
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Transport(format!("endpoint {} cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .push(container)
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn put(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<LocationReference, StoreError> {
        let location = LocationReference::new(container, key)?;
        let url = self.object_url(container, key)?;
        let request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(STORAGE_CLASS_HEADER, self.storage_class.as_str())
            .body(bytes);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        check_status(response, &location).await?;
        Ok(location)
    }

    async fn get(&self, location: &LocationReference) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(location.container(), location.key())?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let response = check_status(response, location).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(body.to_vec())
    }
}

async fn check_status(
    response: reqwest::Response,
    location: &LocationReference,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(location.clone())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::AccessDenied {
            location: location.clone(),
            detail: format!("{} {}", status.as_u16(), message.trim()),
        }),
        _ => Err(StoreError::Backend {
            status: status.as_u16(),
            message,
        }),
    }
}
