use super::{ChangeId, ChangeProposal, ChangeStatus, StackError, StackService, StackStatus};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    change_id: String,
}

/// Stack service spoken to as JSON over HTTP.
pub struct HttpStackService {
    endpoint: Url,
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl HttpStackService {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, StackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StackError::Transport(err.to_string()))?;
        Ok(Self {
            endpoint,
            client,
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|token| !token.trim().is_empty());
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StackError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StackError::Transport(format!("endpoint {} cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StackError> {
        let request = match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request
            .send()
            .await
            .map_err(|err| StackError::Transport(err.to_string()))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StackError> {
    let body = response
        .bytes()
        .await
        .map_err(|err| StackError::Transport(err.to_string()))?;
    serde_json::from_slice(&body).map_err(|err| StackError::Protocol(err.to_string()))
}

/// Map non-success statuses; `not_found` decides what a 404 means for the call.
async fn check_status(
    response: reqwest::Response,
    not_found: impl FnOnce() -> StackError,
) -> Result<reqwest::Response, StackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(not_found()),
        StatusCode::CONFLICT => Err(StackError::Rejected(if message.trim().is_empty() {
            "a change is already in flight for this stack".to_string()
        } else {
            message.trim().to_string()
        })),
        _ => Err(StackError::Backend {
            status: status.as_u16(),
            message,
        }),
    }
}

#[async_trait]
impl StackService for HttpStackService {
    async fn submit_change(&self, proposal: &ChangeProposal) -> Result<ChangeId, StackError> {
        let url = self.url(&["stacks", &proposal.stack_name, "changes"])?;
        let response = self.send(self.client.post(url).json(proposal)).await?;
        let response =
            check_status(response, || StackError::StackNotFound(proposal.stack_name.clone()))
                .await?;
        let submitted: SubmitResponse = decode(response).await?;
        if submitted.change_id.trim().is_empty() {
            return Err(StackError::Protocol("empty change id".to_string()));
        }
        Ok(ChangeId::new(submitted.change_id))
    }

    async fn get_change_status(&self, change_id: &ChangeId) -> Result<ChangeStatus, StackError> {
        let url = self.url(&["changes", change_id.as_str()])?;
        let response = self.send(self.client.get(url)).await?;
        let response = check_status(response, || StackError::ChangeNotFound(change_id.clone())).await?;
        decode(response).await
    }

    async fn execute_change(&self, change_id: &ChangeId) -> Result<(), StackError> {
        let url = self.url(&["changes", change_id.as_str(), "execute"])?;
        let response = self.send(self.client.post(url)).await?;
        check_status(response, || StackError::ChangeNotFound(change_id.clone())).await?;
        Ok(())
    }

    async fn get_stack_status(&self, stack_name: &str) -> Result<StackStatus, StackError> {
        let url = self.url(&["stacks", stack_name])?;
        let response = self.send(self.client.get(url)).await?;
        let response =
            check_status(response, || StackError::StackNotFound(stack_name.to_string())).await?;
        decode(response).await
    }
}
