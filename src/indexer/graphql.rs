// Minimal GraphQL-over-HTTP transport shared by the subgraph clients

use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::IndexerError;

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Clone)]
pub struct GraphqlClient {
    http_client: HttpClient,
    url: String,
}

impl GraphqlClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, IndexerError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { http_client, url })
    }

    /// Documents are static; every parameter travels as a typed variable.
    pub async fn query<T: DeserializeOwned>(
        &self,
        document: &'static str,
        variables: Value,
    ) -> Result<T, IndexerError> {
        let payload = json!({
            "query": document,
            "variables": variables,
        });

        let resp = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: GraphqlResponse<T> = resp.json().await?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(IndexerError::Graphql(messages.join("; ")));
        }

        body.data
            .ok_or_else(|| IndexerError::Payload("no data in GraphQL response".to_string()))
    }

    pub async fn ping(&self) -> bool {
        #[derive(Deserialize)]
        struct Meta {
            #[serde(rename = "_meta")]
            _meta: Option<Value>,
        }

        self.query::<Meta>("query Ping { _meta { block { number } } }", json!({}))
            .await
            .is_ok()
    }
}
