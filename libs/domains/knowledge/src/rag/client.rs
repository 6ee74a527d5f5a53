use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{RagConfig, VectorIndex};
use crate::error::VectorIndexError;
use crate::models::NodeRelease;

/// RAGFlow-style HTTP API client.
///
/// Responses come either wrapped as `{"code": 0, "data": ...}` or flat;
/// both are accepted. A non-zero `code` is an API error even on HTTP 200.
pub struct RagFlowClient {
    client: Client,
    config: RagConfig,
}

#[derive(Debug, Serialize)]
struct CreateDatasetRequest<'a> {
    name: &'a str,
    chunk_method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding_model: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct IdsRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    document_ids: &'a [String],
}

impl RagFlowClient {
    pub fn new(config: RagConfig) -> Result<Self, VectorIndexError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.config.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, VectorIndexError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorIndexError::Status { status, body });
        }

        let body = response.text().await?;
        unwrap_envelope(&body)
    }

    async fn parse_documents(
        &self,
        dataset_id: &str,
        doc_ids: &[String],
    ) -> Result<(), VectorIndexError> {
        let request = self
            .request(Method::POST, &format!("datasets/{}/chunks", dataset_id))
            .json(&ParseRequest {
                document_ids: doc_ids,
            });
        self.send(request).await?;
        Ok(())
    }
}

/// Strip the `{code, message, data}` wrapper when present.
fn unwrap_envelope(body: &str) -> Result<Value, VectorIndexError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| VectorIndexError::InvalidResponse(format!("{}: {}", e, body)))?;

    let Some(object) = value.as_object() else {
        return Ok(value);
    };
    let Some(code) = object.get("code").and_then(Value::as_i64) else {
        return Ok(value);
    };

    if code != 0 {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(VectorIndexError::Api { code, message });
    }

    Ok(object.get("data").cloned().unwrap_or(Value::Null))
}

/// `id` of an object, or of the first element of an array of objects.
fn first_id(data: &Value) -> Option<String> {
    let item = match data {
        Value::Array(items) => items.first()?,
        other => other,
    };
    item.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn document_file_name(release: &NodeRelease) -> String {
    format!("{}.html", release.id)
}

#[async_trait]
impl VectorIndex for RagFlowClient {
    #[instrument(skip(self))]
    async fn create_dataset(&self, name: &str) -> Result<String, VectorIndexError> {
        let request = self.request(Method::POST, "datasets").json(&CreateDatasetRequest {
            name,
            chunk_method: &self.config.chunk_method,
            embedding_model: self.config.embedding_model.as_deref(),
        });

        let data = self.send(request).await?;
        first_id(&data).ok_or_else(|| {
            VectorIndexError::InvalidResponse(format!("create dataset returned no id: {}", data))
        })
    }

    #[instrument(skip(self, release), fields(node_release_id = %release.id))]
    async fn upsert_release(
        &self,
        dataset_id: &str,
        release: &NodeRelease,
    ) -> Result<String, VectorIndexError> {
        if dataset_id.is_empty() {
            return Err(VectorIndexError::InvalidRequest("empty dataset id".to_string()));
        }

        let part = Part::text(release.content.clone())
            .file_name(document_file_name(release))
            .mime_str("text/html")?;
        let form = Form::new().part("file", part);

        let request = self
            .request(Method::POST, &format!("datasets/{}/documents", dataset_id))
            .multipart(form);
        let data = self.send(request).await?;

        let doc_id = first_id(&data).ok_or_else(|| {
            VectorIndexError::InvalidResponse(format!("upload returned no document: {}", data))
        })?;
        debug!(doc_id = %doc_id, "Uploaded document, starting parse");

        self.parse_documents(dataset_id, std::slice::from_ref(&doc_id))
            .await?;
        Ok(doc_id)
    }

    #[instrument(skip(self))]
    async fn delete_documents(
        &self,
        dataset_id: &str,
        doc_ids: &[String],
    ) -> Result<(), VectorIndexError> {
        // An empty id list would delete every document in the dataset
        if doc_ids.is_empty() {
            return Ok(());
        }
        if dataset_id.is_empty() {
            return Err(VectorIndexError::InvalidRequest("empty dataset id".to_string()));
        }

        let request = self
            .request(Method::DELETE, &format!("datasets/{}/documents", dataset_id))
            .json(&IdsRequest { ids: doc_ids });
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_datasets(&self, dataset_ids: &[String]) -> Result<(), VectorIndexError> {
        if dataset_ids.is_empty() {
            return Ok(());
        }

        let request = self
            .request(Method::DELETE, "datasets")
            .json(&IdsRequest { ids: dataset_ids });
        self.send(request).await?;
        Ok(())
    }
}
