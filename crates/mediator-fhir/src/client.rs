use std::time::Duration;

use mediator_core::{Bundle, MediatorError, RemoteSystem, ResourceType, Result};
use serde_json::Value;

/// REST client for the FHIR store.
///
/// Every outbound call carries the configured timeout; on timeout the caller
/// sees a retryable [`MediatorError::UpstreamTimeout`].
pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl FhirClient {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediatorError::configuration(format!("FHIR client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/fhir+json")
    }

    fn map_err(err: reqwest::Error, step: &str) -> MediatorError {
        if err.is_timeout() {
            MediatorError::timeout(RemoteSystem::Fhir, step)
        } else {
            MediatorError::upstream(RemoteSystem::Fhir, step, err.to_string())
        }
    }

    /// Search a resource collection by official identifier value.
    pub async fn search(&self, resource_type: ResourceType, identifier: &str) -> Result<Bundle> {
        let step = format!("search {resource_type}");
        let resp = self
            .request(reqwest::Method::GET, &self.url(resource_type.as_str()))
            .query(&[("identifier", identifier)])
            .send()
            .await
            .map_err(|e| Self::map_err(e, &step))?;
        let body = read_success(resp, &step).await?;
        serde_json::from_value(body).map_err(Into::into)
    }

    /// Fetch the whole collection, the explicit-sync starting point.
    pub async fn search_all(&self, resource_type: ResourceType) -> Result<Bundle> {
        let step = format!("list {resource_type}");
        let resp = self
            .request(reqwest::Method::GET, &self.url(resource_type.as_str()))
            .send()
            .await
            .map_err(|e| Self::map_err(e, &step))?;
        let body = read_success(resp, &step).await?;
        serde_json::from_value(body).map_err(Into::into)
    }

    pub async fn read(&self, resource_type: ResourceType, id: &str) -> Result<Value> {
        let step = format!("read {resource_type}/{id}");
        let resp = self
            .request(
                reqwest::Method::GET,
                &self.url(&format!("{resource_type}/{id}")),
            )
            .send()
            .await
            .map_err(|e| Self::map_err(e, &step))?;
        read_success(resp, &step).await
    }

    /// Create a resource. Returns the store's status code and response body so
    /// pass-through handlers can relay them verbatim.
    pub async fn create(&self, resource_type: ResourceType, body: &Value) -> Result<(u16, Value)> {
        let step = format!("create {resource_type}");
        let resp = self
            .request(reqwest::Method::POST, &self.url(resource_type.as_str()))
            .header("Content-Type", "application/fhir+json")
            .json(body)
            .send()
            .await
            .map_err(|e| Self::map_err(e, &step))?;

        let status = resp.status();
        let body = read_json(resp, &step).await?;
        if !status.is_success() {
            return Err(MediatorError::rejected(
                RemoteSystem::Fhir,
                step,
                status.as_u16(),
                body.to_string(),
            ));
        }
        Ok((status.as_u16(), body))
    }

    pub async fn update(&self, resource_type: ResourceType, id: &str, body: &Value) -> Result<Value> {
        let step = format!("update {resource_type}/{id}");
        let resp = self
            .request(
                reqwest::Method::PUT,
                &self.url(&format!("{resource_type}/{id}")),
            )
            .header("Content-Type", "application/fhir+json")
            .json(body)
            .send()
            .await
            .map_err(|e| Self::map_err(e, &step))?;
        read_success(resp, &step).await
    }

    /// Delete a resource by id. A 404 or 410 from the store means the resource
    /// is already gone, which is a successful no-op: the store is
    /// authoritative for what exists.
    pub async fn delete(&self, resource_type: ResourceType, id: &str) -> Result<()> {
        let step = format!("delete {resource_type}/{id}");
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &self.url(&format!("{resource_type}/{id}")),
            )
            .send()
            .await
            .map_err(|e| Self::map_err(e, &step))?;

        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 || status.as_u16() == 410 {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(MediatorError::rejected(
                RemoteSystem::Fhir,
                step,
                status.as_u16(),
                body,
            ))
        }
    }
}

async fn read_json(resp: reqwest::Response, step: &str) -> Result<Value> {
    let body = resp
        .text()
        .await
        .map_err(|e| MediatorError::upstream(RemoteSystem::Fhir, step, e.to_string()))?;
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(Into::into)
}

async fn read_success(resp: reqwest::Response, step: &str) -> Result<Value> {
    let status = resp.status();
    let body = read_json(resp, step).await?;
    if !status.is_success() {
        return Err(MediatorError::rejected(
            RemoteSystem::Fhir,
            step,
            status.as_u16(),
            body.to_string(),
        ));
    }
    Ok(body)
}
