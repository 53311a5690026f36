use std::time::Duration;

use mediator_core::{Bundle, MediatorError, RemoteSystem, ResourceType, Result};
use serde_json::{Value, json};

/// REST client for OpenMRS.
///
/// Resource traffic goes through the fhir2 R4 module; identifier-type
/// provisioning uses the legacy REST API.
pub struct OpenMrsClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl OpenMrsClient {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediatorError::configuration(format!("OpenMRS client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    fn r4_url(&self, path: &str) -> String {
        format!("{}/ws/fhir2/R4/{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    pub async fn search(&self, resource_type: ResourceType, identifier: &str) -> Result<Bundle> {
        let step = format!("search {resource_type}");
        let resp = self
            .request(reqwest::Method::GET, &self.r4_url(resource_type.as_str()))
            .query(&[("identifier", identifier)])
            .send()
            .await
            .map_err(|e| map_err(e, &step))?;
        let body = read_success(resp, &step).await?;
        serde_json::from_value(body).map_err(Into::into)
    }

    pub async fn create(&self, resource_type: ResourceType, body: &Value) -> Result<(u16, Value)> {
        let step = format!("create {resource_type}");
        let resp = self
            .request(reqwest::Method::POST, &self.r4_url(resource_type.as_str()))
            .json(body)
            .send()
            .await
            .map_err(|e| map_err(e, &step))?;

        let status = resp.status();
        let body = read_body(resp, &step).await?;
        if !status.is_success() {
            return Err(MediatorError::rejected(
                RemoteSystem::OpenMrs,
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
                &self.r4_url(&format!("{resource_type}/{id}")),
            )
            .json(body)
            .send()
            .await
            .map_err(|e| map_err(e, &step))?;
        read_success(resp, &step).await
    }

    /// Provision a patient-identifier type by name. OpenMRS requires the type
    /// to exist before patients carrying it can be created.
    pub async fn create_identifier_type(&self, name: &str) -> Result<Value> {
        let step = format!("create identifier type '{name}'");
        tracing::info!(name, "provisioning OpenMRS identifier type");
        let body = json!({
            "name": name,
            "description": name,
            "required": false,
            "locationBehavior": "NOT_USED",
            "uniquenessBehavior": "Unique",
        });
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("{}/ws/rest/v1/patientidentifiertype", self.base_url),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| map_err(e, &step))?;
        read_success(resp, &step).await
    }
}

fn map_err(err: reqwest::Error, step: &str) -> MediatorError {
    if err.is_timeout() {
        MediatorError::timeout(RemoteSystem::OpenMrs, step)
    } else {
        MediatorError::upstream(RemoteSystem::OpenMrs, step, err.to_string())
    }
}

async fn read_body(resp: reqwest::Response, step: &str) -> Result<Value> {
    let body = resp
        .text()
        .await
        .map_err(|e| MediatorError::upstream(RemoteSystem::OpenMrs, step, e.to_string()))?;
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(Into::into)
}

async fn read_success(resp: reqwest::Response, step: &str) -> Result<Value> {
    let status = resp.status();
    let body = read_body(resp, step).await?;
    if !status.is_success() {
        return Err(MediatorError::rejected(
            RemoteSystem::OpenMrs,
            step,
            status.as_u16(),
            body.to_string(),
        ));
    }
    Ok(body)
}
