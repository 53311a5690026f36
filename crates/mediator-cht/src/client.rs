use std::time::Duration;

use mediator_core::{MediatorError, RemoteSystem, Result};
use serde_json::Value;

/// REST client for the CHT API.
///
/// The mediator routes only create people and records. `bulk_docs` and
/// `get_user` round out the CHT surface for host tooling: seeding task
/// documents in bulk and resolving the place and contact a CHW's records
/// should land under.
pub struct ChtClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ChtClient {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediatorError::configuration(format!("CHT client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    async fn post(&self, path: &str, body: &Value, step: &str) -> Result<Value> {
        tracing::debug!(path, step, "CHT request");
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|e| map_err(e, step))?;
        read_success(resp, step).await
    }

    /// Submit a person document.
    pub async fn create_person(&self, person: &Value) -> Result<Value> {
        self.post("/api/v1/people", person, "create person").await
    }

    /// Submit a report record.
    pub async fn create_record(&self, record: &Value) -> Result<Value> {
        self.post("/api/v2/records", record, "create record").await
    }

    /// Submit raw documents, the task-report path.
    pub async fn bulk_docs(&self, docs: &Value) -> Result<Value> {
        self.post("/medic/_bulk_docs", docs, "bulk docs").await
    }

    /// Resolve a user's place and contact.
    pub async fn get_user(&self, name: &str) -> Result<Value> {
        let step = format!("get user {name}");
        let resp = self
            .http
            .get(format!("{}/api/v2/users/{name}", self.base_url))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| map_err(e, &step))?;
        read_success(resp, &step).await
    }
}

fn map_err(err: reqwest::Error, step: &str) -> MediatorError {
    if err.is_timeout() {
        MediatorError::timeout(RemoteSystem::Cht, step)
    } else {
        MediatorError::upstream(RemoteSystem::Cht, step, err.to_string())
    }
}

async fn read_success(resp: reqwest::Response, step: &str) -> Result<Value> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| MediatorError::upstream(RemoteSystem::Cht, step, e.to_string()))?;
    let json: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body)?
    };
    if !status.is_success() {
        return Err(MediatorError::rejected(
            RemoteSystem::Cht,
            step,
            status.as_u16(),
            json.to_string(),
        ));
    }
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ChtClient {
        ChtClient::new(&server.uri(), "chw", "secret", Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_create_person_posts_to_people_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/people"))
            .and(basic_auth("chw", "secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "id": "p-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server)
            .await
            .create_person(&json!({ "name": "Jane Doe" }))
            .await
            .unwrap();
        assert_eq!(body["id"], "p-1");
    }

    #[tokio::test]
    async fn test_get_user_resolves_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/maria"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "place": [{ "_id": "place-1" }],
            })))
            .mount(&server)
            .await;

        let user = client(&server).await.get_user("maria").await.unwrap();
        assert_eq!(user["place"][0]["_id"], "place-1");
    }

    #[tokio::test]
    async fn test_rejection_carries_cht_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/medic/_bulk_docs"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "nope" })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .bulk_docs(&json!({ "docs": [] }))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 401);
        assert!(err.to_string().contains("CHT"));
    }
}
