use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::ModelId;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One entry of `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteModel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<RemoteModel>,
}

/// HTTP client for the model-management and diagnostic routes of a Speaches server.
pub struct SpeachesClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl SpeachesClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Asks the server to download and register `model`. The server replies
    /// once the files are on disk, so this can take as long as the download.
    pub async fn prefetch(&self, model: &ModelId) -> Result<StatusCode> {
        let path = format!("v1/models/{}/{}", model.org(), model.name());
        tracing::debug!("POST {}", self.endpoint(&path));

        let response = self.request(Method::POST, &path).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.status())
    }

    pub async fn list_models(&self) -> Result<Vec<RemoteModel>> {
        let response = self.request(Method::GET, "v1/models").send().await?;
        let list: ModelList = ensure_success(response).await?.json().await?;
        Ok(list.data)
    }

    pub async fn health(&self) -> Result<()> {
        let response = self
            .request(Method::GET, "health")
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Polls the health route until it answers or `wait` has elapsed.
    pub async fn wait_until_healthy(&self, wait: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started + wait;

        loop {
            match self.health().await {
                Ok(()) => {
                    tracing::info!(
                        "Server at {} is ready after {:.1}s",
                        self.base_url,
                        started.elapsed().as_secs_f32()
                    );
                    return Ok(());
                }
                Err(e) => tracing::debug!("Server not ready yet: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ServerNotReady {
                    url: self.base_url.clone(),
                    waited_secs: wait.as_secs(),
                });
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    Err(Error::Http { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_port_url, test_config, FakeServer};

    #[tokio::test]
    async fn prefetch_then_list() {
        let server = FakeServer::start().await;
        let client = SpeachesClient::new(&test_config(&server.base_url)).unwrap();
        let model = ModelId::parse("Systran/faster-whisper-small").unwrap();

        assert_eq!(client.prefetch(&model).await.unwrap(), StatusCode::CREATED);
        assert_eq!(client.prefetch(&model).await.unwrap(), StatusCode::OK);

        let models = client.list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "Systran/faster-whisper-small");
        assert_eq!(models[0].owned_by.as_deref(), Some("Systran"));
        assert_eq!(
            server.state.posted(),
            vec!["Systran/faster-whisper-small", "Systran/faster-whisper-small"]
        );
    }

    #[tokio::test]
    async fn surfaces_http_errors_with_body() {
        let server = FakeServer::start().await;
        let client = SpeachesClient::new(&test_config(&server.base_url)).unwrap();
        let model = ModelId::parse("missing/model").unwrap();

        match client.prefetch(&model).await {
            Err(Error::Http { status, body }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let server = FakeServer::start().await;
        server.state.require_api_key("secret");

        let anonymous = SpeachesClient::new(&test_config(&server.base_url)).unwrap();
        assert!(matches!(
            anonymous.list_models().await,
            Err(Error::Http { status, .. }) if status == StatusCode::UNAUTHORIZED
        ));

        let mut config = test_config(&server.base_url);
        config.api_key = Some("secret".into());
        let client = SpeachesClient::new(&config).unwrap();
        assert!(client.list_models().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ignores_trailing_slash_in_base_url() {
        let server = FakeServer::start().await;
        let config = test_config(&format!("{}/", server.base_url));
        let client = SpeachesClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint("/v1/models"),
            format!("{}/v1/models", server.base_url)
        );
        client.health().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transient_error() {
        let config = test_config(&closed_port_url().await);
        let client = SpeachesClient::new(&config).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(err.is_transient(), "{:?}", err);
    }

    #[tokio::test]
    async fn slow_server_hits_request_timeout() {
        let server = FakeServer::start().await;
        server.state.set_delay(Duration::from_secs(5));

        let mut config = test_config(&server.base_url);
        config.timeout = Duration::from_millis(200);
        let client = SpeachesClient::new(&config).unwrap();

        let started = Instant::now();
        let err = client
            .prefetch(&ModelId::parse("a/b").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn wait_gives_up_after_deadline() {
        let config = test_config(&closed_port_url().await);
        let client = SpeachesClient::new(&config).unwrap();
        let err = client
            .wait_until_healthy(Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServerNotReady { .. }));
    }

    #[tokio::test]
    async fn wait_returns_once_healthy() {
        let server = FakeServer::start().await;
        let client = SpeachesClient::new(&test_config(&server.base_url)).unwrap();
        client
            .wait_until_healthy(Duration::from_secs(2))
            .await
            .unwrap();
    }
}
