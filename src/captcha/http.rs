use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::CaptchaSolver;
use super::error::SolverError;
use super::types::{CaptchaImage, SolveRequest, SolveResponse};

/// Solves captchas through an HTTP image-to-text service.
///
/// The service receives `{"image_base64": ..}` or `{"image_url": ..}` and
/// answers `{"text": ..}`. A 422 means the image was unreadable and maps to
/// an empty answer.
pub struct HttpCaptchaSolver {
    client: Client,
    endpoint: String,
    health_url: Option<String>,
}

impl HttpCaptchaSolver {
    pub fn new(endpoint: String, health_url: Option<String>, timeout: Duration) -> Result<Self, SolverError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            health_url,
        })
    }
}

#[async_trait]
impl CaptchaSolver for HttpCaptchaSolver {
    async fn initialize(&self) -> Result<(), SolverError> {
        let Some(url) = &self.health_url else {
            return Ok(());
        };
        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SolverError::Initialization(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }

    async fn solve(&self, image: &CaptchaImage) -> Result<String, SolverError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SolveRequest::from(image))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(String::new());
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SolverError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<SolveResponse>().await?;
        Ok(body.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn solver(server: &MockServer, health: bool) -> HttpCaptchaSolver {
        HttpCaptchaSolver::new(
            format!("{}/solve", server.uri()),
            health.then(|| format!("{}/health", server.uri())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn returns_service_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/solve"))
            .and(body_json(serde_json::json!({ "image_url": "http://site/c.png" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "aB3xY" })))
            .mount(&server)
            .await;

        let text = solver(&server, false)
            .solve(&CaptchaImage::Remote("http://site/c.png".into()))
            .await
            .unwrap();
        assert_eq!(text, "aB3xY");
    }

    #[tokio::test]
    async fn unreadable_image_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/solve"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let text = solver(&server, false)
            .solve(&CaptchaImage::Inline(vec![1, 2, 3]))
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/solve"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let err = solver(&server, false)
            .solve(&CaptchaImage::Inline(vec![0]))
            .await
            .unwrap_err();
        match err {
            SolverError::Service { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model crashed");
            }
            other => panic!("expected Service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_health_check_fails_initialization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = solver(&server, true).initialize().await.unwrap_err();
        assert!(matches!(err, SolverError::Initialization(_)));
    }

    #[tokio::test]
    async fn initialization_without_health_url_is_a_no_op() {
        let server = MockServer::start().await;
        solver(&server, false).initialize().await.unwrap();
    }
}
