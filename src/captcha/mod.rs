//! Captcha solving collaborator.
//!
//! One solver is constructed up front and shared by reference with every
//! session through [`SharedSolver`], which runs the solver's initialization
//! exactly once no matter how many sessions ask for a solve concurrently.

pub mod error;
pub mod http;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub use error::SolverError;
pub use http::HttpCaptchaSolver;
pub use types::CaptchaImage;

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// One-time setup (model load, health check).
    async fn initialize(&self) -> Result<(), SolverError> {
        Ok(())
    }

    /// Read the captcha text. Empty when the image is unreadable.
    async fn solve(&self, image: &CaptchaImage) -> Result<String, SolverError>;
}

pub struct SharedSolver {
    inner: Arc<dyn CaptchaSolver>,
    ready: OnceCell<()>,
}

impl SharedSolver {
    pub fn new(inner: Arc<dyn CaptchaSolver>) -> Self {
        Self {
            inner,
            ready: OnceCell::new(),
        }
    }

    pub async fn ensure_ready(&self) -> Result<(), SolverError> {
        self.ready
            .get_or_try_init(|| async {
                info!("initializing captcha solver");
                self.inner.initialize().await
            })
            .await
            .map(|_| ())
    }

    /// Solve and keep only the characters captchas are made of.
    pub async fn solve(&self, image: &CaptchaImage) -> Result<String, SolverError> {
        self.ensure_ready().await?;
        let started = std::time::Instant::now();
        let raw = self.inner.solve(image).await?;
        let text = sanitize(&raw);
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, text = %text, "captcha solved");
        Ok(text)
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}
