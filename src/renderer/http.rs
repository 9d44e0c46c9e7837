//! HTTP diagram renderer for Kroki-style rendering services.
//!
//! POSTs Mermaid source to `{base}/mermaid/svg` and returns the SVG body.
//! Transport and service errors become error-bearing outcomes with a null
//! artifact; they never fail the calling pipeline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::{validate_source, DiagramRenderer, RenderOutcome};

/// Request timeout for render calls.
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Diagram renderer backed by a Kroki-compatible HTTP service.
pub struct HttpDiagramRenderer {
    base_url: String,
    http_client: Client,
}

impl HttpDiagramRenderer {
    /// Creates a renderer for the given service base URL
    /// (e.g., "https://kroki.io").
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: Client::builder()
                .timeout(RENDER_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    async fn render_remote(&self, source: &str) -> Result<String, String> {
        let url = format!("{}/mermaid/svg", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(source.to_string())
            .send()
            .await
            .map_err(|e| format!("render request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("render service returned {}: {}", status, body));
        }

        response
            .text()
            .await
            .map_err(|e| format!("render response unreadable: {}", e))
    }
}

#[async_trait]
impl DiagramRenderer for HttpDiagramRenderer {
    async fn render(&self, source: &str) -> RenderOutcome {
        let normalized = match validate_source(source) {
            Ok(normalized) => normalized.to_string(),
            Err(reason) => return RenderOutcome::failed(source, reason),
        };

        match self.render_remote(&normalized).await {
            Ok(svg) => RenderOutcome::rendered(normalized, svg),
            Err(reason) => {
                // Client-side rendering from source still works, so a render
                // service outage is not a job failure.
                warn!(error = %reason, "Remote diagram render failed, storing source only");
                RenderOutcome::failed(normalized, reason)
            }
        }
    }
}
