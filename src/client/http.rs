use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;

use crate::core::config::Config;
use crate::core::protocol::{first_line, FeedbackRequest, FeedbackResult};

/// Outer bound on one feedback call. The server enforces its own session
/// timeout; this one only catches a server that stopped answering at all.
const FEEDBACK_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct FeedbackClient {
    base_url: String,
    client: Client,
}

impl FeedbackClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let base_url = config
            .client
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", config.server.port));
        Self::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is running by trying to connect
    pub async fn is_server_running(&self) -> bool {
        self.client
            .get(format!("{}/healthz", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok()
    }

    /// The inbound tool call: request feedback on a one-line summary. Both
    /// inputs are reduced to their first line before they reach the server.
    pub async fn interactive_feedback(
        &self,
        project_directory: &str,
        summary: &str,
    ) -> Result<FeedbackResult> {
        let request = FeedbackRequest {
            project_directory: first_line(project_directory).to_string(),
            prompt: first_line(summary).to_string(),
            server_save_path: None,
        };
        self.run_feedback(&request).await
    }

    /// Post one feedback request and wait for the user's answer. Blocks for
    /// as long as the person takes, up to the server's session timeout.
    pub async fn run_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResult> {
        let url = format!("{}/run_feedback_ui/", self.base_url);
        tracing::debug!("Making POST request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(FEEDBACK_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Feedback request failed: {} - {}",
                status,
                error_text
            ));
        }

        let response_text = response.text().await?;
        let result: FeedbackResult = serde_json::from_str(&response_text)
            .map_err(|e| anyhow!("Failed to parse feedback response: {}", e))?;
        Ok(result)
    }
}
