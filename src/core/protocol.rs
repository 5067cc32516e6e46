use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One feedback request, as posted to the broker and handed to the session
/// host. Owned by a single call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub project_directory: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_save_path: Option<String>,
}

/// What a session produces: everything that ran through the log buffer plus
/// the user's reply. `interactive_feedback` is empty when the user cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResult {
    pub logs: String,
    pub interactive_feedback: String,
}

/// Persisted form of a result, written when a request sets
/// `server_save_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub logs: String,
    pub interactive_feedback: String,
    pub saved_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(result: &FeedbackResult) -> Self {
        Self {
            logs: result.logs.clone(),
            interactive_feedback: result.interactive_feedback.clone(),
            saved_at: Utc::now(),
        }
    }
}

/// Reduce free-form text to its first line, trimmed. Both tool-call inputs
/// pass through this before they reach the broker.
pub fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_takes_only_the_first_line() {
        assert_eq!(first_line("summary here\nsecond line\nthird"), "summary here");
    }

    #[test]
    fn first_line_trims_whitespace() {
        assert_eq!(first_line("  padded  \r\nrest"), "padded");
        assert_eq!(first_line(""), "");
        assert_eq!(first_line("\n\n"), "");
    }

    #[test]
    fn request_omits_absent_save_path() {
        let request = FeedbackRequest {
            project_directory: "/tmp/proj".to_string(),
            prompt: "done?".to_string(),
            server_save_path: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("server_save_path"));
    }
}
