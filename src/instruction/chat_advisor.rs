//! Advisor backed by an OpenAI-style chat completions endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::errors::AdvisorError;
use crate::settings::AdvisorSettings;

use super::advisor::{Advisor, AdvisorPrompt};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const SYSTEM_PROMPT: &str = "You supervise an AI coding assistant inside an IDE. \
Given its latest output, reply with one short, concrete instruction (50 to 300 characters) \
that keeps the project moving toward working core functionality. \
Prefer the simplest fix for errors and avoid polishing details. Reply with the instruction only.";

pub struct ChatCompletionsAdvisor {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatCompletionsAdvisor {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Reads the API key from the environment variable the settings name.
    pub fn from_settings(settings: &AdvisorSettings) -> Self {
        let api_key = std::env::var(&settings.api_key_env).ok();
        if api_key.is_none() {
            log_warn!(
                "{} is not set; advisor requests will be sent without credentials",
                settings.api_key_env
            );
        }
        Self::new(settings.endpoint.clone(), settings.model.clone(), api_key)
    }
}

fn status_error(status: StatusCode, body: &str) -> AdvisorError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdvisorError::Auth(status.as_u16()),
        StatusCode::TOO_MANY_REQUESTS => AdvisorError::Quota,
        _ => AdvisorError::Http(format!("advisor returned {status}: {body}")),
    }
}

fn extract_content(response: ChatResponse) -> Result<String, AdvisorError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| AdvisorError::Malformed("missing choices[0].message.content".into()))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(AdvisorError::Empty);
    }
    Ok(content.to_string())
}

#[async_trait]
impl Advisor for ChatCompletionsAdvisor {
    async fn complete(&self, prompt: &AdvisorPrompt) -> Result<String, AdvisorError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt.to_user_message() },
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(status_error(status, &body));
        }

        let parsed: ChatResponse = response.json().await?;
        extract_content(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> ChatResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn content_is_read_from_first_choice() {
        let response = parse(r#"{"choices":[{"message":{"role":"assistant","content":"  Fix the import.  "}}]}"#);
        assert_eq!(extract_content(response).unwrap(), "Fix the import.");
    }

    #[test]
    fn missing_content_is_malformed() {
        assert!(matches!(
            extract_content(parse(r#"{"choices":[]}"#)),
            Err(AdvisorError::Malformed(_))
        ));
        assert!(matches!(
            extract_content(parse(r#"{"choices":[{"message":{}}]}"#)),
            Err(AdvisorError::Malformed(_))
        ));
    }

    #[test]
    fn blank_content_is_empty() {
        let response = parse(r#"{"choices":[{"message":{"content":"   "}}]}"#);
        assert!(matches!(extract_content(response), Err(AdvisorError::Empty)));
    }

    #[test]
    fn statuses_map_to_advisor_errors() {
        assert!(matches!(status_error(StatusCode::UNAUTHORIZED, ""), AdvisorError::Auth(401)));
        assert!(matches!(status_error(StatusCode::FORBIDDEN, ""), AdvisorError::Auth(403)));
        assert!(matches!(status_error(StatusCode::TOO_MANY_REQUESTS, ""), AdvisorError::Quota));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream"),
            AdvisorError::Http(_)
        ));
    }
}
