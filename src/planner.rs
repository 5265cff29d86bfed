//! Model adapter: turns a change request plus repository context into a
//! structured edit plan via an OpenAI-compatible chat completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::models::EditPlan;

// Low temperature keeps generated plans consistent across retries of the
// same request.
const EDIT_TEMPERATURE: f32 = 0.1;
const EDIT_MAX_TOKENS: u32 = 2000;

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 500;

const EDIT_SYSTEM_PROMPT: &str = "You are a coding assistant that helps implement code changes. \
     Please provide your response in valid JSON format.";

fn edit_user_prompt(repo_url: &str, prompt: &str, context: &str) -> String {
    format!(
        r#"Repository: {repo_url}
Request: {prompt}

Codebase Context:
{context}

Please implement the requested changes and provide your response in this JSON format:

{{
  "changes": [
    {{
      "file": "path/to/file.js",
      "type": "modify|create|delete",
      "content": "new content or null for delete",
      "description": "what this change does"
    }}
  ],
  "summary": "Brief summary of all changes made"
}}

Rules:
- Use "modify" for existing files that need changes
- Use "create" for new files
- Use "delete" for files to be removed (content should be null)
- Provide full file content for "create" and "modify" operations
- Ensure all file paths are relative to the repository root"#
    )
}

fn analysis_user_prompt(context: &str) -> String {
    format!(
        r#"Analyze this codebase and provide a brief overview of its structure, main technologies used, and key files.

Codebase:
{context}

Provide a concise analysis focusing on:
- Main technologies and frameworks
- Project structure
- Key entry points
- Configuration files"#
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    /// Null when the provider refuses or fails to generate.
    #[serde(default)]
    content: Option<String>,
}

/// First balanced `{...}` object in the completion, tolerating prose and
/// markdown fences around it. Braces inside string literals don't count.
fn extract_json_object(content: &str) -> Option<&str> {
    for (start, ch) in content.char_indices() {
        if ch != '{' {
            continue;
        }
        if let Some(end) = balanced_object_end(content, start) {
            return Some(&content[start..end]);
        }
    }
    None
}

fn balanced_object_end(content: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate_for_error(content: &str) -> String {
    content.chars().take(200).collect()
}

/// Parse a completion into an edit plan. `changes` and `summary` are both
/// required; anything not shaped that way is unparseable.
fn parse_edit_plan(content: &str) -> Result<EditPlan, ModelError> {
    let object = extract_json_object(content)
        .ok_or_else(|| ModelError::Unparseable(truncate_for_error(content)))?;
    serde_json::from_str(object)
        .map_err(|e| ModelError::Unparseable(format!("{}: {}", e, truncate_for_error(object))))
}

/// The completion text, or `NoChanges` when the provider returned nothing.
fn completion_content(resp: ChatResponse) -> Result<String, ModelError> {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(ModelError::NoChanges);
    }
    Ok(content)
}

/// Contract-level view of the model provider. Orchestrator tests substitute
/// a scripted implementation.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Propose a full edit plan for the change request.
    async fn propose_edits(
        &self,
        repo_url: &str,
        prompt: &str,
        context: &str,
    ) -> Result<EditPlan, ModelError>;

    /// Short prose overview of the codebase. Callers treat failures here as
    /// advisory, not fatal.
    async fn analyze_codebase(&self, context: &str) -> Result<String, ModelError>;
}

pub struct ModelClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl ModelClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
            model: model.into(),
        }
    }

    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens,
        };
        let resp = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Unavailable(format!(
                "API error {}: {}",
                status.as_u16(),
                truncate_for_error(&body)
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Unavailable(format!("Unparseable response body: {}", e)))?;
        completion_content(parsed)
    }
}

#[async_trait]
impl ModelProvider for ModelClient {
    async fn propose_edits(
        &self,
        repo_url: &str,
        prompt: &str,
        context: &str,
    ) -> Result<EditPlan, ModelError> {
        let messages = vec![
            ChatMessage {
                role: "system",
                content: EDIT_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: edit_user_prompt(repo_url, prompt, context),
            },
        ];
        let content = self
            .complete(messages, EDIT_TEMPERATURE, EDIT_MAX_TOKENS)
            .await?;
        parse_edit_plan(&content)
    }

    async fn analyze_codebase(&self, context: &str) -> Result<String, ModelError> {
        let messages = vec![ChatMessage {
            role: "user",
            content: analysis_user_prompt(context),
        }];
        self.complete(messages, ANALYSIS_TEMPERATURE, ANALYSIS_MAX_TOKENS)
            .await
    }
}
