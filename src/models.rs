use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One change request, alive from gateway accept until workspace teardown.
/// The id only ever appears in log lines.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub repo_url: String,
    pub prompt: String,
    pub model: String,
    pub timeout: Duration,
}

impl Job {
    pub fn new(repo_url: &str, prompt: &str, model: &str, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_url: repo_url.to_string(),
            prompt: prompt.to_string(),
            model: model.to_string(),
            timeout,
        }
    }
}

/// Owner and repository name parsed out of a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Create,
    Modify,
    Delete,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("Invalid edit kind: {}", s)),
        }
    }
}

/// One file-level edit proposed by the model. `content` is the complete new
/// file body for create/modify, never a diff; it stays absent for delete.
/// The wire names (`file`, `type`) are what the model is instructed to emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edit {
    #[serde(rename = "file")]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EditKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Edit {
    pub fn content_len(&self) -> usize {
        self.content.as_deref().map(str::len).unwrap_or(0)
    }
}

/// The model's full answer: ordered edits plus a human summary. The summary
/// doubles as commit message and pull request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EditPlan {
    pub changes: Vec<Edit>,
    pub summary: String,
}

/// Payload of the terminal success event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRecord {
    pub pr_url: String,
    pub pr_number: u64,
    pub branch_name: String,
    pub summary: String,
    pub changes: Vec<Edit>,
}
