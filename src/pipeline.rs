//! The job pipeline: a linear state machine that takes one change request
//! from clone to pull request, streaming progress into an event sink. Every
//! run emits exactly one terminal event and tears its workspace down no
//! matter how it ends.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::errors::{GitHubError, JobError};
use crate::events::EventSink;
use crate::github::{SourceControl, TreeEntry, generate_branch_name, parse_repo_url};
use crate::models::{Job, PullRequestRecord, RepoRef};
use crate::planner::ModelProvider;
use crate::validate::validate_plan;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    AcquireRepo,
    ExtractContext,
    ProposeEdits,
    ValidateEdits,
    ApplyEdits,
    PublishBranch,
    OpenPullRequest,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::AcquireRepo => "ACQUIRE_REPO",
            Self::ExtractContext => "EXTRACT_CONTEXT",
            Self::ProposeEdits => "PROPOSE_EDITS",
            Self::ValidateEdits => "VALIDATE_EDITS",
            Self::ApplyEdits => "APPLY_EDITS",
            Self::PublishBranch => "PUBLISH_BRANCH",
            Self::OpenPullRequest => "OPEN_PULL_REQUEST",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current pipeline state, shared with the deadline/cancellation arms so the
/// terminal error event can name the state that was active.
#[derive(Clone)]
struct StateTracker(Arc<Mutex<JobState>>);

impl StateTracker {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(JobState::Init)))
    }

    fn set(&self, state: JobState) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn get(&self) -> JobState {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Record the transition and emit its progress event. One event per state.
async fn enter_state(
    sink: &EventSink,
    tracker: &StateTracker,
    state: JobState,
    message: &str,
    mut data: serde_json::Value,
) -> Result<(), JobError> {
    tracker.set(state);
    if let Some(object) = data.as_object_mut() {
        object.insert("state".to_string(), json!(state.as_str()));
    }
    sink.progress_with(message, data).await?;
    Ok(())
}

pub struct Orchestrator {
    config: AppConfig,
    source_control: Arc<dyn SourceControl>,
    model: Arc<dyn ModelProvider>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        source_control: Arc<dyn SourceControl>,
        model: Arc<dyn ModelProvider>,
    ) -> Self {
        Self {
            config,
            source_control,
            model,
        }
    }

    /// Drive one job to its terminal event. Runs under the job deadline and
    /// stops at the next suspension point if the caller goes away; in both
    /// cases the workspace is still torn down.
    pub async fn run(&self, job: Job, sink: EventSink) {
        let tracker = StateTracker::new();
        let mut workspace: Option<Workspace> = None;

        let outcome = tokio::select! {
            _ = sink.closed() => Err(JobError::Cancelled),
            res = tokio::time::timeout(
                job.timeout,
                self.run_pipeline(&job, &sink, &tracker, &mut workspace),
            ) => match res {
                Ok(inner) => inner,
                Err(_) => Err(JobError::Timeout {
                    after_ms: job.timeout.as_millis() as u64,
                }),
            },
        };

        if let Some(ws) = workspace.as_mut() {
            ws.release().await;
        }

        match outcome {
            Ok(record) => {
                tracker.set(JobState::Done);
                info!(job = %job.id, pr = %record.pr_url, "Job finished");
                let payload = serde_json::to_value(&record).unwrap_or_else(|_| json!({}));
                let _ = sink
                    .success(format!("Pull request created: {}", record.pr_url), payload)
                    .await;
            }
            Err(JobError::Cancelled) => {
                // The caller is gone; nobody is listening for a terminal event.
                info!(job = %job.id, state = tracker.get().as_str(), "Job cancelled by the caller");
            }
            Err(err) => {
                let state = tracker.get();
                error!(job = %job.id, state = state.as_str(), kind = err.kind(), error = %err, "Job failed");
                tracker.set(JobState::Failed);
                let _ = sink
                    .error(
                        err.to_string(),
                        json!({ "state": state.as_str(), "kind": err.kind() }),
                    )
                    .await;
            }
        }
    }

    async fn run_pipeline(
        &self,
        job: &Job,
        sink: &EventSink,
        tracker: &StateTracker,
        workspace_slot: &mut Option<Workspace>,
    ) -> Result<PullRequestRecord, JobError> {
        enter_state(
            sink,
            tracker,
            JobState::Init,
            "Starting code change request",
            json!({ "jobId": job.id }),
        )
        .await?;

        // ACQUIRE_REPO
        enter_state(
            sink,
            tracker,
            JobState::AcquireRepo,
            &format!("Cloning repository {}", job.repo_url),
            json!({}),
        )
        .await?;
        let repo = parse_repo_url(&job.repo_url)
            .ok_or_else(|| JobError::InvalidRepoUrl(job.repo_url.clone()))?;
        let metadata = self
            .source_control
            .repo_metadata(&repo)
            .await
            .map_err(|e| match e {
                // A 404 on the repo itself means the URL names nothing we can reach.
                GitHubError::NotFound(_) => JobError::InvalidRepoUrl(job.repo_url.clone()),
                other => JobError::from(other),
            })?;
        let base_branch = metadata.base_branch().to_string();
        let branch = generate_branch_name(&self.config.branch_prefix, &job.prompt);
        debug!(job = %job.id, repo = %repo, branch = %branch, base = %base_branch, "Acquired repository metadata");

        let ws = workspace_slot
            .insert(Workspace::acquire(&self.config.workspace_root, &branch).await?);
        let clone_url = self.source_control.clone_url(&repo);
        ws.clone_repo(&clone_url, &branch).await?;

        // EXTRACT_CONTEXT
        enter_state(
            sink,
            tracker,
            JobState::ExtractContext,
            "Analyzing codebase",
            json!({}),
        )
        .await?;
        let context = ws.snapshot_context().await?;
        // Best-effort: the analysis enriches the stream but never fails the job.
        match self.model.analyze_codebase(&context).await {
            Ok(analysis) => {
                sink.progress_with("Codebase analysis complete", json!({ "analysis": analysis }))
                    .await?;
            }
            Err(e) => warn!(job = %job.id, error = %e, "Codebase analysis unavailable"),
        }

        // PROPOSE_EDITS
        enter_state(
            sink,
            tracker,
            JobState::ProposeEdits,
            "Generating code changes",
            json!({}),
        )
        .await?;
        let plan = self
            .model
            .propose_edits(&job.repo_url, &job.prompt, &context)
            .await?;
        let plan_bytes: usize = plan.changes.iter().map(|e| e.content_len()).sum();
        info!(job = %job.id, changes = plan.changes.len(), bytes = plan_bytes, "Model proposed an edit plan");

        // VALIDATE_EDITS
        enter_state(
            sink,
            tracker,
            JobState::ValidateEdits,
            "Validating proposed changes",
            json!({ "changes": plan.changes.len() }),
        )
        .await?;
        validate_plan(&plan, ws.path())?;

        // APPLY_EDITS
        enter_state(
            sink,
            tracker,
            JobState::ApplyEdits,
            "Applying changes",
            json!({}),
        )
        .await?;
        ws.apply(&plan).await?;
        let commit_sha = ws.commit(&plan.summary).await?;
        debug!(job = %job.id, sha = %commit_sha, "Committed changes locally");

        // PUBLISH_BRANCH
        enter_state(
            sink,
            tracker,
            JobState::PublishBranch,
            &format!("Pushing branch {}", branch),
            json!({ "branch": branch }),
        )
        .await?;
        let base_sha = self.source_control.branch_sha(&repo, &base_branch).await?;
        self.source_control
            .create_branch_ref(&repo, &branch, &base_sha)
            .await?;
        if let Err(push_err) = ws.push(&branch).await {
            warn!(job = %job.id, error = %push_err, "Transport push failed, publishing through the REST API");
            self.publish_via_api(&repo, &branch, &plan).await?;
        }

        // OPEN_PULL_REQUEST
        enter_state(
            sink,
            tracker,
            JobState::OpenPullRequest,
            "Creating pull request",
            json!({}),
        )
        .await?;
        let pr = self
            .source_control
            .create_pull_request(&repo, &job.prompt, &plan.summary, &branch, &base_branch)
            .await?;

        Ok(PullRequestRecord {
            pr_url: pr.html_url,
            pr_number: pr.number,
            branch_name: branch,
            summary: plan.summary,
            changes: plan.changes,
        })
    }

    /// Replay the committed plan through the trees/commits API when the git
    /// transport cannot reach the remote.
    async fn publish_via_api(
        &self,
        repo: &RepoRef,
        branch: &str,
        plan: &crate::models::EditPlan,
    ) -> Result<(), JobError> {
        let head_sha = self.source_control.branch_sha(repo, branch).await?;
        let base_tree = self.source_control.commit_tree_sha(repo, &head_sha).await?;
        let entries: Vec<TreeEntry> = plan.changes.iter().map(TreeEntry::from_edit).collect();
        let tree_sha = self
            .source_control
            .create_tree(repo, &base_tree, &entries)
            .await?;
        let commit_sha = self
            .source_control
            .create_commit(repo, &plan.summary, &tree_sha, &head_sha)
            .await?;
        self.source_control
            .update_branch_ref(repo, branch, &commit_sha)
            .await?;
        Ok(())
    }
}
