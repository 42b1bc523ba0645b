//! C11 — Step Executor.
//!
//! Walks a plan in order, retrieving per-step context, invoking the
//! modifier model, sanitizing its output, and collecting modified files and
//! deferred deletions (spec §4.11). Stops at the first hard failure,
//! matching `workflow/modification/execute_cycle.py`'s short-circuit
//! behavior (SPEC_FULL §9 Resolved Open Question 3).

pub mod diff;
pub mod sanitize;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::agents::knowledge::KnowledgeRetriever;
use crate::agents::ReflectiveOperatorBase;
use crate::error::Result;
use crate::planning::{ModificationStep, Plan, StepAction};
use crate::providers::filesystem::ProjectFilesystem;
use crate::providers::llm::ModelTier;

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub modified_files: HashMap<String, String>,
    pub files_to_delete: Vec<String>,
    pub fallbacks_applied: Vec<String>,
}

#[derive(Debug)]
pub struct StepExecutionError {
    pub failed_step: ModificationStep,
    pub error: String,
}

impl std::fmt::Display for StepExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step on '{}' failed: {}", self.failed_step.file, self.error)
    }
}

pub struct StepExecutor {
    filesystem: Arc<dyn ProjectFilesystem>,
    base: Arc<ReflectiveOperatorBase>,
    knowledge: Option<Arc<KnowledgeRetriever>>,
    call_counter: AtomicUsize,
}

impl StepExecutor {
    /// `base` is shared with the rest of the orchestration agent, so every
    /// modifier call is gated by the same budget scope and recorded onto the
    /// same phase cost trajectory (spec §4.6).
    pub fn new(
        filesystem: Arc<dyn ProjectFilesystem>,
        base: Arc<ReflectiveOperatorBase>,
        knowledge: Option<Arc<KnowledgeRetriever>>,
    ) -> Self {
        Self {
            filesystem,
            base,
            knowledge,
            call_counter: AtomicUsize::new(0),
        }
    }

    async fn retrieve_step_context(&self, step: &ModificationStep) -> String {
        let Some(retriever) = &self.knowledge else {
            return String::new();
        };
        let query = format!("{} {}", step.what, step.how);
        retriever.retrieve_context(&query, 5).await
    }

    fn build_modifier_prompt(step: &ModificationStep, existing_content: Option<&str>, context: &str) -> String {
        let context_block = if context.is_empty() { "[no context]" } else { context };
        let existing_block = existing_content.unwrap_or("[new file]");
        format!(
            "Modify file: {}\nAction: {}\nWhat: {}\nHow: {}\n\nExisting content:\n{}\n\nRelevant context:\n{}\n\n\
             Respond with either the complete new file body, or a unified diff.",
            step.file, step.action, step.what, step.how, existing_block, context_block
        )
    }

    fn language_for(path: &str) -> &'static str {
        if path.ends_with(".py") {
            "python"
        } else if path.ends_with(".rs") {
            "rust"
        } else if path.ends_with(".js") || path.ends_with(".jsx") {
            "javascript"
        } else {
            "text"
        }
    }

    async fn apply_modifier_output(
        &self,
        project_root: &Path,
        step: &ModificationStep,
        raw_output: &str,
    ) -> std::result::Result<String, String> {
        let language = Self::language_for(&step.file);
        let body = if diff::looks_like_unified_diff(raw_output) {
            let existing = self
                .filesystem
                .read_file(project_root, &step.file)
                .await
                .map_err(|e| e.to_string())?
                .unwrap_or_default();
            diff::apply_unified_diff(&existing, raw_output)?
        } else {
            raw_output.to_string()
        };

        let sanitized = sanitize::sanitize_generated_code(&body, language);
        if sanitized.fallback_applied {
            warn!(file = %step.file, "modifier output fell back to minimal template");
        }
        Ok(sanitized.content)
    }

    /// Executes `plan` in order, stopping at the first hard failure. Yields
    /// the accumulated modifications plus the deferred delete list (spec
    /// §4.11, §9 Resolved Open Question 2: deletes run after all
    /// create/modify writes have been computed here, and are applied by the
    /// caller after all writes succeed).
    pub async fn execute(
        &self,
        plan: &Plan,
        project_root: &Path,
    ) -> std::result::Result<ExecutionOutcome, StepExecutionError> {
        let mut modified_files = HashMap::new();
        let mut files_to_delete = Vec::new();
        let mut fallbacks_applied = Vec::new();

        for step in plan {
            if step.action == StepAction::Delete {
                files_to_delete.push(step.file.clone());
                continue;
            }

            let context = self.retrieve_step_context(step).await;
            let existing_content = self
                .filesystem
                .read_file(project_root, &step.file)
                .await
                .map_err(|e| StepExecutionError {
                    failed_step: step.clone(),
                    error: e.to_string(),
                })?;

            let prompt = Self::build_modifier_prompt(step, existing_content.as_deref(), &context);
            let step_id = format!("exec-{}", self.call_counter.fetch_add(1, Ordering::SeqCst));
            let record = match self.base.execute_reasoning_step(&step_id, &prompt, ModelTier::Middle).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    return Err(StepExecutionError {
                        failed_step: step.clone(),
                        error: "modifier call refused by budget scope".to_string(),
                    })
                }
                Err(e) => {
                    return Err(StepExecutionError {
                        failed_step: step.clone(),
                        error: e.to_string(),
                    })
                }
            };

            let content = self
                .apply_modifier_output(project_root, step, &record.response)
                .await
                .map_err(|error| StepExecutionError {
                    failed_step: step.clone(),
                    error,
                })?;

            if content.contains("could not generate valid code") {
                fallbacks_applied.push(step.file.clone());
            }

            info!(file = %step.file, action = %step.action, "step executed");
            modified_files.insert(step.file.clone(), content);
        }

        Ok(ExecutionOutcome {
            modified_files,
            files_to_delete,
            fallbacks_applied,
        })
    }
}

/// Applies an [`ExecutionOutcome`] to disk: writes modified files, then
/// deletes — matching the source's defer-deletes-to-the-end ordering.
pub async fn commit_outcome(
    filesystem: &dyn ProjectFilesystem,
    project_root: &Path,
    outcome: &ExecutionOutcome,
) -> Result<()> {
    for (path, content) in &outcome.modified_files {
        filesystem.write_file(project_root, path, content).await?;
    }
    for path in &outcome.files_to_delete {
        filesystem.delete_file(project_root, path).await?;
    }
    Ok(())
}
