//! C10 — Plan Generator.
//!
//! Turns a task plus retrieved context into an ordered list of file
//! modification steps (spec §4.10): enumerate the project, prompt the
//! planner model, extract a JSON array robustly, validate shape, rewrite or
//! demote steps referencing missing files, and apply architectural
//! placement.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agents::ReflectiveOperatorBase;
use crate::architecture::{resolve_placement, ArchitecturalContext};
use crate::error::{FactoryError, Result};
use crate::providers::filesystem::ProjectFilesystem;
use crate::providers::llm::ModelTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepAction::Create => "create",
            StepAction::Modify => "modify",
            StepAction::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationStep {
    pub file: String,
    pub action: StepAction,
    pub what: String,
    pub how: String,
    #[serde(default)]
    pub architectural_note: Option<String>,
}

pub type Plan = Vec<ModificationStep>;

#[derive(Debug, Deserialize)]
struct RawStep {
    file: String,
    action: String,
    what: String,
    how: String,
}

pub struct PlanGenerator {
    filesystem: Arc<dyn ProjectFilesystem>,
    base: Arc<ReflectiveOperatorBase>,
    call_counter: AtomicUsize,
}

impl PlanGenerator {
    /// `base` is shared with the rest of the orchestration agent, so every
    /// planner call is gated by the same budget scope and recorded onto the
    /// same phase cost trajectory (spec §4.6).
    pub fn new(filesystem: Arc<dyn ProjectFilesystem>, base: Arc<ReflectiveOperatorBase>) -> Self {
        Self {
            filesystem,
            base,
            call_counter: AtomicUsize::new(0),
        }
    }

    fn build_prompt(task: &str, retrieved_context: &str, project_files: &[String], language: &str) -> String {
        let context_block = if retrieved_context.is_empty() {
            "[no context retrieved]".to_string()
        } else {
            retrieved_context.to_string()
        };
        format!(
            "You are planning a code change.\n\
             Project language: {language}\n\
             Existing files:\n{}\n\n\
             Retrieved context:\n{context_block}\n\n\
             User request: {task}\n\n\
             Rules: respect existing module boundaries, place new files according to \
             the project's placement conventions, and generate code matching the \
             style of existing templates. Respond with a JSON array of objects, each \
             with exactly the fields \"file\", \"action\" (one of create, modify, \
             delete), \"what\", and \"how\".",
            project_files.join("\n"),
        )
    }

    /// Tries a fenced ```json block first, then a fenced block with no
    /// language tag, then a raw bracket slice (spec §4.10 step 3).
    fn extract_json_array(text: &str) -> Option<&str> {
        if let Some(body) = Self::fenced_block(text, "```json") {
            return Some(body);
        }
        if let Some(body) = Self::fenced_block(text, "```") {
            return Some(body);
        }
        let start = text.find('[')?;
        let end = text.rfind(']')?;
        if end > start {
            Some(&text[start..=end])
        } else {
            None
        }
    }

    fn fenced_block<'a>(text: &'a str, opening: &str) -> Option<&'a str> {
        let start = text.find(opening)? + opening.len();
        let rest = &text[start..];
        let end = rest.find("```")?;
        Some(rest[..end].trim())
    }

    async fn demote_or_rewrite(
        &self,
        project_root: &Path,
        mut raw: RawStep,
        action: StepAction,
    ) -> Result<ModificationStep> {
        if action == StepAction::Create {
            return Ok(ModificationStep {
                file: raw.file,
                action,
                what: raw.what,
                how: raw.how,
                architectural_note: None,
            });
        }

        if self.filesystem.file_exists(project_root, &raw.file).await {
            return Ok(ModificationStep {
                file: raw.file,
                action,
                what: raw.what,
                how: raw.how,
                architectural_note: None,
            });
        }

        let basename = raw.file.rsplit('/').next().unwrap_or(&raw.file).to_lowercase();
        let existing_files = self.filesystem.list_files(project_root).await?;
        if let Some(found) = existing_files
            .iter()
            .find(|f| f.rsplit('/').next().unwrap_or(f).to_lowercase() == basename)
        {
            raw.file = found.clone();
            return Ok(ModificationStep {
                file: raw.file,
                action,
                what: raw.what,
                how: raw.how,
                architectural_note: None,
            });
        }

        warn!(file = %raw.file, "referenced file missing, demoting modify to create");
        Ok(ModificationStep {
            file: raw.file,
            action: StepAction::Create,
            what: raw.what,
            how: raw.how,
            architectural_note: Some("demoted from modify to create: referenced file did not exist".to_string()),
        })
    }

    /// Generates and validates a plan (spec §4.10 steps 1-6).
    pub async fn generate(
        &self,
        task: &str,
        retrieved_context: &str,
        project_root: &Path,
        language: &str,
        architectural_context: Option<&ArchitecturalContext>,
    ) -> Result<Plan> {
        let project_files = self.filesystem.list_files(project_root).await?;
        let prompt = Self::build_prompt(task, retrieved_context, &project_files, language);

        let step_id = format!("plan-{}", self.call_counter.fetch_add(1, Ordering::SeqCst));
        let record = self
            .base
            .execute_reasoning_step(&step_id, &prompt, ModelTier::Highest)
            .await?
            .ok_or_else(|| FactoryError::BudgetDenied("plan generation refused by budget scope".to_string()))?;

        let json_slice = Self::extract_json_array(&record.response)
            .ok_or_else(|| FactoryError::InvalidOutput("planner did not return a JSON array".to_string()))?;
        let raw_steps: Vec<RawStep> = serde_json::from_str(json_slice)
            .map_err(|e| FactoryError::InvalidOutput(format!("malformed plan JSON: {e}")))?;

        let mut plan = Vec::with_capacity(raw_steps.len());
        for raw in raw_steps {
            if raw.file.is_empty() || raw.what.is_empty() || raw.how.is_empty() {
                return Err(FactoryError::InvalidOutput("plan step missing a required field".to_string()));
            }
            let action = match raw.action.as_str() {
                "create" => StepAction::Create,
                "modify" => StepAction::Modify,
                "delete" => StepAction::Delete,
                other => return Err(FactoryError::InvalidOutput(format!("invalid action: {other}"))),
            };
            let mut step = self.demote_or_rewrite(project_root, raw, action).await?;

            if let Some(context) = architectural_context {
                if step.action != StepAction::Delete {
                    if let Some((rewritten, note)) = resolve_placement(context, &step.what, &step.file) {
                        step.file = rewritten;
                        step.architectural_note = Some(note);
                    }
                }
            }

            plan.push(step);
        }

        Ok(plan)
    }
}
