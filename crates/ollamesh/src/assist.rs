//! Assistive one-shot completions: chat titles, context compression, and
//! agent plans.
//!
//! These all go against the local endpoint through the retrying transport
//! and degrade gracefully: a failed title is an empty string, a failed
//! summary is a fixed notice, a failed plan is a single manual step. None
//! of them can abort the caller's flow.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::NodeClient;
use crate::config::GatewaySettings;
use crate::protocol::OneShotOptions;
use crate::transport::RetryConfig;

/// Longest slice of the first message fed to the title prompt.
const TITLE_INPUT_CHARS: usize = 150;

/// Returned when the summarization model cannot be reached.
pub const SUMMARY_UNAVAILABLE: &str = "Context summarization unavailable.";

/// Generate a 3-5 word title for a new chat from its first message.
/// Returns an empty string on any failure.
pub async fn smart_title(
    client: &NodeClient,
    settings: &GatewaySettings,
    retry: &RetryConfig,
    first_message: &str,
) -> String {
    let excerpt: String = first_message.chars().take(TITLE_INPUT_CHARS).collect();
    let prompt = format!(
        "Create a 3-5 word title for this chat: \"{excerpt}\". \
         Return ONLY the title. No quotes."
    );
    let options = OneShotOptions {
        temperature: Some(0.7),
        ..Default::default()
    };
    match client
        .one_shot(&settings.endpoint, &settings.model, &prompt, options, false, retry)
        .await
    {
        Ok(response) => response.trim().trim_matches('"').to_string(),
        Err(err) => {
            warn!("smart title generation failed: {err}");
            String::new()
        }
    }
}

/// Compress `text` into a dense factual summary for long-term memory.
/// Returns [`SUMMARY_UNAVAILABLE`] on failure and an empty string for
/// blank input.
pub async fn summarize_context(
    client: &NodeClient,
    settings: &GatewaySettings,
    retry: &RetryConfig,
    text: &str,
) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let prompt = format!(
        "<system>You are a Context Compression Engine. \
         Create a dense, factual summary.</system>\n<input>{text}</input>"
    );
    let options = OneShotOptions {
        num_ctx: Some(8192),
        temperature: Some(0.3),
    };
    match client
        .one_shot(&settings.endpoint, &settings.model, &prompt, options, false, retry)
        .await
    {
        Ok(summary) => summary,
        Err(err) => {
            warn!("context summarization failed: {err}");
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

/// One step of an agent execution plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub status: PlanStepStatus,
}

impl PlanStep {
    fn pending(index: usize, description: String) -> Self {
        Self {
            id: format!("step-{}", index + 1),
            description,
            status: PlanStepStatus::Pending,
        }
    }
}

/// Break `goal` into 3-8 ordered steps via a JSON-constrained one-shot
/// call at temperature 0. On any failure the plan degrades to a single
/// step telling the operator to proceed manually.
pub async fn generate_plan(
    client: &NodeClient,
    settings: &GatewaySettings,
    retry: &RetryConfig,
    goal: &str,
) -> Vec<PlanStep> {
    info!("generating agent execution plan");
    let prompt = format!(
        "<role>You are an Autonomous Agent Planner.</role>\n\
         <goal>{goal}</goal>\n\
         <instruction>Break this goal into 3-8 sequential, executable steps. \
         Return ONLY a valid JSON Array of strings.</instruction>"
    );
    let options = OneShotOptions {
        temperature: Some(0.0),
        ..Default::default()
    };
    let response = client
        .one_shot(&settings.endpoint, &settings.model, &prompt, options, true, retry)
        .await;

    match response.map(|raw| parse_plan_steps(&raw)) {
        Ok(Some(steps)) if !steps.is_empty() => steps,
        Ok(_) => {
            warn!("planner returned unusable JSON, falling back to manual step");
            fallback_plan(goal)
        }
        Err(err) => {
            warn!("plan generation failed: {err}");
            fallback_plan(goal)
        }
    }
}

fn fallback_plan(goal: &str) -> Vec<PlanStep> {
    vec![PlanStep::pending(0, format!("Auto-plan failed. Proceed with: {goal}"))]
}

/// Parse the planner's raw response into steps.
///
/// Models wrap JSON in code fences or prose more often than not, so the
/// cleanup strips fences and then takes the outermost bracketed slice
/// before handing it to serde. Non-string array elements are kept as
/// their JSON text.
fn parse_plan_steps(raw: &str) -> Option<Vec<PlanStep>> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    let body = cleaned.get(start..=end)?;

    let array: Vec<serde_json::Value> = serde_json::from_str(body).ok()?;
    Some(
        array
            .into_iter()
            .enumerate()
            .map(|(i, step)| match step {
                serde_json::Value::String(s) => PlanStep::pending(i, s),
                other => PlanStep::pending(i, other.to_string()),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_clean_json_array() {
        let steps = parse_plan_steps(r#"["research", "draft", "review"]"#).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].id, "step-1");
        assert_eq!(steps[0].description, "research");
        assert_eq!(steps[2].status, PlanStepStatus::Pending);
    }

    #[test]
    fn plan_strips_code_fences_and_prose() {
        let raw = "Here is the plan:\n```json\n[\"a\", \"b\"]\n```\nGood luck!";
        let steps = parse_plan_steps(raw).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].description, "b");
    }

    #[test]
    fn plan_keeps_non_string_elements_as_json_text() {
        let steps = parse_plan_steps(r#"[{"step": "deploy"}]"#).unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].description.contains("deploy"));
    }

    #[test]
    fn plan_rejects_missing_or_unparsable_array() {
        assert!(parse_plan_steps("no json here").is_none());
        assert!(parse_plan_steps(r#"{"steps": "not a list"}"#).is_none());
        // An embedded empty array parses but yields no usable steps; the
        // caller treats that as a failure too.
        assert_eq!(parse_plan_steps("[]").map(|s| s.len()), Some(0));
    }

    #[test]
    fn fallback_names_the_goal() {
        let plan = fallback_plan("ship the release");
        assert_eq!(plan.len(), 1);
        assert!(plan[0].description.contains("ship the release"));
    }
}
