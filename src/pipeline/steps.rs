use super::{PipelineContext, StepName, StepRole, fallback};
use crate::extract::Decision;

pub const SYSTEM_PROMPT: &str = "You are a cybersecurity analyst assistant. Your goal is to provide accurate, helpful information about cybersecurity topics.";

/// What to do when the generation engine fails during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// End the stream with a terminal error record.
    Abort,
    /// Use the step's deterministic fallback; the data to present is already
    /// in hand and must not be held hostage by the model.
    Fallback,
}

/// Immutable template for one stage of the tool pipeline. The full sequence
/// is a closed table; adding a stage is a data change here, not new control
/// flow in the orchestrator.
pub struct StepDefinition {
    pub name: StepName,
    pub role: StepRole,
    pub required_fields: &'static [&'static str],
    pub on_engine_failure: FailurePolicy,
}

const REASON_CHOICE: &[&str] = &["reasoning", "choice"];
const REASON_CHOICE_ENDPOINT: &[&str] = &["reasoning", "choice", "endpoint"];

pub static TOOL_STEPS: [StepDefinition; 6] = [
    StepDefinition {
        name: StepName::Acknowledge,
        role: StepRole::System,
        required_fields: REASON_CHOICE,
        on_engine_failure: FailurePolicy::Abort,
    },
    StepDefinition {
        name: StepName::ToolSelection,
        role: StepRole::System,
        required_fields: REASON_CHOICE,
        on_engine_failure: FailurePolicy::Abort,
    },
    StepDefinition {
        name: StepName::EndpointSelection,
        role: StepRole::System,
        required_fields: REASON_CHOICE_ENDPOINT,
        on_engine_failure: FailurePolicy::Abort,
    },
    StepDefinition {
        name: StepName::Execution,
        role: StepRole::System,
        required_fields: REASON_CHOICE,
        on_engine_failure: FailurePolicy::Fallback,
    },
    StepDefinition {
        name: StepName::ApiResponse,
        role: StepRole::System,
        required_fields: REASON_CHOICE,
        on_engine_failure: FailurePolicy::Fallback,
    },
    StepDefinition {
        name: StepName::Summary,
        role: StepRole::Assistant,
        required_fields: REASON_CHOICE,
        on_engine_failure: FailurePolicy::Fallback,
    },
];

/// The steps that actually run for a plugin. Capability selection only makes
/// sense when there is more than one capability to choose from; step ids are
/// assigned by emission order, so skipping it leaves no gap.
pub fn sequence(sub_selection: bool) -> impl Iterator<Item = &'static StepDefinition> {
    TOOL_STEPS
        .iter()
        .filter(move |def| sub_selection || def.name != StepName::EndpointSelection)
}

impl StepDefinition {
    /// Build the step's prompt. `None` means the step is non-generative and
    /// its fallback decision is the event content.
    pub fn prompt(&self, ctx: &PipelineContext) -> Option<String> {
        let query = &ctx.query;
        let plugin = &ctx.plugin.name;
        match self.name {
            StepName::Acknowledge => Some(format!(
                "You are a cybersecurity assistant helping a user with their query: '{query}'\n\
                 The {plugin} plugin has been selected to help answer this query.\n\n\
                 Provide a brief acknowledgment to the user about using the {plugin} tool.\n\
                 Your response must be in valid JSON format with two fields:\n\
                 1. 'reasoning': Explain why you're acknowledging the request\n\
                 2. 'choice': The actual acknowledgment text to show the user\n\n\
                 Example response format:\n\
                 {{\"reasoning\": \"The user is asking for information this tool provides, so I should acknowledge that I'll use it.\", \"choice\": \"I'll help you with that using the {plugin} tool.\"}}"
            )),
            StepName::ToolSelection => Some(format!(
                "You are a cybersecurity assistant helping with the query: '{query}'\n\
                 The {plugin} plugin has been selected to retrieve the requested information.\n\n\
                 Explain why you're selecting the {plugin} tool for this query.\n\
                 Your response must be in valid JSON format with two fields:\n\
                 1. 'reasoning': Explain why the {plugin} tool is appropriate for this query\n\
                 2. 'choice': The actual explanation to show the user\n\n\
                 Example response format:\n\
                 {{\"reasoning\": \"The query asks for data this tool is designed to provide.\", \"choice\": \"I'm selecting the {plugin} tool because it can retrieve the requested information.\"}}"
            )),
            StepName::EndpointSelection => {
                let listing = ctx
                    .plugin
                    .capabilities()
                    .iter()
                    .enumerate()
                    .map(|(i, cap)| format!("{}. '{}': {}", i + 1, cap.name, cap.description))
                    .collect::<Vec<_>>()
                    .join("\n");
                let first = &ctx.plugin.first_capability().name;
                Some(format!(
                    "You are a cybersecurity assistant helping with the query: '{query}'\n\
                     The {plugin} plugin has multiple endpoints available:\n\
                     {listing}\n\n\
                     Decide which endpoint is most appropriate for this query.\n\
                     Your response must be in valid JSON format with three fields:\n\
                     1. 'reasoning': Explain why you chose this endpoint\n\
                     2. 'choice': A brief explanation to show the user\n\
                     3. 'endpoint': The endpoint name (must be exactly one of the names listed above)\n\n\
                     Example response format:\n\
                     {{\"reasoning\": \"The '{first}' endpoint matches what the user asked for.\", \"choice\": \"Based on your query, I'll use the '{first}' endpoint.\", \"endpoint\": \"{first}\"}}"
                ))
            }
            StepName::Execution => None,
            StepName::ApiResponse => Some(format!(
                "You are a cybersecurity assistant helping with the query: '{query}'\n\
                 You've received the following data from the {plugin} {endpoint} endpoint:\n\n\
                 ```json\n{payload}\n```\n\n\
                 Format this data in a user-friendly way with appropriate emojis and formatting.\n\
                 Your response must be in valid JSON format with two fields:\n\
                 1. 'reasoning': Explain how you're formatting the data to make it user-friendly\n\
                 2. 'choice': The formatted data presentation with emojis and markdown formatting",
                endpoint = ctx.capability.name,
                payload = ctx.payload_pretty(),
            )),
            StepName::Summary => Some(format!(
                "You are a cybersecurity assistant helping with the query: '{query}'\n\
                 You've retrieved the following data from the {plugin} {endpoint} endpoint:\n\n\
                 ```json\n{payload}\n```\n\n\
                 Provide a concise summary and analysis of this information, including security implications.\n\
                 Your response must be in valid JSON format with two fields:\n\
                 1. 'reasoning': Explain how you're interpreting the data and what insights you're providing\n\
                 2. 'choice': The actual summary and analysis to show the user",
                endpoint = ctx.capability.name,
                payload = ctx.payload_pretty(),
            )),
            StepName::Error => None,
        }
    }

    /// The deterministic decision substituted when extraction (or, for
    /// formatting steps, the model call itself) fails. Always satisfies the
    /// step's required fields.
    pub fn fallback(&self, ctx: &PipelineContext) -> Decision {
        let plugin = &ctx.plugin.name;
        match self.name {
            StepName::Acknowledge => Decision::fallback(&[
                ("reasoning", &format!("Processing the request with the {plugin} tool")),
                (
                    "choice",
                    &format!("I'll help you with that using the {plugin} tool."),
                ),
            ]),
            StepName::ToolSelection => Decision::fallback(&[
                (
                    "reasoning",
                    &format!("{plugin} is the appropriate tool for this query"),
                ),
                (
                    "choice",
                    &format!("Selecting the {plugin} tool to retrieve the requested information."),
                ),
            ]),
            StepName::EndpointSelection => {
                let first = &ctx.plugin.first_capability().name;
                Decision::fallback(&[
                    (
                        "reasoning",
                        &format!("The '{first}' endpoint provides general information"),
                    ),
                    (
                        "choice",
                        &format!("Using the '{first}' endpoint to get general information."),
                    ),
                    ("endpoint", first),
                ])
            }
            StepName::Execution => Decision::fallback(&[
                (
                    "reasoning",
                    "Now that we've selected the appropriate endpoint, we need to execute the API call to retrieve the information",
                ),
                (
                    "choice",
                    &format!("Executing API call to {plugin} service..."),
                ),
            ]),
            StepName::ApiResponse => Decision::fallback(&[
                (
                    "reasoning",
                    "Formatting the data with clear labels for readability",
                ),
                ("choice", &ctx.formatted_payload()),
            ]),
            StepName::Summary => Decision::fallback(&[
                (
                    "reasoning",
                    "Summarizing the key details while adding security context",
                ),
                ("choice", &ctx.summarized_payload()),
            ]),
            StepName::Error => Decision::fallback(&[
                ("reasoning", "An unrecoverable error occurred"),
                ("choice", "Something went wrong while running the tool."),
            ]),
        }
    }
}

impl PipelineContext {
    fn payload_pretty(&self) -> String {
        self.last_result
            .as_ref()
            .and_then(|r| r.data.as_ref())
            .map(|d| serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string()))
            .unwrap_or_else(|| "null".to_string())
    }

    fn formatted_payload(&self) -> String {
        let data = self
            .last_result
            .as_ref()
            .and_then(|r| r.data.clone())
            .unwrap_or(serde_json::Value::Null);
        fallback::format_report(&self.capability.name, &data)
    }

    fn summarized_payload(&self) -> String {
        let data = self
            .last_result
            .as_ref()
            .and_then(|r| r.data.clone())
            .unwrap_or(serde_json::Value::Null);
        fallback::summarize_report(&self.capability.name, &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginRegistry;

    fn ctx() -> PipelineContext {
        let registry = PluginRegistry::with_builtins();
        let plugin = registry.iter().next().unwrap().clone();
        PipelineContext::new("what is my ip address?", plugin)
    }

    #[test]
    fn full_sequence_has_six_steps() {
        let names: Vec<StepName> = sequence(true).map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                StepName::Acknowledge,
                StepName::ToolSelection,
                StepName::EndpointSelection,
                StepName::Execution,
                StepName::ApiResponse,
                StepName::Summary,
            ]
        );
    }

    #[test]
    fn single_capability_sequence_skips_endpoint_selection() {
        let names: Vec<StepName> = sequence(false).map(|d| d.name).collect();
        assert_eq!(names.len(), 5);
        assert!(!names.contains(&StepName::EndpointSelection));
    }

    #[test]
    fn execution_is_non_generative() {
        let ctx = ctx();
        let execution = TOOL_STEPS
            .iter()
            .find(|d| d.name == StepName::Execution)
            .unwrap();
        assert!(execution.prompt(&ctx).is_none());
        let decision = execution.fallback(&ctx);
        assert!(decision.get("choice").contains("Executing API call"));
    }

    #[test]
    fn endpoint_prompt_lists_every_capability() {
        let ctx = ctx();
        let step = TOOL_STEPS
            .iter()
            .find(|d| d.name == StepName::EndpointSelection)
            .unwrap();
        let prompt = step.prompt(&ctx).unwrap();
        assert!(prompt.contains("'basic'"));
        assert!(prompt.contains("'geo'"));
        assert!(prompt.contains("'asn'"));
        assert!(prompt.contains("what is my ip address?"));
    }

    #[test]
    fn fallbacks_satisfy_required_fields() {
        let ctx = ctx();
        for def in &TOOL_STEPS {
            let decision = def.fallback(&ctx);
            for f in def.required_fields {
                assert!(
                    !decision.get(f).is_empty(),
                    "step {} fallback missing {f}",
                    def.name
                );
            }
            assert!(!decision.was_extracted);
        }
    }

    #[test]
    fn formatting_steps_fall_back_deterministically() {
        for def in &TOOL_STEPS {
            let expected = matches!(
                def.name,
                StepName::Execution | StepName::ApiResponse | StepName::Summary
            );
            assert_eq!(def.on_engine_failure == FailurePolicy::Fallback, expected);
        }
    }
}
