use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::steps::{FailurePolicy, SYSTEM_PROMPT, StepDefinition, sequence};
use super::{EventStream, PipelineContext, StepEvent, StepMeta, StepName, StepRole};
use crate::app_config::EngineConfig;
use crate::engine::{ChatMessage, EngineHandle, GenerationRequest};
use crate::errors::EngineError;
use crate::extract::{Decision, coerce_choice, extract};
use crate::plugins::PluginDescriptor;
use crate::tool::{ToolInvoker, extract_ip_target};

/// Generation knobs the orchestrator applies to every step prompt.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl GenerationParams {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

/// Delay between fragments on the no-tool path, to avoid overwhelming slow
/// consumers. Not load-bearing for correctness.
const FRAGMENT_PACING: Duration = Duration::from_millis(10);

/// Drives one request through the fixed decision sequence, prompting the
/// engine per step, extracting structured decisions, invoking the tool, and
/// emitting one event per step. Strictly linear within a run; concurrent
/// runs share the engine through its gated handle.
pub struct Orchestrator {
    engine: EngineHandle,
    invoker: Arc<dyn ToolInvoker>,
    params: GenerationParams,
}

impl Orchestrator {
    pub fn new(engine: EngineHandle, invoker: Arc<dyn ToolInvoker>, params: GenerationParams) -> Self {
        Self {
            engine,
            invoker,
            params,
        }
    }

    /// Start a pipeline run and return its event stream. The run executes on
    /// its own task; dropping the stream stops it at the next emission.
    pub fn run(
        self: &Arc<Self>,
        query: String,
        plugin: Option<PluginDescriptor>,
        announce: bool,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel::<StepEvent>(8);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match plugin {
                Some(plugin) => this.run_tool_pipeline(query, plugin, announce, tx).await,
                None => this.run_plain_answer(query, tx).await,
            }
        });
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }

    async fn run_tool_pipeline(
        &self,
        query: String,
        plugin: PluginDescriptor,
        announce: bool,
        tx: mpsc::Sender<StepEvent>,
    ) {
        let mut ctx = PipelineContext::new(query, plugin);

        if announce && tx.send(StepEvent::plugin_used(&ctx.plugin.name)).await.is_err() {
            return;
        }

        let mut next_id: u32 = 1;
        for def in sequence(ctx.plugin.has_sub_selection()) {
            let meta = StepMeta {
                id: next_id,
                name: def.name,
                role: def.role,
            };

            if def.name == StepName::Execution {
                let notice = def.fallback(&ctx);
                let event = StepEvent::step(meta, notice.get("choice"), notice.get("reasoning"));
                if tx.send(event).await.is_err() {
                    return;
                }
                ctx.emitted = next_id;
                next_id += 1;

                let target = extract_ip_target(&ctx.query);
                let result = self
                    .invoker
                    .invoke(&ctx.plugin, &ctx.capability, target.as_deref())
                    .await;
                if !result.success {
                    let error_meta = StepMeta {
                        id: next_id,
                        name: StepName::Error,
                        role: StepRole::System,
                    };
                    let text = format!(
                        "Failed to get information from the {} endpoint: {}",
                        ctx.capability.name, result.message
                    );
                    let event = StepEvent::step(
                        error_meta,
                        text,
                        "The API call failed, so I need to inform the user about the error",
                    );
                    let _ = tx.send(event).await;
                    return;
                }
                ctx.last_result = Some(result);
                continue;
            }

            let mut decision = match self.decide(def, &ctx).await {
                Ok(decision) => decision,
                Err(e) => {
                    log::error!("generation failed during {} step: {e}", def.name);
                    let _ = tx.send(StepEvent::failure(e.to_string())).await;
                    return;
                }
            };

            let mut event = {
                let text = non_empty_or(decision.get("choice"), || {
                    def.fallback(&ctx).get("choice").to_string()
                });
                let reasoning = decision.get("reasoning").to_string();
                ctx.history.push(ChatMessage::assistant(text.clone()));
                StepEvent::step(meta, text, reasoning)
            };

            if def.name == StepName::EndpointSelection {
                let names: Vec<&str> = ctx
                    .plugin
                    .capabilities()
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect();
                coerce_choice(&mut decision, "endpoint", &names);
                let chosen = decision.get("endpoint").to_string();
                if let Some(capability) = ctx.plugin.capability(&chosen) {
                    ctx.capability = capability.clone();
                }
                event = event.with_endpoint(chosen);
            }

            if tx.send(event).await.is_err() {
                return;
            }
            ctx.emitted = next_id;
            next_id += 1;
        }
    }

    /// No plugin applies: stream fragments of one generated answer with no
    /// step metadata.
    async fn run_plain_answer(&self, query: String, tx: mpsc::Sender<StepEvent>) {
        use futures::StreamExt;

        let req = GenerationRequest::prompted(
            SYSTEM_PROMPT,
            query,
            self.params.max_tokens,
            Some(self.params.temperature),
        );

        let mut fragments = match self.engine.generate_stream(&req).await {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("streaming generation failed to start: {e}");
                let _ = tx.send(StepEvent::failure(e.to_string())).await;
                return;
            }
        };

        while let Some(item) = fragments.next().await {
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    if tx.send(StepEvent::fragment(text)).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(FRAGMENT_PACING).await;
                }
                Err(e) => {
                    log::error!("streaming generation failed mid-answer: {e}");
                    let _ = tx.send(StepEvent::failure(e.to_string())).await;
                    return;
                }
            }
        }
    }

    /// Run one step's model call and extraction. Non-generative steps and
    /// recoverable failures resolve to the step's deterministic fallback.
    async fn decide(
        &self,
        def: &StepDefinition,
        ctx: &PipelineContext,
    ) -> Result<Decision, EngineError> {
        let Some(prompt) = def.prompt(ctx) else {
            return Ok(def.fallback(ctx));
        };

        let req = GenerationRequest::prompted(
            SYSTEM_PROMPT,
            prompt,
            self.params.max_tokens,
            Some(self.params.temperature),
        );

        let timeout = Duration::from_secs(self.params.timeout_seconds);
        let raw = match tokio::time::timeout(timeout, self.engine.generate(&req)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => match def.on_engine_failure {
                FailurePolicy::Fallback => {
                    log::warn!("engine failed during {} step, using fallback: {e}", def.name);
                    return Ok(def.fallback(ctx));
                }
                FailurePolicy::Abort => return Err(e),
            },
            Err(_) => match def.on_engine_failure {
                FailurePolicy::Fallback => {
                    log::warn!(
                        "engine timed out during {} step, using fallback",
                        def.name
                    );
                    return Ok(def.fallback(ctx));
                }
                FailurePolicy::Abort => {
                    return Err(EngineError::Timeout(self.params.timeout_seconds));
                }
            },
        };

        Ok(extract(&raw, def.required_fields, def.fallback(ctx)))
    }
}

fn non_empty_or(value: &str, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        fallback()
    } else {
        value.to_string()
    }
}
