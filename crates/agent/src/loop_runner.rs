//! The per-message workflow: history, model, bounded tool loop, one reply.
//!
//! The workflow is pure orchestration. It talks to the world only through
//! an [`ActivityExecutor`], which makes it safe to replay under a durable
//! engine. Whatever happens along the way, the run is finalized.

use convoy_core::{
    ActivityError, AgentWorkflowContext, ConversationTurn, IncomingMessage, InputItem,
    ModelResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activities::{ActivityExecutor, ActivityOutput, ActivityRequest, DeliveryOutcome};
use crate::materializer::{Deliveries, Materialization, decide};
use crate::response::{
    FunctionCallRequest, extract_text, function_calls, generated_images, normalize_text,
    tool_context_items,
};
use crate::tool_runner::ToolOutcome;

/// Everything a run needs, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub run: AgentWorkflowContext,
    pub message: IncomingMessage,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub chat_id: String,
    pub sequence: u64,
    pub model_calls: usize,
    pub tool_iterations: usize,
    pub tool_calls: usize,
    pub deliveries: Deliveries,
    pub materialization: Materialization,
    pub delivery: Option<DeliveryOutcome>,
    pub responded: bool,
    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

impl WorkflowReport {
    fn new(run: &AgentWorkflowContext) -> Self {
        Self {
            chat_id: run.chat_id.clone(),
            sequence: run.sequence,
            model_calls: 0,
            tool_iterations: 0,
            tool_calls: 0,
            deliveries: Deliveries::default(),
            materialization: Materialization::Nothing,
            delivery: None,
            responded: false,
            aborted: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MessageWorkflow {
    max_tool_iterations: usize,
    max_generated_images: usize,
}

impl Default for MessageWorkflow {
    fn default() -> Self {
        Self {
            max_tool_iterations: 50,
            max_generated_images: 1,
        }
    }
}

impl MessageWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on model turns that may request tools.
    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn with_max_generated_images(mut self, max: usize) -> Self {
        self.max_generated_images = max;
        self
    }

    pub async fn run(&self, activities: &dyn ActivityExecutor, input: WorkflowInput) -> WorkflowReport {
        let mut report = WorkflowReport::new(&input.run);
        info!(
            chat_id = %input.run.chat_id,
            sequence = input.run.sequence,
            message_id = ?input.run.message_id,
            "Workflow started"
        );

        if let Err(e) = self.respond(activities, &input, &mut report).await {
            warn!(
                chat_id = %input.run.chat_id,
                sequence = input.run.sequence,
                error = %e,
                "Workflow aborted, finalizing without a reply"
            );
            report.aborted = Some(e.to_string());
        }

        let finalize = ActivityRequest::Finalize {
            run: input.run.clone(),
            message: input.message.clone(),
        };
        match activities.execute(finalize).await {
            Ok(ActivityOutput::Finalized { responded, .. }) => report.responded = responded,
            Ok(other) => warn!(output = ?other, "Finalize returned an unexpected output"),
            Err(e) => warn!(chat_id = %input.run.chat_id, error = %e, "Finalize failed"),
        }

        info!(
            chat_id = %report.chat_id,
            sequence = report.sequence,
            model_calls = report.model_calls,
            tool_calls = report.tool_calls,
            responded = report.responded,
            "Workflow finished"
        );
        report
    }

    async fn respond(
        &self,
        activities: &dyn ActivityExecutor,
        input: &WorkflowInput,
        report: &mut WorkflowReport,
    ) -> Result<(), ActivityError> {
        let WorkflowInput { run, message } = input;

        let history = match load_history(activities, run).await {
            Ok(history) => history,
            Err(e) => {
                warn!(chat_id = %run.chat_id, error = %e, "History unavailable, continuing without it");
                Vec::new()
            }
        };
        let mut items = build_input(activities, message, history).await?;

        let mut response = invoke_model(activities, run, message, &items).await?;
        report.model_calls += 1;

        loop {
            let calls = function_calls(&response);
            if calls.is_empty() {
                break;
            }
            if report.tool_iterations >= self.max_tool_iterations {
                warn!(
                    chat_id = %run.chat_id,
                    iterations = report.tool_iterations,
                    "Max tool iterations reached, accepting last response"
                );
                break;
            }
            report.tool_iterations += 1;
            report.tool_calls += calls.len();
            debug!(chat_id = %run.chat_id, iteration = report.tool_iterations, "Tool iteration");

            items.extend(tool_context_items(&response));
            for outcome in execute_tools(activities, run, message, calls).await? {
                if let Some(delivery) = outcome.delivered {
                    report.deliveries.record(delivery);
                }
                items.push(InputItem::FunctionCallOutput {
                    call_id: outcome.call_id,
                    output: outcome.output,
                });
            }

            response = invoke_model(activities, run, message, &items).await?;
            report.model_calls += 1;
        }

        let text = normalize_text(&extract_text(&response));
        let images = generated_images(&response, self.max_generated_images);
        let materialization = decide(&text, images, &report.deliveries);
        report.materialization = materialization.clone();
        if materialization != Materialization::Nothing {
            report.delivery = Some(deliver(activities, run, message, materialization).await?);
        }
        Ok(())
    }
}

fn unexpected(activity: &str, output: &ActivityOutput) -> ActivityError {
    ActivityError::Fatal {
        activity: activity.to_string(),
        reason: format!("unexpected output: {output:?}"),
    }
}

async fn load_history(
    activities: &dyn ActivityExecutor,
    run: &AgentWorkflowContext,
) -> Result<Vec<ConversationTurn>, ActivityError> {
    let request = ActivityRequest::LoadHistory {
        chat_id: run.chat_id.clone(),
        sequence: run.sequence,
    };
    match activities.execute(request).await? {
        ActivityOutput::History { turns } => Ok(turns),
        other => Err(unexpected("load_history", &other)),
    }
}

async fn build_input(
    activities: &dyn ActivityExecutor,
    message: &IncomingMessage,
    history: Vec<ConversationTurn>,
) -> Result<Vec<InputItem>, ActivityError> {
    let request = ActivityRequest::BuildInput {
        message: message.clone(),
        history,
    };
    match activities.execute(request).await? {
        ActivityOutput::Input { items } => Ok(items),
        other => Err(unexpected("build_input", &other)),
    }
}

async fn invoke_model(
    activities: &dyn ActivityExecutor,
    run: &AgentWorkflowContext,
    message: &IncomingMessage,
    items: &[InputItem],
) -> Result<ModelResponse, ActivityError> {
    let request = ActivityRequest::InvokeModel {
        chat_id: run.chat_id.clone(),
        is_group: message.is_group_chat(),
        input: items.to_vec(),
    };
    match activities.execute(request).await? {
        ActivityOutput::Model { response } => Ok(response),
        other => Err(unexpected("invoke_model", &other)),
    }
}

async fn execute_tools(
    activities: &dyn ActivityExecutor,
    run: &AgentWorkflowContext,
    message: &IncomingMessage,
    calls: Vec<FunctionCallRequest>,
) -> Result<Vec<ToolOutcome>, ActivityError> {
    let request = ActivityRequest::ExecuteTools {
        run: run.clone(),
        message: message.clone(),
        calls,
    };
    match activities.execute(request).await? {
        ActivityOutput::ToolOutcomes { outcomes } => Ok(outcomes),
        other => Err(unexpected("execute_tools", &other)),
    }
}

async fn deliver(
    activities: &dyn ActivityExecutor,
    run: &AgentWorkflowContext,
    message: &IncomingMessage,
    materialization: Materialization,
) -> Result<DeliveryOutcome, ActivityError> {
    let request = ActivityRequest::Deliver {
        run: run.clone(),
        message: message.clone(),
        materialization,
    };
    match activities.execute(request).await? {
        ActivityOutput::Delivered { outcome } => Ok(outcome),
        other => Err(unexpected("deliver", &other)),
    }
}
