//! Scripted completion backend for tests

use super::{Completion, CompletionBackend, CompletionRequest, Message, ToolDeclaration};
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) enum Scripted {
    Reply(Completion),
    Fail(String),
    /// Sleeps before replying, for timeout and cancellation tests
    Delayed(Duration, Completion),
}

/// What the orchestrator sent on one round
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDeclaration>>,
}

pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request.tools.map(|tools| tools.to_vec()),
        });

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(completion)) => Ok(completion),
            Some(Scripted::Fail(message)) => Err(OrchestrationError::LlmError(message)),
            Some(Scripted::Delayed(delay, completion)) => {
                tokio::time::sleep(delay).await;
                Ok(completion)
            }
            None => Err(OrchestrationError::LlmError(
                "scripted backend exhausted".to_string(),
            )),
        }
    }
}
