//! Inference collaborator backed by a chat completion model.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use chatsales_core::{
    Candidate, DeepAuditReport, InferenceCollaborator, InferenceConfig, InferenceError,
    InferenceResult, RawSaleRecord, SaleRecord,
};

use crate::completion::{ChatCompletionClient, CompletionBackend};
use crate::prompts::{extraction_payload, records_payload, AUDIT_PROMPT, EXTRACTION_PROMPT, REPAIR_PROMPT};
use crate::AdapterResult;

/// Runs each stage as one completion call bounded by `timeout`, and parses
/// the reply as a single JSON value.
pub struct LlmInferenceCollaborator<B = ChatCompletionClient> {
    backend: B,
    timeout: Duration,
}

impl LlmInferenceCollaborator<ChatCompletionClient> {
    pub fn from_config(config: &InferenceConfig) -> AdapterResult<Self> {
        ChatCompletionClient::from_config(config).map(Self::with_client)
    }

    /// Bound each stage by the client's whole retry budget, so a retry after
    /// a slow failure still gets its turn.
    pub fn with_client(client: ChatCompletionClient) -> Self {
        let budget = client.call_budget();
        Self::new(client, budget)
    }
}

impl<B: CompletionBackend> LlmInferenceCollaborator<B> {
    pub fn new(backend: B, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn ask<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        system_prompt: &str,
        payload: String,
    ) -> InferenceResult<T> {
        let call = self.backend.complete(system_prompt, &payload);
        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(stage, timeout_secs = self.timeout.as_secs(), "Inference call timed out");
                return Err(InferenceError::Timeout(self.timeout.as_secs()));
            }
        };

        debug!(stage, reply_chars = reply.len(), "Inference reply received");
        parse_reply(&reply)
    }
}

/// Strict parse: surrounding whitespace is allowed, nothing else.
fn parse_reply<T: DeserializeOwned>(reply: &str) -> InferenceResult<T> {
    serde_json::from_str(reply.trim()).map_err(|e| {
        let preview: String = reply.trim().chars().take(80).collect();
        InferenceError::malformed(format!("{} (reply starts with {:?})", e, preview))
    })
}

#[async_trait]
impl<B: CompletionBackend> InferenceCollaborator for LlmInferenceCollaborator<B> {
    async fn extract(&self, batch: &[Candidate]) -> InferenceResult<Vec<RawSaleRecord>> {
        self.ask("extract", EXTRACTION_PROMPT, extraction_payload(batch)?)
            .await
    }

    async fn repair(&self, records: &[SaleRecord]) -> InferenceResult<Vec<RawSaleRecord>> {
        self.ask("repair", REPAIR_PROMPT, records_payload(records)?)
            .await
    }

    async fn deep_audit(&self, records: &[SaleRecord]) -> InferenceResult<DeepAuditReport> {
        self.ask("deep_audit", AUDIT_PROMPT, records_payload(records)?)
            .await
    }
}
