//! Ordered provider chain.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Tries each provider in order and returns the first success.
///
/// An empty chain always fails with `LlmError::NoProvider`, which callers
/// treat like any other inference failure and fall back to heuristics.
pub struct FailoverProvider {
    providers: Vec<Arc<dyn LlmProvider>>,
    label: String,
}

impl FailoverProvider {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        let label = if providers.is_empty() {
            "fallback".to_string()
        } else {
            providers
                .iter()
                .map(|p| p.model_name().to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        };
        Self { providers, label }
    }

    /// Model names in the order they are tried.
    pub fn chain(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.model_name().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn model_name(&self) -> &str {
        &self.label
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        self.providers
            .first()
            .map(|p| p.cost_per_token())
            .unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut last_error = LlmError::NoProvider;
        for (idx, provider) in self.providers.iter().enumerate() {
            match provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        provider = provider.model_name(),
                        position = idx,
                        error = %e,
                        "Provider failed, trying next in chain"
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
