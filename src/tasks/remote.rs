//! Reasoning-service-backed analysis task
//!
//! Formats a prompt from the case snapshot and forwards it to the remote
//! reasoning service. The prompt wording here is deliberately minimal; the
//! orchestration layer only depends on "did it return, and what text".

use async_trait::async_trait;
use std::sync::Arc;

use super::AnalysisTask;
use crate::models::CaseSnapshot;
use crate::reasoning::ReasoningClient;
use crate::Result;

pub struct RemoteAnalysisTask {
    name: String,
    /// Role framing sent as the system instruction.
    role: String,
    /// Analysis instruction appended after the case material.
    instruction: String,
    client: Arc<ReasoningClient>,
}

impl RemoteAnalysisTask {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        instruction: impl Into<String>,
        client: Arc<ReasoningClient>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            instruction: instruction.into(),
            client,
        }
    }

    fn build_prompt(&self, case: &CaseSnapshot) -> String {
        let mut prompt = String::new();

        prompt.push_str("TRANSACTION ALERT:\n");
        prompt.push_str(
            &serde_json::to_string_pretty(&case.case.transaction)
                .unwrap_or_else(|_| case.case.transaction.to_string()),
        );

        if !case.case.contexts.is_empty() {
            prompt.push_str("\n\nCONTEXT SUMMARIES:\n");
            for (key, slot) in &case.case.contexts {
                let text = slot.text().unwrap_or("[unavailable]");
                prompt.push_str(&format!("{}: {}\n", key, text));
            }
        }

        if !case.case.findings.is_empty() {
            prompt.push_str("\nFINDINGS:\n");
            for (key, text) in &case.case.findings {
                prompt.push_str(&format!("{}: {}\n", key, text));
            }
        }

        if !case.case.turns.is_empty() {
            prompt.push_str("\nCUSTOMER CONVERSATION:\n");
            for turn in &case.case.turns {
                prompt.push_str(&format!("Q: {}\n", turn.question));
                if let Some(answer) = &turn.answer {
                    prompt.push_str(&format!("A: {}\n", answer));
                }
            }
        }

        prompt.push_str("\n\n");
        prompt.push_str(&self.instruction);
        prompt
    }
}

#[async_trait]
impl AnalysisTask for RemoteAnalysisTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, case: &CaseSnapshot) -> Result<String> {
        let prompt = self.build_prompt(case);
        self.client.complete(&self.role, &prompt).await
    }
}
