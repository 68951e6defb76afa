//! Placeholder compliance check: approve everything off the deny list.

use anyhow::Result;
use dejima_common::ComplianceMethod;

use crate::application::ports::{ComplianceDecision, ComplianceService};

#[derive(Debug, Clone, Default)]
pub struct StubCompliance {
    deny_list: Vec<String>,
}

impl StubCompliance {
    #[must_use]
    pub fn new(deny_list: Vec<String>) -> Self {
        Self { deny_list }
    }
}

impl ComplianceService for StubCompliance {
    async fn check(&self, subject_id: &str, address: &str) -> Result<ComplianceDecision> {
        if self.deny_list.iter().any(|a| a == address) {
            tracing::warn!(subject = subject_id, address, "address held for review");
            return Ok(ComplianceDecision {
                approved: false,
                method: ComplianceMethod::HumanReview,
                notes: format!("{address} is on the review list"),
            });
        }
        Ok(ComplianceDecision {
            approved: true,
            method: ComplianceMethod::AutoApproved,
            notes: "auto-approved, no screening configured".to_string(),
        })
    }
}
