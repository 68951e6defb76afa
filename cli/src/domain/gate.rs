//! Reproduction gate: a fail-closed check run before the pipeline.
//!
//! Split in two so the caller can skip the balance lookup entirely when the
//! registry record already denies.

use dejima_common::{AgentRecord, AgentStatus, GateDecision};

/// Minimum balance an agent must hold before it may reproduce.
pub const MIN_BALANCE_TO_REPRODUCE: f64 = 0.1;

/// Check the registry record. Returns the record when it may proceed to the
/// balance check, or the denial.
///
/// # Errors
///
/// Returns a denying [`GateDecision`] if the agent is unknown or not alive.
pub fn check_record<'a>(
    agent_id: &str,
    record: Option<&'a AgentRecord>,
) -> Result<&'a AgentRecord, GateDecision> {
    let Some(record) = record else {
        return Err(GateDecision::deny(format!("agent {agent_id} not found")));
    };
    if record.status != AgentStatus::Alive {
        return Err(GateDecision::deny(format!(
            "agent {agent_id} is not alive ({})",
            record.status
        )));
    }
    Ok(record)
}

/// Decide on the observed balance. A failed lookup denies.
#[must_use]
pub fn check_balance(balance: Result<f64, String>, threshold: f64) -> GateDecision {
    match balance {
        Err(e) => GateDecision::deny(format!("balance unavailable: {e}")),
        Ok(b) if b < threshold => GateDecision::deny(format!(
            "insufficient balance: {b:.4} (need {threshold:.4})"
        )),
        Ok(b) => GateDecision::allow(format!("balance ok: {b:.4}")),
    }
}
