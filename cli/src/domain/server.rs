//! Config injection and handoff: deriving what the recipient receives from
//! a provisioned instance.

use chrono::{DateTime, Utc};
use dejima_common::{HandoffResult, InstanceDescriptor, ReadinessState, ServerConfig};
use rand::Rng;
use rand::distr::Alphanumeric;

const API_KEY_PREFIX: &str = "sk-dejima-";
const API_KEY_LEN: usize = 12;

/// Generate a fresh API key: `sk-dejima-` followed by 12 lowercase
/// alphanumerics.
#[must_use]
pub fn generate_api_key() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{API_KEY_PREFIX}{suffix}")
}

/// Derive the server config from a descriptor and a freshly issued key.
#[must_use]
pub fn inject_config(instance: &InstanceDescriptor, issued_api_key: String) -> ServerConfig {
    ServerConfig {
        instance_id: instance.instance_id.clone(),
        host: instance.host.clone(),
        local_endpoint: instance.local_endpoint.clone(),
        remote_endpoint: instance.remote_endpoint.clone(),
        issued_api_key,
        model: instance.model.clone(),
        config_injected: true,
        model_loaded: instance.readiness == ReadinessState::Ready,
    }
}

/// Identifier for the child that receives a server: `<agent>-child-<base36 ms>`.
#[must_use]
pub fn recipient_id(agent_id: &str, now: DateTime<Utc>) -> String {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("{agent_id}-child-{}", to_base36(millis))
}

#[must_use]
pub fn handoff(recipient_id: String, server_config: ServerConfig, now: DateTime<Utc>) -> HandoffResult {
    HandoffResult {
        recipient_id,
        server_config,
        handed_off_at: now,
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[usize::try_from(n % 36).unwrap_or_default()]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
