//! Human-readable terminal renderer.

use dejima_common::{
    ChargeStatus, ConversionResult, GateDecision, InstanceDescriptor, PipelineResult,
    ReadinessState, SignalSummary,
};
use owo_colors::OwoColorize as _;

use crate::output::OutputContext;

/// Lines of verification output shown under the instance summary.
const VERIFICATION_LINES: usize = 12;

/// Renders pipeline artifacts as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    pub fn render_version(&self, version: &str) {
        self.ctx.info(&format!("dejima v{version}"));
    }

    pub fn render_gate(&self, agent_id: &str, gate: &GateDecision) {
        if gate.allowed {
            self.ctx.success(&format!("{agent_id} may reproduce: {}", gate.reason));
        } else {
            self.ctx.warn(&format!("{agent_id} may not reproduce: {}", gate.reason));
        }
    }

    pub fn render_conversion(&self, c: &ConversionResult) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.header("Conversion");
        self.ctx.kv("amount:", &format!("{}", c.source_amount));
        self.ctx.kv("unit price:", &format_usd(c.source_unit_price_usd));
        self.ctx.kv("usd value:", &format_usd(c.usd_value));
        self.ctx.kv("multiplier:", &format!("x{}", c.demo_multiplier));
        println!(
            "    {:<14} {}",
            "target:".style(self.ctx.styles.dim),
            format_usd(c.target_amount).style(self.ctx.styles.amount)
        );
    }

    /// Every artifact of a run, then the verdict.
    pub fn render_pipeline(&self, result: &PipelineResult) {
        if !self.ctx.quiet {
            self.ctx.header("Payment");
            self.ctx.kv("transaction:", or_dash(&result.payment.transaction_ref));
            self.ctx.kv("treasury:", or_dash(&result.payment.treasury_address));
            self.ctx.kv("settled:", &format!("{}", result.payment.amount_settled));

            self.ctx.header("Compliance");
            self.ctx.kv(
                "approved:",
                if result.compliance.approved { "yes" } else { "no" },
            );
            self.ctx.kv("notes:", or_dash(&result.compliance.notes));

            if result.conversion.source_amount > 0.0 {
                self.render_conversion(&result.conversion);
            }

            self.ctx.header("Charge");
            self.ctx.kv("reference:", or_dash(&result.charge.charge_ref));
            self.ctx.kv(
                "amount:",
                &format!("{} {}", format_usd(result.charge.amount), result.charge.currency),
            );
            self.ctx.kv("status:", charge_status_display(result.charge.status));

            self.render_instance(&result.instance);

            self.ctx.header("Server");
            self.ctx.kv("endpoint:", or_dash(&result.server.local_endpoint));
            self.ctx.kv("api key:", or_dash(&result.server.issued_api_key));
            self.ctx.kv(
                "model loaded:",
                if result.server.model_loaded { "yes" } else { "no" },
            );
            self.ctx.kv("handed to:", or_dash(&result.handoff.recipient_id));
            println!();
        }

        match (result.success, &result.error) {
            (true, _) => self.ctx.success(&format!(
                "{} reproduced on {}",
                result.agent_id, result.instance.instance_id
            )),
            (false, Some(err)) => self.ctx.error(&format!("pipeline failed: {err}")),
            (false, None) => self.ctx.error("pipeline failed"),
        }
        if result.success && result.instance.readiness != ReadinessState::Ready {
            self.ctx.warn("model still loading; the endpoint will answer once it is up");
        }
    }

    fn render_instance(&self, i: &InstanceDescriptor) {
        self.ctx.header("Instance");
        self.ctx.kv("provider:", &i.provider.to_string());
        self.ctx.kv("id:", or_dash(&i.instance_id));
        self.ctx.kv("host:", i.host.as_deref().unwrap_or("-"));
        self.ctx.kv("region:", or_dash(&i.region));
        self.ctx.kv("hardware:", or_dash(&i.hardware_tag));
        self.ctx.kv("price:", &format!("{}/hr", format_usd(i.hourly_price)));
        self.ctx.kv("readiness:", &i.readiness.to_string());
        if !i.verification_output.is_empty() {
            println!("    {}", "verification:".style(self.ctx.styles.dim));
            for line in excerpt(&i.verification_output, VERIFICATION_LINES) {
                println!("      {line}");
            }
        }
    }

    pub fn render_signals(&self, summaries: &[SignalSummary]) {
        if summaries.is_empty() {
            self.ctx.info("No signals recorded yet.");
            return;
        }
        if self.ctx.quiet {
            return;
        }
        println!(
            "  {:<20} {:>12} {:>12} {:>8}  {}",
            "SUBJECT".style(self.ctx.styles.bold),
            "COST".style(self.ctx.styles.bold),
            "REVENUE".style(self.ctx.styles.bold),
            "RATIO".style(self.ctx.styles.bold),
            "LAST MODEL".style(self.ctx.styles.bold),
        );
        for s in summaries {
            let ratio = s.ratio().map_or_else(|| "-".to_string(), |r| format!("{r:.2}"));
            println!(
                "  {:<20} {:>12} {:>12} {:>8}  {}",
                s.subject_id,
                format_usd(s.cost_usd),
                format_usd(s.revenue_usd),
                ratio,
                s.last_model.as_deref().unwrap_or("-"),
            );
        }
    }
}

// ── Display helpers ──────────────────────────────────────────────────────────

#[must_use]
pub fn format_usd(amount: f64) -> String {
    format!("${amount:.2}")
}

#[must_use]
pub fn charge_status_display(status: ChargeStatus) -> &'static str {
    match status {
        ChargeStatus::RequiresPaymentMethod => "requires payment method (test mode)",
        ChargeStatus::Succeeded => "succeeded",
        ChargeStatus::Skipped => "skipped",
        ChargeStatus::Canceled => "canceled",
    }
}

/// First `max` non-blank lines of `text`, with a marker when more were cut.
#[must_use]
pub fn excerpt(text: &str, max: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut out: Vec<String> = lines.iter().take(max).map(|l| (*l).to_string()).collect();
    if lines.len() > max {
        out.push(format!("... ({} more lines)", lines.len() - max));
    }
    out
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
