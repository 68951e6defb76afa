//! `dejima signals` — cost and revenue per subject.

use anyhow::Result;

use crate::app::AppContext;
use crate::output::human::HumanRenderer;

/// Run `dejima signals`.
///
/// # Errors
///
/// Returns an error if the journal cannot be read.
pub async fn run(app: &AppContext) -> Result<()> {
    let summaries = app.signals().summaries().await?;
    if app.is_json() {
        crate::output::json::print(&summaries)
    } else {
        HumanRenderer::new(&app.output).render_signals(&summaries);
        Ok(())
    }
}
