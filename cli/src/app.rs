//! Application context — unified state passed to every command handler.
//!
//! `AppContext` is built once in `Cli::run()` from the global flags, the
//! YAML config and the `DEJIMA_*` environment. Command handlers take the
//! adapters they need from it instead of constructing their own.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::{Credentials, DejimaConfig};
use crate::infra::billing::StripeBilling;
use crate::infra::compliance::StubCompliance;
use crate::infra::config::{YamlConfigStore, dejima_dir, load_credentials, resolve_path};
use crate::infra::ledger::LedgerWallet;
use crate::infra::registry::FileAgentRegistry;
use crate::infra::signals::SignalJournal;
use crate::output::OutputContext;
use crate::output::reporter::TerminalReporter;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags from the top-level CLI.
pub struct OutputFlags {
    pub no_color: bool,
    pub quiet: bool,
    pub json: bool,
}

pub struct AppContext {
    /// Terminal output context. Forced quiet under `--json` so stdout
    /// carries only the JSON document.
    pub output: OutputContext,
    pub mode: OutputMode,
    pub config: DejimaConfig,
    /// Directory relative data paths resolve against.
    pub data_dir: PathBuf,
    pub credentials: Credentials,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or the
    /// environment cannot be read.
    pub fn new(flags: &OutputFlags) -> Result<Self> {
        let store = YamlConfigStore::default();
        let config = store.load()?;
        let data_dir = match store.path()?.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => dejima_dir()?,
        };
        let credentials = load_credentials()?;
        let mode = if flags.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Ok(Self {
            output: OutputContext::new(flags.no_color, flags.quiet || flags.json),
            mode,
            config,
            data_dir,
            credentials,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    #[must_use]
    pub fn terminal_reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    #[must_use]
    pub fn ledger(&self) -> LedgerWallet {
        let paths = &self.config.paths;
        LedgerWallet::new(resolve_path(&self.data_dir, paths.ledger.as_deref(), "ledger.json"))
    }

    #[must_use]
    pub fn registry(&self) -> FileAgentRegistry {
        let paths = &self.config.paths;
        FileAgentRegistry::new(resolve_path(
            &self.data_dir,
            paths.registry.as_deref(),
            "agents.json",
        ))
    }

    #[must_use]
    pub fn signals(&self) -> SignalJournal {
        let paths = &self.config.paths;
        SignalJournal::new(resolve_path(
            &self.data_dir,
            paths.signals.as_deref(),
            "signals.jsonl",
        ))
    }

    #[must_use]
    pub fn compliance(&self) -> StubCompliance {
        StubCompliance::new(self.config.compliance_deny_list.clone())
    }

    #[must_use]
    pub fn billing(&self) -> StripeBilling {
        StripeBilling::new(self.credentials.stripe_secret_key.clone())
    }
}
