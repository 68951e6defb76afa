//! Plain OpenSSH access to marketplace instances, and local identity lookup.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, RemoteShell, SshTarget, TunnelSpec};
use crate::domain::instance::MODEL_PORT;

/// Private keys tried in order when no identity is configured.
pub const IDENTITY_CANDIDATES: &[&str] = &["id_ed25519", "id_rsa", "id_ecdsa"];

/// First existing private key: the configured one, else the first of
/// [`IDENTITY_CANDIDATES`] under `ssh_dir`.
#[must_use]
pub fn discover_identity(configured: Option<&Path>, ssh_dir: &Path) -> Option<PathBuf> {
    if let Some(path) = configured {
        return path.exists().then(|| path.to_path_buf());
    }
    IDENTITY_CANDIDATES
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|p| p.exists())
}

/// `~/.ssh`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_ssh_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".ssh"))
}

/// Contents of the `.pub` sibling of `identity`, trimmed.
///
/// # Errors
///
/// Returns an error if the public key file cannot be read.
pub fn read_public_key(identity: &Path) -> Result<String> {
    let mut pub_path = identity.as_os_str().to_owned();
    pub_path.push(".pub");
    let pub_path = PathBuf::from(pub_path);
    let key = std::fs::read_to_string(&pub_path)
        .with_context(|| format!("reading {}", pub_path.display()))?;
    Ok(key.trim().to_string())
}

/// `RemoteShell` over the system `ssh` binary.
pub struct SshClient<R> {
    runner: R,
    identity: PathBuf,
}

impl<R: CommandRunner> SshClient<R> {
    pub fn new(runner: R, identity: PathBuf) -> Self {
        Self { runner, identity }
    }

    fn base_args(&self, target: &SshTarget) -> Vec<String> {
        vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "ConnectTimeout=15".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=10".to_string(),
            "-i".to_string(),
            self.identity.display().to_string(),
            "-p".to_string(),
            target.port.to_string(),
        ]
    }
}

impl<R: CommandRunner> RemoteShell for SshClient<R> {
    async fn exec(&self, target: &SshTarget, command: &str, timeout: Duration) -> Result<Output> {
        let mut args = self.base_args(target);
        args.push(format!("{}@{}", target.user, target.host));
        args.push(command.to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run_with_timeout("ssh", &args, timeout).await
    }

    fn tunnel_spec(&self, target: &SshTarget, local_port: u16) -> TunnelSpec {
        let mut args = vec![
            "-N".to_string(),
            "-L".to_string(),
            format!("{local_port}:localhost:{MODEL_PORT}"),
        ];
        args.extend(self.base_args(target));
        args.push(format!("{}@{}", target.user, target.host));
        TunnelSpec {
            program: "ssh".to_string(),
            args,
            local_port,
        }
    }
}
