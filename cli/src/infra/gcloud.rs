//! `CloudCompute` over the `gcloud` CLI.

use std::io::Write as _;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::application::ports::{CloudCompute, CommandRunner, TunnelSpec, VmCreateSpec, VmStatus};
use crate::domain::instance::MODEL_PORT;
use crate::infra::command_runner::CREATE_TIMEOUT;

const DELETE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(default, rename = "natIP")]
    nat_ip: Option<String>,
}

/// Pull status and the first NAT address out of `describe --format=json`.
///
/// # Errors
///
/// Returns an error if the output is not the expected JSON.
pub fn parse_vm_status(json: &str) -> Result<VmStatus> {
    let resp: DescribeResponse = serde_json::from_str(json).context("parsing instance description")?;
    let external_ip = resp
        .network_interfaces
        .into_iter()
        .next()
        .and_then(|ni| ni.access_configs.into_iter().next())
        .and_then(|ac| ac.nat_ip)
        .filter(|ip| !ip.is_empty());
    Ok(VmStatus {
        status: resp.status,
        external_ip,
    })
}

pub struct GcloudCli<R> {
    runner: R,
    project: Option<String>,
}

impl<R: CommandRunner> GcloudCli<R> {
    pub fn new(runner: R, project: Option<String>) -> Self {
        Self { runner, project }
    }

    /// Trailing flags every invocation carries.
    fn scope_args(&self, zone: &str) -> Vec<String> {
        let mut args = vec![format!("--zone={zone}")];
        if let Some(project) = &self.project {
            args.push(format!("--project={project}"));
        }
        args
    }

    async fn gcloud(&self, mut args: Vec<String>, zone: &str, timeout: Duration) -> Result<Output> {
        args.extend(self.scope_args(zone));
        args.push("--quiet".to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run_with_timeout("gcloud", &args, timeout).await
    }

    fn create_args(spec: &VmCreateSpec<'_>, script_path: &str) -> Vec<String> {
        vec![
            "compute".to_string(),
            "instances".to_string(),
            "create".to_string(),
            spec.name.to_string(),
            format!("--machine-type={}", spec.machine_type),
            format!("--accelerator=type={},count=1", spec.gpu_type),
            format!("--image-family={}", spec.image_family),
            format!("--image-project={}", spec.image_project),
            format!("--boot-disk-size={}GB", spec.boot_disk_gb),
            "--boot-disk-type=pd-ssd".to_string(),
            "--maintenance-policy=TERMINATE".to_string(),
            format!("--metadata-from-file=startup-script={script_path}"),
            "--scopes=default".to_string(),
        ]
    }
}

impl<R: CommandRunner> CloudCompute for GcloudCli<R> {
    async fn create(&self, spec: &VmCreateSpec<'_>) -> Result<Output> {
        // Passed by file to keep the script clear of shell quoting.
        let mut script = tempfile::Builder::new()
            .prefix("dejima-startup-")
            .suffix(".sh")
            .tempfile()
            .context("creating startup script file")?;
        script
            .write_all(spec.startup_script.as_bytes())
            .context("writing startup script")?;
        let script_path = script.path().display().to_string();

        let args = Self::create_args(spec, &script_path);
        self.gcloud(args, spec.zone, CREATE_TIMEOUT).await
    }

    async fn describe(&self, name: &str, zone: &str) -> Result<VmStatus> {
        let args = vec![
            "compute".to_string(),
            "instances".to_string(),
            "describe".to_string(),
            name.to_string(),
            "--format=json".to_string(),
        ];
        let out = self
            .gcloud(args, zone, crate::infra::command_runner::DEFAULT_CMD_TIMEOUT)
            .await?;
        anyhow::ensure!(
            out.status.success(),
            "describe {name} failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        );
        parse_vm_status(&String::from_utf8_lossy(&out.stdout))
    }

    async fn ssh(&self, name: &str, zone: &str, command: &str, timeout: Duration) -> Result<Output> {
        let args = vec![
            "compute".to_string(),
            "ssh".to_string(),
            name.to_string(),
            format!("--command={command}"),
            "--ssh-flag=-o ConnectTimeout=15".to_string(),
        ];
        self.gcloud(args, zone, timeout).await
    }

    async fn delete(&self, name: &str, zone: &str) -> Result<Output> {
        let args = vec![
            "compute".to_string(),
            "instances".to_string(),
            "delete".to_string(),
            name.to_string(),
        ];
        self.gcloud(args, zone, DELETE_TIMEOUT).await
    }

    fn tunnel_spec(&self, name: &str, zone: &str, local_port: u16) -> TunnelSpec {
        let mut args = vec!["compute".to_string(), "ssh".to_string(), name.to_string()];
        args.extend(self.scope_args(zone));
        args.extend(
            [
                "--",
                "-N",
                "-L",
                &format!("{local_port}:localhost:{MODEL_PORT}"),
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=15",
            ]
            .map(str::to_string),
        );
        TunnelSpec {
            program: "gcloud".to_string(),
            args,
            local_port,
        }
    }
}
