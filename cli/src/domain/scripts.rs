//! Boot scripts handed to providers at creation time.

use super::instance::MODEL_PORT;

/// Startup script for a cloud VM built from a Deep Learning image: CUDA,
/// Docker and the NVIDIA container toolkit are already present.
#[must_use]
pub fn cloud_startup_script(model: &str) -> String {
    [
        "#!/bin/bash".to_string(),
        "sleep 15".to_string(),
        "nvidia-smi | tee /tmp/nvidia-smi.txt".to_string(),
        "echo '[dejima] nvidia-smi done, starting vLLM container...'".to_string(),
        "docker run -d \\".to_string(),
        "  --gpus all \\".to_string(),
        format!("  -p {MODEL_PORT}:{MODEL_PORT} \\"),
        "  --name vllm-server \\".to_string(),
        "  --restart unless-stopped \\".to_string(),
        "  vllm/vllm-openai:latest \\".to_string(),
        format!("  --model {model} \\"),
        "  --quantization awq \\".to_string(),
        "  --dtype half \\".to_string(),
        "  --max-model-len 4096 \\".to_string(),
        format!("  --port {MODEL_PORT} \\"),
        "  --host 0.0.0.0 \\".to_string(),
        "  --enforce-eager 2>&1 | tee /tmp/vllm.log".to_string(),
    ]
    .join("\n")
}

/// On-start script for a marketplace container already running the vLLM
/// image. `--enforce-eager` skips graph compilation so the server comes up
/// in minutes.
#[must_use]
pub fn marketplace_onstart(model: &str) -> String {
    [
        "#!/bin/bash".to_string(),
        "nvidia-smi | tee /tmp/nvidia-smi.txt".to_string(),
        "echo '[dejima] nvidia-smi done, starting vLLM...'".to_string(),
        "python3 -m vllm.entrypoints.openai.api_server \\".to_string(),
        format!("  --model {model} \\"),
        "  --dtype half \\".to_string(),
        "  --max-model-len 4096 \\".to_string(),
        format!("  --port {MODEL_PORT} \\"),
        "  --host 0.0.0.0 \\".to_string(),
        "  --enforce-eager 2>&1 | tee /tmp/vllm.log".to_string(),
    ]
    .join("\n")
}
