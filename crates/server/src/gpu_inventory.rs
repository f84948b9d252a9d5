//! Discovers GPU/MIG partitions by parsing `nvidia-smi -L` (`spec.md` §4.5).
//!
//! `nvidia-smi -L` output looks like:
//! ```text
//! GPU 0: NVIDIA A100-SXM4-80GB (UUID: GPU-3a1b2c3d-...)
//!   MIG 3g.40gb     Device  0: (UUID: MIG-aabbccdd-...)
//!   MIG 4g.40gb     Device  1: (UUID: MIG-eeff0011-...)
//! ```
//! Only `MIG` lines become slices: a non-partitioned GPU exposes no
//! allocatable sandbox and is out of scope for this orchestrator.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use sandman_protocol::{profile_catalog_lookup, GpuProfileDescriptor, GpuSliceDescriptor};

#[async_trait]
pub trait GpuInventory: Send + Sync {
    async fn list_slices(&self) -> Result<Vec<GpuSliceDescriptor>>;

    fn profiles(&self) -> Vec<GpuProfileDescriptor> {
        sandman_protocol::profile_catalog()
    }
}

pub struct NvidiaSmiInventory;

#[async_trait]
impl GpuInventory for NvidiaSmiInventory {
    async fn list_slices(&self) -> Result<Vec<GpuSliceDescriptor>> {
        let output = tokio::process::Command::new("nvidia-smi")
            .arg("-L")
            .output()
            .await
            .context("failed to invoke nvidia-smi")?;

        if !output.status.success() {
            anyhow::bail!(
                "nvidia-smi exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_mig_slices(&stdout))
    }
}

fn parse_mig_slices(output: &str) -> Vec<GpuSliceDescriptor> {
    // MIG <profile>   Device  N: (UUID: MIG-...)
    let mig_line = Regex::new(r"MIG\s+(\S+)\s+Device\s+\d+:\s+\(UUID:\s+(MIG-[0-9a-fA-F-]+)\)")
        .expect("static regex is valid");

    let mut slices = Vec::new();
    for line in output.lines() {
        let Some(captures) = mig_line.captures(line) else {
            continue;
        };
        let profile_name = captures[1].to_string();
        let uuid = captures[2].to_string();

        let descriptor = match profile_catalog_lookup(&profile_name) {
            Some(d) => d,
            None => {
                tracing::warn!(profile_name, uuid, "nvidia-smi reported an unrecognised MIG profile");
                continue;
            }
        };

        slices.push(GpuSliceDescriptor {
            uuid,
            profile_name,
            compute_slices: descriptor.compute_slices,
            memory_slices: descriptor.memory_slices,
            memory_bytes: descriptor.memory_bytes,
        });
    }
    slices
}

#[cfg(test)]
pub struct FakeGpuInventory {
    slices: Vec<GpuSliceDescriptor>,
}

#[cfg(test)]
impl FakeGpuInventory {
    pub fn new(slices: Vec<GpuSliceDescriptor>) -> Self {
        Self { slices }
    }
}

#[cfg(test)]
#[async_trait]
impl GpuInventory for FakeGpuInventory {
    async fn list_slices(&self) -> Result<Vec<GpuSliceDescriptor>> {
        Ok(self.slices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
GPU 0: NVIDIA A100-SXM4-80GB (UUID: GPU-3a1b2c3d-4e5f-6789-0123-456789abcdef)
  MIG 3g.40gb     Device  0: (UUID: MIG-aabbccdd-1111-2222-3333-444455556666)
  MIG 4g.40gb     Device  1: (UUID: MIG-eeff0011-2222-3333-4444-555566667777)
GPU 1: NVIDIA A100-SXM4-80GB (UUID: GPU-0f1e2d3c-4b5a-6978-8901-234567abcdef)
  MIG 1g.5gb      Device  0: (UUID: MIG-01020304-0506-0708-090a-0b0c0d0e0f10)
";

    #[test]
    fn parses_mig_lines_with_known_profiles() {
        let slices = parse_mig_slices(SAMPLE_OUTPUT);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].profile_name, "3g.40gb");
        assert_eq!(slices[0].uuid, "MIG-aabbccdd-1111-2222-3333-444455556666");
        assert_eq!(slices[2].profile_name, "1g.5gb");
    }

    #[test]
    fn ignores_non_mig_lines() {
        let slices = parse_mig_slices("GPU 0: NVIDIA A100 (UUID: GPU-abc)\n");
        assert!(slices.is_empty());
    }

    #[test]
    fn skips_unrecognised_profile_names() {
        let output = "  MIG 9g.999gb     Device  0: (UUID: MIG-ffffffff-ffff-ffff-ffff-ffffffffffff)\n";
        assert!(parse_mig_slices(output).is_empty());
    }
}
