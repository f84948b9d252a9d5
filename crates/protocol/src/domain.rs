//! Shared domain types: the wire/DTO shapes exchanged between the control
//! plane API and its callers, plus the static GPU profile catalog.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A vendor-defined MIG partition shape: a fixed compute-slice and
/// memory-slice size. Read-only, known at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuProfileDescriptor {
    pub name: String,
    pub compute_slices: u32,
    pub memory_slices: u32,
    pub memory_bytes: u64,
}

const GB: u64 = 1024 * 1024 * 1024;

fn profile(name: &str, compute_slices: u32, memory_slices: u32, memory_gb: u64) -> GpuProfileDescriptor {
    GpuProfileDescriptor {
        name: name.to_string(),
        compute_slices,
        memory_slices,
        memory_bytes: memory_gb * GB,
    }
}

/// The static catalog of MIG profiles this orchestrator understands.
///
/// Covers the 40GB-class and 80GB-class profile shapes; unknown profile
/// names discovered on the device are still tracked but won't resolve to a
/// descriptor via [`profile_catalog_lookup`].
pub fn profile_catalog() -> Vec<GpuProfileDescriptor> {
    vec![
        profile("1g.5gb", 1, 1, 5),
        profile("1g.5gb+me", 1, 1, 5),
        profile("1g.10gb", 1, 2, 10),
        profile("2g.10gb", 2, 2, 10),
        profile("2g.20gb", 2, 4, 20),
        profile("3g.20gb", 3, 4, 20),
        profile("3g.40gb", 3, 8, 40),
        profile("4g.20gb", 4, 4, 20),
        profile("4g.40gb", 4, 8, 40),
        profile("7g.40gb", 7, 8, 40),
        profile("7g.80gb", 7, 16, 80),
    ]
}

/// Look up a profile descriptor by name in the static catalog.
pub fn profile_catalog_lookup(name: &str) -> Option<GpuProfileDescriptor> {
    profile_catalog().into_iter().find(|p| p.name == name)
}

/// Immutable description of a discovered GPU/MIG partition.
///
/// Mutable hold state (`free | held(userId)`) lives in the server's
/// `GpuPool`, not here — this is the read-only descriptor shared over the
/// wire and used to seed the pool at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSliceDescriptor {
    pub uuid: String,
    pub profile_name: String,
    pub compute_slices: u32,
    pub memory_slices: u32,
    pub memory_bytes: u64,
}

/// A durable session row, also the `GET /sessions/{id}` response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub container_id: String,
    pub container_ip: String,
    pub host_ssh_port: u16,
    pub gpu_uuid: String,
    pub profile_name: String,
    pub ttl_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// `POST /sessions` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub ttl_minutes: Option<i64>,
    #[serde(default)]
    pub mig_profile: Option<String>,
    #[serde(default)]
    pub mig_instance_uuid: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

pub const DEFAULT_TTL_MINUTES: u32 = 60;
pub const DEFAULT_PROFILE: &str = "3g.20gb";

/// `POST /sessions` success response body.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub container_id: String,
    pub ssh_user: String,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_private_key: String,
    pub gpu_uuid: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpusResponse {
    pub gpus: Vec<GpuSliceDescriptor>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfilesResponse {
    pub profiles: Vec<GpuProfileDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableResponse {
    pub available_instances: Vec<GpuSliceDescriptor>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_canonical_profiles() {
        let names: Vec<_> = profile_catalog().into_iter().map(|p| p.name).collect();
        for expected in ["1g.5gb", "2g.10gb", "3g.20gb", "4g.20gb", "7g.40gb"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn lookup_unknown_profile_is_none() {
        assert!(profile_catalog_lookup("9g.999gb").is_none());
    }

    #[test]
    fn lookup_known_profile_has_expected_memory() {
        let d = profile_catalog_lookup("3g.20gb").unwrap();
        assert_eq!(d.memory_bytes, 20 * GB);
        assert_eq!(d.compute_slices, 3);
    }

    #[test]
    fn session_record_expiry() {
        let now = Utc::now();
        let rec = SessionRecord {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            container_id: "c1".into(),
            container_ip: "10.100.0.100".into(),
            host_ssh_port: 10000,
            gpu_uuid: "GPU-1".into(),
            profile_name: "3g.20gb".into(),
            ttl_minutes: 5,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(5),
            metadata: HashMap::new(),
        };
        assert!(!rec.is_expired(now));
        assert!(rec.is_expired(now + chrono::Duration::minutes(6)));
    }
}
