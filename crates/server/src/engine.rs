//! The session lifecycle engine (`spec.md` §4.6) — the core of the system.
//! Orchestrates `CreateSession`, `DeleteSession`, `DeleteAllSessions`, and
//! backs the reaper's `SweepExpired`.

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use sandman_protocol::{CreateSessionRequest, CreateSessionResponse, SessionRecord};
use serde::Serialize;
use uuid::Uuid;

use crate::container_runtime::{build_tar_context, ContainerRuntime, ContainerSpec};
use crate::error::EngineError;
use crate::identity::IdentityMinter;
use crate::pools::{GpuPool, IpPool, PortPool};
use crate::store::SessionStore;

const WORKSPACE_INIT_CONTENTS: &str = "# Welcome to your Sandman workspace.\n# This directory survives session deletion.\n";
const GRACEFUL_STOP_TIMEOUT_SECS: i64 = 10;
const CONTAINER_PIDS_LIMIT: i64 = 512;

/// Ordered, reversible compensating actions accumulated while `CreateSession`
/// acquires resources. On failure the ladder unwinds in reverse; on success
/// it is discarded without ever running.
enum RollbackStep {
    ReleaseGpu { uuid: String, user_id: String },
    ReleasePort(u16),
    RemoveContainer(String),
}

pub struct SessionEngine {
    gpu_pool: GpuPool,
    port_pool: PortPool,
    ip_pool: IpPool,
    store: SessionStore,
    runtime: Arc<dyn ContainerRuntime>,
    identity_minter: Arc<dyn IdentityMinter>,
    workspace_root: String,
    network_name: String,
    /// Shared by concurrent `CreateSession`s, held exclusively by
    /// `DeleteAllSessions` so a bulk teardown can't interleave with a new
    /// create (`spec.md` §4.6.3) without serializing creates against each
    /// other the rest of the time.
    bulk_lock: tokio::sync::RwLock<()>,
    metrics: EngineMetrics,
}

pub struct DeleteAllSummary {
    pub deleted: usize,
}

/// Lock-free process counters surfaced on `GET /metrics`, in the same
/// `AtomicU64`-on-shared-state idiom the teacher uses for its own login and
/// agent-restart counters.
#[derive(Default)]
struct EngineMetrics {
    sessions_created_total: AtomicU64,
    sessions_deleted_total: AtomicU64,
    sessions_reaped_total: AtomicU64,
    creation_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_created_total: u64,
    pub sessions_deleted_total: u64,
    pub sessions_reaped_total: u64,
    pub creation_failures_total: u64,
}

impl SessionEngine {
    pub fn new(
        gpu_pool: GpuPool,
        port_pool: PortPool,
        ip_pool: IpPool,
        store: SessionStore,
        runtime: Arc<dyn ContainerRuntime>,
        identity_minter: Arc<dyn IdentityMinter>,
        workspace_root: String,
        network_name: String,
    ) -> Self {
        Self {
            gpu_pool,
            port_pool,
            ip_pool,
            store,
            runtime,
            identity_minter,
            workspace_root,
            network_name,
            bulk_lock: tokio::sync::RwLock::new(()),
            metrics: EngineMetrics::default(),
        }
    }

    pub fn gpu_pool(&self) -> &GpuPool {
        &self.gpu_pool
    }

    pub fn port_pool(&self) -> &PortPool {
        &self.port_pool
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_created_total: self.metrics.sessions_created_total.load(Ordering::Relaxed),
            sessions_deleted_total: self.metrics.sessions_deleted_total.load(Ordering::Relaxed),
            sessions_reaped_total: self.metrics.sessions_reaped_total.load(Ordering::Relaxed),
            creation_failures_total: self.metrics.creation_failures_total.load(Ordering::Relaxed),
        }
    }

    pub async fn create_session(
        &self,
        req: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, EngineError> {
        let result = self.create_session_inner(req).await;
        match &result {
            Ok(_) => {
                self.metrics.sessions_created_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.creation_failures_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    async fn create_session_inner(
        &self,
        req: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, EngineError> {
        let _bulk_guard = self.bulk_lock.read().await;

        if req.user_id.trim().is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".to_string()));
        }

        let ttl_minutes = match req.ttl_minutes {
            Some(t) if t > 0 => t as u32,
            _ => sandman_protocol::DEFAULT_TTL_MINUTES,
        };

        // 1. Uniqueness check.
        if self
            .store
            .get_by_user(&req.user_id)
            .await
            .map_err(EngineError::RuntimeFault)?
            .is_some()
        {
            return Err(EngineError::DuplicateUser(req.user_id));
        }

        let mut rollback: Vec<RollbackStep> = Vec::new();

        // 2. Mint identity.
        let comment = format!("{}@sandbox", req.user_id);
        let identity = self.identity_minter.mint(&comment).map_err(EngineError::RuntimeFault)?;

        // 3. Reserve GPU.
        let gpu = match &req.mig_instance_uuid {
            Some(uuid) => self.gpu_pool.allocate_by_uuid(uuid, &req.user_id).await,
            None => {
                let profile_name = req
                    .mig_profile
                    .clone()
                    .unwrap_or_else(|| sandman_protocol::DEFAULT_PROFILE.to_string());
                self.gpu_pool.allocate_by_profile(&profile_name, &req.user_id).await
            }
        };
        let gpu = match gpu {
            Ok(g) => g,
            Err(e) => return Err(e),
        };
        rollback.push(RollbackStep::ReleaseGpu {
            uuid: gpu.uuid.clone(),
            user_id: req.user_id.clone(),
        });

        // 4. Reserve host port.
        let host_port = match self.port_pool.allocate().await {
            Ok(p) => p,
            Err(e) => {
                self.unwind(rollback, &req.user_id).await;
                return Err(e);
            }
        };
        rollback.push(RollbackStep::ReleasePort(host_port));

        // 5. Reserve IP.
        let container_ip = match self.ip_pool.allocate(self.runtime.as_ref()).await {
            Ok(ip) => ip,
            Err(e) => {
                self.unwind(rollback, &req.user_id).await;
                return Err(e);
            }
        };

        // 6. Prepare workspace.
        if let Err(e) = self.prepare_workspace(&req.user_id).await {
            self.unwind(rollback, &req.user_id).await;
            return Err(EngineError::RuntimeFault(e));
        }

        // 7. Build image.
        let image_tag = format!("gpu-workspace-{}", req.user_id);
        let mut build_args = HashMap::new();
        build_args.insert("USERNAME".to_string(), req.user_id.clone());
        build_args.insert("UID".to_string(), "1001".to_string());
        build_args.insert("GID".to_string(), "1001".to_string());
        build_args.insert("PUBKEY".to_string(), identity.public_key_line.clone());

        let context_tar = match build_tar_context(&session_build_context_files()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.unwind(rollback, &req.user_id).await;
                return Err(EngineError::RuntimeFault(e));
            }
        };

        let image_ref = match self
            .runtime
            .build_session_image(context_tar, &image_tag, build_args)
            .await
        {
            Ok(tag) => tag,
            Err(e) => {
                self.unwind(rollback, &req.user_id).await;
                return Err(EngineError::RuntimeFault(e));
            }
        };

        // 8. Create and start container.
        let container_name = format!("{}-container", req.user_id);
        let spec = ContainerSpec {
            name: container_name.clone(),
            image: image_ref.clone(),
            env: vec![
                format!("USER_ID={}", req.user_id),
                format!("NVIDIA_VISIBLE_DEVICES={}", gpu.uuid),
            ],
            workspace_host_path: self.workspace_path(&req.user_id),
            gpu_uuid: gpu.uuid.clone(),
            network_name: self.network_name.clone(),
            static_ip: container_ip.clone(),
            host_port,
            pids_limit: CONTAINER_PIDS_LIMIT,
        };

        let created = match self.runtime.create_container(&spec).await {
            Ok(c) => c,
            Err(e) => {
                self.unwind(rollback, &req.user_id).await;
                return Err(EngineError::RuntimeFault(e));
            }
        };
        rollback.push(RollbackStep::RemoveContainer(created.id.clone()));

        if let Err(e) = self.runtime.start_container(&created.id).await {
            self.unwind(rollback, &req.user_id).await;
            return Err(EngineError::RuntimeFault(e));
        }

        // 9. Persist.
        let now = Utc::now();
        let expires_at = now + ChronoDuration::minutes(ttl_minutes as i64);
        let mut metadata = HashMap::new();
        metadata.insert("image".to_string(), image_ref.clone());
        metadata.insert("workspace_path".to_string(), self.workspace_path(&req.user_id));
        metadata.insert("host_port".to_string(), host_port.to_string());

        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: req.user_id.clone(),
            container_id: created.id.clone(),
            container_ip: created.assigned_ip.clone(),
            host_ssh_port: host_port,
            gpu_uuid: gpu.uuid.clone(),
            profile_name: gpu.profile_name.clone(),
            ttl_minutes,
            created_at: now,
            expires_at,
            metadata,
        };

        if let Err(e) = self.store.create(&record).await {
            // stop+remove container, release pools
            self.unwind(rollback, &req.user_id).await;
            return Err(e);
        }

        Ok(CreateSessionResponse {
            session_id: record.id,
            container_id: record.container_id,
            ssh_user: req.user_id,
            ssh_host: "localhost".to_string(),
            ssh_port: host_port,
            ssh_private_key: identity.private_key_pem,
            gpu_uuid: record.gpu_uuid,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }

    /// Unwinds the rollback ladder in reverse order. Best-effort: logs and
    /// continues on each step's failure rather than aborting the unwind.
    async fn unwind(&self, mut rollback: Vec<RollbackStep>, user_id: &str) {
        while let Some(step) = rollback.pop() {
            match step {
                RollbackStep::ReleaseGpu { uuid, user_id } => {
                    self.gpu_pool.release(&uuid, &user_id).await;
                }
                RollbackStep::ReleasePort(port) => {
                    self.port_pool.release(port).await;
                }
                RollbackStep::RemoveContainer(id) => {
                    if let Err(e) = self.runtime.stop_container(&id, GRACEFUL_STOP_TIMEOUT_SECS).await {
                        tracing::warn!(container_id = id, user_id, error = %e, "rollback: stop failed");
                    }
                    if let Err(e) = self.runtime.remove_container(&id).await {
                        tracing::warn!(container_id = id, user_id, error = %e, "rollback: remove failed");
                    }
                }
            }
        }
    }

    async fn prepare_workspace(&self, user_id: &str) -> anyhow::Result<()> {
        let path = self.workspace_path(user_id);
        let created_now = !tokio::fs::try_exists(&path).await.unwrap_or(false);
        tokio::fs::create_dir_all(&path).await?;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).await?;

        if created_now {
            let init_path = format!("{path}/.workspace_init");
            tokio::fs::write(&init_path, WORKSPACE_INIT_CONTENTS).await?;
        }
        Ok(())
    }

    fn workspace_path(&self, user_id: &str) -> String {
        format!("{}/{}", self.workspace_root.trim_end_matches('/'), user_id)
    }

    /// Explicit deletion (`spec.md` §4.6.2), counted separately from reaper
    /// expiry in the `/metrics` snapshot.
    pub async fn delete_session(&self, id: Uuid) -> Result<(), EngineError> {
        let result = self.teardown(id).await;
        if result.is_ok() {
            self.metrics.sessions_deleted_total.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Shared teardown for explicit deletion and reaper expiry (`spec.md`
    /// §4.6.2). Best-effort past the record lookup: logs and continues so a
    /// single failed step doesn't block releasing the rest.
    async fn teardown(&self, id: Uuid) -> Result<(), EngineError> {
        let record = self
            .store
            .get(id)
            .await
            .map_err(EngineError::RuntimeFault)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        if let Err(e) = self
            .runtime
            .stop_container(&record.container_id, GRACEFUL_STOP_TIMEOUT_SECS)
            .await
        {
            tracing::warn!(session_id = %id, error = %e, "delete: stop container failed");
        }
        if let Err(e) = self.runtime.remove_container(&record.container_id).await {
            tracing::warn!(session_id = %id, error = %e, "delete: remove container failed");
        }

        self.gpu_pool.release(&record.gpu_uuid, &record.user_id).await;
        self.port_pool.release(record.host_ssh_port).await;
        self.ip_pool.release(&record.container_ip);

        self.store
            .delete(id)
            .await
            .map_err(EngineError::RuntimeFault)?;
        Ok(())
    }

    /// Aggregates per-record teardown errors (`spec.md` §4.6.3): succeeds
    /// only if every record tore down cleanly, else fails with a summary
    /// error describing how many of how many failed.
    pub async fn delete_all_sessions(&self) -> Result<DeleteAllSummary, EngineError> {
        let _bulk_guard = self.bulk_lock.write().await;

        let records = self.store.list_all().await.map_err(EngineError::RuntimeFault)?;
        let total = records.len();
        let mut deleted = 0;
        let mut failed = Vec::new();

        for record in records {
            match self.delete_session(record.id).await {
                Ok(()) => deleted += 1,
                Err(e) => failed.push((record.id, e.to_string())),
            }
        }

        if !failed.is_empty() {
            return Err(EngineError::RuntimeFault(anyhow::anyhow!(
                "{} of {} session deletions failed",
                failed.len(),
                total
            )));
        }

        Ok(DeleteAllSummary { deleted })
    }

    /// The reaper's hook (`spec.md` §4.6.4): tears down everything whose
    /// `expiresAt` has passed. Per-record failures are logged and retried on
    /// the next sweep.
    pub async fn sweep_expired(&self) -> usize {
        let expired = match self.store.list_expired(Utc::now()).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "reaper: failed to list expired sessions");
                return 0;
            }
        };

        let mut swept = 0;
        for record in expired {
            match self.teardown(record.id).await {
                Ok(()) => {
                    swept += 1;
                    self.metrics.sessions_reaped_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => tracing::error!(session_id = %record.id, error = %e, "reaper: teardown failed, will retry"),
            }
        }
        swept
    }

    /// Rebuilds in-memory pool state from persisted records and compares
    /// against the live container runtime (`spec.md` §5, startup
    /// reconciliation). Must run before serving traffic.
    pub async fn reconcile_on_startup(&self) -> anyhow::Result<()> {
        let records = self.store.list_all().await?;
        let live = self.runtime.list_session_containers(&self.network_name).await?;
        let live_ids: std::collections::HashSet<_> = live.iter().map(|c| c.id.clone()).collect();
        let record_container_ids: std::collections::HashSet<_> =
            records.iter().map(|r| r.container_id.clone()).collect();

        for record in &records {
            if live_ids.contains(&record.container_id) {
                self.gpu_pool.reconcile_held(&record.gpu_uuid, &record.user_id).await;
                self.port_pool.reconcile_held(record.host_ssh_port).await;
            } else {
                tracing::warn!(session_id = %record.id, "reconciliation: container gone, tearing down record");
                if let Err(e) = self.store.delete(record.id).await {
                    tracing::error!(session_id = %record.id, error = %e, "reconciliation: failed to delete orphaned record");
                }
            }
        }

        for container in &live {
            if !record_container_ids.contains(&container.id) {
                tracing::warn!(container_id = container.id, name = container.name, "reconciliation: removing orphan container");
                if let Err(e) = self.runtime.stop_container(&container.id, GRACEFUL_STOP_TIMEOUT_SECS).await {
                    tracing::warn!(container_id = container.id, error = %e, "reconciliation: stop failed");
                }
                if let Err(e) = self.runtime.remove_container(&container.id).await {
                    tracing::warn!(container_id = container.id, error = %e, "reconciliation: remove failed");
                }
            }
        }

        Ok(())
    }
}

fn session_build_context_files() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("Dockerfile", include_bytes!("../build_context/Dockerfile").to_vec()),
        ("sshd_config", include_bytes!("../build_context/sshd_config").to_vec()),
        ("entrypoint.sh", include_bytes!("../build_context/entrypoint.sh").to_vec()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_runtime::FakeContainerRuntime;
    use crate::gpu_inventory::{FakeGpuInventory, GpuInventory};
    use crate::identity::RsaIdentityMinter;
    use sandman_protocol::GpuSliceDescriptor;

    fn slice(uuid: &str, profile: &str) -> GpuSliceDescriptor {
        GpuSliceDescriptor {
            uuid: uuid.to_string(),
            profile_name: profile.to_string(),
            compute_slices: 3,
            memory_slices: 4,
            memory_bytes: 20 * 1024 * 1024 * 1024,
        }
    }

    async fn build_engine(tmp: &std::path::Path) -> (SessionEngine, Arc<FakeContainerRuntime>) {
        let inventory = FakeGpuInventory::new(vec![slice("GPU-1", "3g.20gb")]);
        let slices = inventory.list_slices().await.unwrap();
        let gpu_pool = GpuPool::new(slices);
        let port_pool = PortPool::new(10000, 10001);
        let ip_pool = IpPool::new("10.100.0.0/16", 100, 101, "sandman_worknet".to_string());
        let store = SessionStore::open_in_memory().await.unwrap();
        let runtime = Arc::new(FakeContainerRuntime::new());
        let identity_minter = Arc::new(RsaIdentityMinter);

        let engine = SessionEngine::new(
            gpu_pool,
            port_pool,
            ip_pool,
            store,
            runtime.clone(),
            identity_minter,
            tmp.to_string_lossy().to_string(),
            "sandman_worknet".to_string(),
        );
        (engine, runtime)
    }

    fn basic_request(user_id: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            user_id: user_id.to_string(),
            ttl_minutes: Some(5),
            mig_profile: Some("3g.20gb".to_string()),
            mig_instance_uuid: None,
            image: None,
        }
    }

    #[tokio::test]
    async fn create_session_happy_path() {
        let tmp = tempdir();
        let (engine, runtime) = build_engine(tmp.path()).await;

        let resp = engine.create_session(basic_request("alice")).await.unwrap();
        assert_eq!(resp.ssh_user, "alice");
        assert_eq!(resp.gpu_uuid, "GPU-1");
        assert_eq!(runtime.container_count(), 1);
        assert_eq!(engine.gpu_pool().snapshot_free().await.len(), 0);
    }

    #[tokio::test]
    async fn metrics_count_creates_deletes_and_failures() {
        let tmp = tempdir();
        let (engine, runtime) = build_engine(tmp.path()).await;

        let resp = engine.create_session(basic_request("alice")).await.unwrap();
        runtime.set_fail_create(true);
        engine.create_session(basic_request("bob")).await.unwrap_err();
        engine.delete_session(resp.session_id).await.unwrap();

        let snapshot = engine.metrics_snapshot();
        assert_eq!(snapshot.sessions_created_total, 1);
        assert_eq!(snapshot.creation_failures_total, 1);
        assert_eq!(snapshot.sessions_deleted_total, 1);
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected_and_state_unchanged() {
        let tmp = tempdir();
        let (engine, _runtime) = build_engine(tmp.path()).await;

        engine.create_session(basic_request("alice")).await.unwrap();
        let err = engine.create_session(basic_request("alice")).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateUser(_)));
        assert_eq!(engine.store().list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn gpu_exhaustion_leaves_no_leaked_holds() {
        let tmp = tempdir();
        let (engine, _runtime) = build_engine(tmp.path()).await;

        engine.create_session(basic_request("alice")).await.unwrap();
        let err = engine.create_session(basic_request("bob")).await.unwrap_err();
        assert!(matches!(err, EngineError::GpuExhausted));
        // Bob's port reservation must have been rolled back.
        assert_eq!(engine.port_pool().allocate().await.unwrap(), 10001);
    }

    #[tokio::test]
    async fn container_create_failure_rolls_back_gpu_and_port() {
        let tmp = tempdir();
        let (engine, runtime) = build_engine(tmp.path()).await;
        runtime.set_fail_create(true);

        let err = engine.create_session(basic_request("alice")).await.unwrap_err();
        assert!(matches!(err, EngineError::RuntimeFault(_)));
        assert_eq!(engine.gpu_pool().snapshot_free().await.len(), 1);
        assert_eq!(engine.port_pool().allocate().await.unwrap(), 10000);
    }

    #[tokio::test]
    async fn delete_session_releases_all_resources() {
        let tmp = tempdir();
        let (engine, runtime) = build_engine(tmp.path()).await;

        let resp = engine.create_session(basic_request("alice")).await.unwrap();
        engine.delete_session(resp.session_id).await.unwrap();

        assert_eq!(engine.gpu_pool().snapshot_free().await.len(), 1);
        assert_eq!(runtime.container_count(), 0);
        assert!(engine.store().get(resp.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_session_twice_yields_not_found_second_time() {
        let tmp = tempdir();
        let (engine, _runtime) = build_engine(tmp.path()).await;

        let resp = engine.create_session(basic_request("alice")).await.unwrap();
        engine.delete_session(resp.session_id).await.unwrap();
        let err = engine.delete_session(resp.session_id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn sweep_expired_tears_down_past_due_sessions() {
        let tmp = tempdir();
        let (engine, _runtime) = build_engine(tmp.path()).await;

        let mut req = basic_request("alice");
        req.ttl_minutes = Some(1);
        let resp = engine.create_session(req).await.unwrap();

        // Force expiry by rewriting the record's expiry into the past.
        let mut record = engine.store().get(resp.session_id).await.unwrap().unwrap();
        record.expires_at = Utc::now() - ChronoDuration::minutes(1);
        engine.store().delete(record.id).await.unwrap();
        engine.store().create(&record).await.unwrap();

        let swept = engine.sweep_expired().await;
        assert_eq!(swept, 1);
        assert_eq!(engine.gpu_pool().snapshot_free().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_all_sessions_deletes_every_record() {
        let tmp = tempdir();
        let inventory = FakeGpuInventory::new(vec![slice("GPU-1", "3g.20gb"), slice("GPU-2", "3g.20gb")]);
        let slices = inventory.list_slices().await.unwrap();
        let gpu_pool = GpuPool::new(slices);
        let port_pool = PortPool::new(10000, 10001);
        let ip_pool = IpPool::new("10.100.0.0/16", 100, 101, "sandman_worknet".to_string());
        let store = SessionStore::open_in_memory().await.unwrap();
        let runtime = Arc::new(FakeContainerRuntime::new());
        let identity_minter = Arc::new(RsaIdentityMinter);
        let engine = SessionEngine::new(
            gpu_pool,
            port_pool,
            ip_pool,
            store,
            runtime,
            identity_minter,
            tmp.path().to_string_lossy().to_string(),
            "sandman_worknet".to_string(),
        );

        engine.create_session(basic_request("alice")).await.unwrap();
        engine.create_session(basic_request("bob")).await.unwrap();

        let summary = engine.delete_all_sessions().await.unwrap();
        assert_eq!(summary.deleted, 2);
        assert!(engine.store().list_all().await.unwrap().is_empty());
        assert_eq!(engine.gpu_pool().snapshot_free().await.len(), 2);
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().expect("failed to create tempdir")
    }
}
