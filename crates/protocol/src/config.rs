use serde::{Deserialize, Serialize};

/// Top-level configuration. CLI flags (`spec.md` §6) win over an optional
/// TOML file, which in turn wins over these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandmanConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub session: SessionDefaults,
    #[serde(default)]
    pub reaper: ReaperConfig,
}

impl Default for SandmanConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            network: NetworkConfig::default(),
            session: SessionDefaults::default(),
            reaper: ReaperConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite-style path to the durable session store.
    #[serde(default = "default_db_path")]
    pub db: String,
    /// Root directory under which `<workspace_root>/<userId>` is created.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
    /// Lowest host port ever handed out by the `PortPool`.
    #[serde(default = "default_ssh_port_start")]
    pub ssh_port_start: u16,
    /// Highest host port ever handed out by the `PortPool` (inclusive).
    #[serde(default = "default_ssh_port_end")]
    pub ssh_port_end: u16,
    /// Human-readable name surfaced on `GET /healthz`.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            db: default_db_path(),
            workspace_root: default_workspace_root(),
            ssh_port_start: default_ssh_port_start(),
            ssh_port_end: default_ssh_port_end(),
            service_name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Name of the private bridge network all session containers attach to.
    #[serde(default = "default_bridge_name")]
    pub bridge_name: String,
    /// CIDR subnet of the bridge network.
    #[serde(default = "default_subnet")]
    pub subnet: String,
    /// Lowest host octet handed out by the `IpPool`.
    #[serde(default = "default_ip_range_start")]
    pub ip_range_start: u8,
    /// Highest host octet handed out by the `IpPool` (inclusive).
    #[serde(default = "default_ip_range_end")]
    pub ip_range_end: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge_name: default_bridge_name(),
            subnet: default_subnet(),
            ip_range_start: default_ip_range_start(),
            ip_range_end: default_ip_range_end(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: u32,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_ttl_minutes: default_ttl_minutes(),
            default_profile: default_profile_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_db_path() -> String {
    "./sandman.db".to_string()
}
fn default_workspace_root() -> String {
    "/srv/workspaces".to_string()
}
fn default_ssh_port_start() -> u16 {
    10000
}
fn default_ssh_port_end() -> u16 {
    20000
}
fn default_service_name() -> String {
    "sandman".to_string()
}
fn default_bridge_name() -> String {
    "sandman_worknet".to_string()
}
fn default_subnet() -> String {
    "10.100.0.0/16".to_string()
}
fn default_ip_range_start() -> u8 {
    100
}
fn default_ip_range_end() -> u8 {
    254
}
fn default_ttl_minutes() -> u32 {
    60
}
fn default_profile_name() -> String {
    "3g.20gb".to_string()
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl SandmanConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file is absent (mirrors the teacher's `load_config`).
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SandmanConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.ssh_port_start, 10000);
        assert_eq!(cfg.server.ssh_port_end, 20000);
        assert_eq!(cfg.network.bridge_name, "sandman_worknet");
        assert_eq!(cfg.network.subnet, "10.100.0.0/16");
        assert_eq!(cfg.session.default_ttl_minutes, 60);
        assert_eq!(cfg.session.default_profile, "3g.20gb");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = SandmanConfig::load(std::path::Path::new("/nonexistent/sandman.toml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_str = r#"
            [server]
            port = 9090
        "#;
        let cfg: SandmanConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.bind, "0.0.0.0");
    }
}
