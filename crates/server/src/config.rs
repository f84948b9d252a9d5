//! CLI flag parsing layered over [`sandman_protocol::SandmanConfig`]
//! (`spec.md` §6). Flags win over an optional TOML file, which wins over
//! built-in defaults.

use std::path::PathBuf;

pub use sandman_protocol::SandmanConfig;

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub db: Option<String>,
    pub workspace_root: Option<String>,
    pub ssh_port_start: Option<u16>,
    pub ssh_port_end: Option<u16>,
}

pub fn parse_args() -> CliOverrides {
    let args: Vec<String> = std::env::args().collect();
    let mut overrides = CliOverrides::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    overrides.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--port" => {
                if i + 1 < args.len() {
                    overrides.port = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--db" => {
                if i + 1 < args.len() {
                    overrides.db = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--workspace-root" => {
                if i + 1 < args.len() {
                    overrides.workspace_root = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--ssh-port-start" => {
                if i + 1 < args.len() {
                    overrides.ssh_port_start = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--ssh-port-end" => {
                if i + 1 < args.len() {
                    overrides.ssh_port_end = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    overrides
}

/// Loads `SandmanConfig` from an optional TOML file and applies CLI
/// overrides on top.
pub fn load_config(overrides: &CliOverrides) -> anyhow::Result<SandmanConfig> {
    let path = overrides
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("./sandman.toml"));
    let mut config = SandmanConfig::load(&path)?;

    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(db) = &overrides.db {
        config.server.db = db.clone();
    }
    if let Some(workspace_root) = &overrides.workspace_root {
        config.server.workspace_root = workspace_root.clone();
    }
    if let Some(start) = overrides.ssh_port_start {
        config.server.ssh_port_start = start;
    }
    if let Some(end) = overrides.ssh_port_end {
        config.server.ssh_port_end = end;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/nonexistent/sandman.toml")),
            port: Some(9090),
            db: None,
            workspace_root: None,
            ssh_port_start: Some(30000),
            ssh_port_end: None,
        };
        let config = load_config(&overrides).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.ssh_port_start, 30000);
        assert_eq!(config.server.ssh_port_end, 20000);
    }
}
