//! Driver configuration
//!
//! Defaults can be overridden by a `mudlark.toml` at the mudlib root and
//! then by CLI flags. The heartbeat tick lives here and nowhere else; all
//! scheduler arithmetic derives from `tick_millis`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// TCP port for server mode.
    pub port: u16,
    /// Heartbeat tick in milliseconds.
    pub tick_millis: u64,
    /// Instruction budget per dispatch (AST steps).
    pub eval_budget: u64,
    /// Maximum activation depth per dispatch.
    pub max_call_depth: usize,
    /// Canonical path of the master blueprint.
    pub master_path: String,
    /// Fallback player blueprint when the master has no login hook.
    pub player_path: String,
    /// Directory searched for `verb.c` command objects.
    pub cmd_dir: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            port: 4000,
            tick_millis: 2000,
            eval_budget: 100_000,
            max_call_depth: 64,
            master_path: "/secure/master".to_string(),
            player_path: "/std/player".to_string(),
            cmd_dir: "/cmds".to_string(),
        }
    }
}

impl DriverConfig {
    /// Load `mudlark.toml` from the mudlib root, falling back to defaults
    /// when absent or unreadable.
    pub fn load(mudlib_root: &Path) -> DriverConfig {
        let file = mudlib_root.join("mudlark.toml");
        match fs::read_to_string(&file) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "bad mudlark.toml, using defaults");
                    DriverConfig::default()
                }
            },
            Err(_) => DriverConfig::default(),
        }
    }

    pub fn tick_seconds(&self) -> u64 {
        (self.tick_millis / 1000).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = DriverConfig::default();
        assert_eq!(c.tick_millis, 2000);
        assert_eq!(c.eval_budget, 100_000);
        assert_eq!(c.master_path, "/secure/master");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let c: DriverConfig = toml::from_str("port = 5000\ntick_millis = 1000\n").unwrap();
        assert_eq!(c.port, 5000);
        assert_eq!(c.tick_millis, 1000);
        // untouched fields keep defaults
        assert_eq!(c.eval_budget, 100_000);
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let c = DriverConfig::load(Path::new("/definitely/not/here"));
        assert_eq!(c.port, 4000);
    }
}
