// ⚙️ Configuration - layered settings for the CLI, TUI and server
//
// Precedence (highest to lowest):
//   1. Environment variables (`TIER_BOARD_*`)
//   2. `tier-board.toml` in the working directory
//   3. `~/.config/tier-board/config.toml`
//   4. Defaults

use crate::error::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "TIER_BOARD_";
pub const LOCAL_CONFIG_FILE: &str = "tier-board.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding the editor state, library and identity
    pub database_path: PathBuf,
    /// Author name override; falls back to the stored name
    pub user_name: Option<String>,
    /// Address the API server listens on
    pub bind_address: String,
    /// Where exports and shared images are downloaded
    pub export_dir: PathBuf,
    /// Extra share targets, one command line each (image piped to stdin)
    pub share_commands: Vec<String>,
    /// Generate thumbnails when saving to the library
    pub thumbnails: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: default_database_path(),
            user_name: None,
            bind_address: "127.0.0.1:3000".to_string(),
            export_dir: PathBuf::from("."),
            share_commands: Vec::new(),
            thumbnails: true,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("tier-board").join("tier-board.db"))
        .unwrap_or_else(|| PathBuf::from("tier-board.db"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let config: Config = Self::figment().extract().map_err(Box::new)?;
        tracing::debug!(database = %config.database_path.display(), "configuration loaded");
        Ok(config)
    }

    /// Provider chain, exposed so callers can merge CLI overrides on top
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tier-board").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert!(config.user_name.is_none());
        assert!(config.share_commands.is_empty());
        assert!(config.thumbnails);
        assert!(config.database_path.ends_with("tier-board.db"));
    }

    #[test]
    fn test_local_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
database_path = "boards.db"
user_name = "Ana"
share_commands = ["wl-copy"]
"#,
            )?;

            let config: Config = Config::figment().extract()?;

            assert_eq!(config.database_path, PathBuf::from("boards.db"));
            assert_eq!(config.user_name.as_deref(), Some("Ana"));
            assert_eq!(config.share_commands, vec!["wl-copy".to_string()]);
            assert_eq!(config.bind_address, "127.0.0.1:3000");
            Ok(())
        });
    }

    #[test]
    fn test_env_wins_over_file() {
        Jail::expect_with(|jail| {
            jail.create_file(LOCAL_CONFIG_FILE, r#"bind_address = "127.0.0.1:9000""#)?;
            jail.set_env("TIER_BOARD_BIND_ADDRESS", "0.0.0.0:8080");
            jail.set_env("TIER_BOARD_THUMBNAILS", "false");

            let config: Config = Config::figment().extract()?;

            assert_eq!(config.bind_address, "0.0.0.0:8080");
            assert!(!config.thumbnails);
            Ok(())
        });
    }
}
