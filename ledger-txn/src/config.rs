//! Configuration loader (spec.md §6: "Reads `server.conf` (optional) with
//! `KEY=VALUE` lines"). CLI parsing and configuration file parsing are both
//! out of scope as full-featured subsystems (spec.md §1), so this stays a
//! minimal hand-rolled reader rather than pulling in a config crate.

use std::path::Path;

/// Server configuration: the pieces that do not change once a `server`
/// process has started (spec.md §5: "Configuration is read once at
/// startup and thereafter immutable").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind the listening socket to.
    pub host: String,
    /// Port to bind the listening socket to (1-65535).
    pub port: u16,
    /// Path to the data CSV file this server serializes access to.
    pub csv_file: String,
    /// Path to the append-only event log (spec.md §6: "each line prefixed
    /// `[LOG]`").
    pub log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            csv_file: "datos.csv".to_string(),
            log_file: "server.log".to_string(),
        }
    }
}

impl Config {
    /// Load `path` if it exists, overriding [`Config::default`] fields
    /// present in the file; if `path` does not exist, returns the defaults
    /// unchanged (the file is optional per spec.md §6).
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(config),
            Err(err) => return Err(err),
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "HOST" => config.host = value.to_string(),
                "PORT" => {
                    if let Ok(port) = value.parse::<u16>() {
                        if port != 0 {
                            config.port = port;
                        }
                    }
                }
                "CSV_FILE" => config.csv_file = value.to_string(),
                "LOG_FILE" => config.log_file = value.to_string(),
                // Unknown keys ignored (spec.md §6).
                _ => {}
            }
        }
        Ok(config)
    }
}
