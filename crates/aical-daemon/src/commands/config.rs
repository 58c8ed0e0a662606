//! Configuration commands.

use std::io::Write;
use std::path::{Path, PathBuf};

use super::write_line;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

/// Prints the effective configuration as TOML.
pub fn dump<W: Write>(config: &DaemonConfig, source: &Path, out: &mut W) -> DaemonResult<()> {
    let toml_str = toml::to_string_pretty(&config.redacted())
        .map_err(|e| DaemonError::config(format!("failed to serialize config: {}", e)))?;
    write_line(out, format!("# config.toml ({})", source.display()))?;
    write_line(out, toml_str)
}

/// Prints the configuration file path in use.
pub fn path<W: Write>(explicit: Option<&Path>, out: &mut W) -> DaemonResult<()> {
    write_line(out, format!("config: {}", source_path(explicit).display()))
}

/// The `--config` file if given, else the default location.
pub fn source_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(DaemonConfig::default_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_round_trips_and_masks_secret() {
        let mut config = DaemonConfig::default();
        config.google.client_id = Some("id.apps.googleusercontent.com".into());
        config.google.client_secret = Some("hunter2".into());
        let mut out = Vec::new();

        dump(&config, Path::new("/etc/aical.toml"), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("# config.toml (/etc/aical.toml)"));
        assert!(!text.contains("hunter2"));
        let parsed: DaemonConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scheduler.jobs, config.scheduler.jobs);
        assert_eq!(parsed.google.client_secret.as_deref(), Some("<redacted>"));
    }

    #[test]
    fn path_prefers_explicit_file() {
        let mut out = Vec::new();
        path(Some(Path::new("/tmp/aical.toml")), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "config: /tmp/aical.toml\n");
    }
}
