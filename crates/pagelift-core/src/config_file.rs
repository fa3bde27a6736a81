use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub extraction: Option<ExtractionConfig>,
    pub worker: Option<WorkerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Preparation-phase deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Pages per partial-text flush.
    pub batch_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path to the rendering worker binary.
    pub path: Option<String>,
}

/// Platform config directory path: `<config_dir>/pagelift/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pagelift").join("config.toml"))
}

/// Load config by cascading CWD `.pagelift.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".pagelift.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        extraction: Some(ExtractionConfig {
            timeout_ms: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.timeout_ms)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.timeout_ms)),
            batch_size: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.batch_size)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.batch_size)),
        }),
        worker: Some(WorkerConfig {
            path: overlay
                .worker
                .as_ref()
                .and_then(|w| w.path.clone())
                .or_else(|| base.worker.as_ref().and_then(|w| w.path.clone())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_wins_field_by_field() {
        let base = ConfigFile {
            extraction: Some(ExtractionConfig {
                timeout_ms: Some(10_000),
                batch_size: Some(5),
            }),
            worker: Some(WorkerConfig {
                path: Some("/usr/lib/pagelift-worker".into()),
            }),
        };
        let overlay = ConfigFile {
            extraction: Some(ExtractionConfig {
                timeout_ms: Some(30_000),
                batch_size: None,
            }),
            worker: None,
        };

        let merged = merge(base, overlay);
        let extraction = merged.extraction.unwrap();
        assert_eq!(extraction.timeout_ms, Some(30_000));
        assert_eq!(extraction.batch_size, Some(5));
        assert_eq!(
            merged.worker.unwrap().path.as_deref(),
            Some("/usr/lib/pagelift-worker")
        );
    }

    #[test]
    fn parses_partial_toml() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            [extraction]
            batch_size = 3
            "#,
        )
        .unwrap();
        let extraction = parsed.extraction.unwrap();
        assert_eq!(extraction.batch_size, Some(3));
        assert_eq!(extraction.timeout_ms, None);
        assert!(parsed.worker.is_none());
    }
}
