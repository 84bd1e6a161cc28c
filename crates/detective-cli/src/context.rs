use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "object-detective";

/// Where the terminal host keeps its files
///
/// Defaults live under the platform config and data dirs; command line
/// flags override each of them.
pub struct CliContext {
    config_path: PathBuf,
    log_dir: PathBuf,
}

impl CliContext {
    pub fn new(config_override: Option<PathBuf>, log_override: Option<PathBuf>) -> Self {
        Self {
            config_path: config_override.unwrap_or_else(default_config_path),
            log_dir: log_override.unwrap_or_else(default_log_dir),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR_NAME).join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("object-detective-logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win() {
        let ctx = CliContext::new(Some("/tmp/od.json".into()), Some("/tmp/od-logs".into()));
        assert_eq!(ctx.config_path(), Path::new("/tmp/od.json"));
        assert_eq!(ctx.log_dir(), Path::new("/tmp/od-logs"));
    }

    #[test]
    fn defaults_end_in_app_dir() {
        let ctx = CliContext::new(None, None);
        assert!(ctx.config_path().ends_with("config.json"));
        assert!(ctx.config_path().to_string_lossy().contains(APP_DIR_NAME)
            || ctx.config_path() == Path::new("./config.json"));
        assert!(ctx.log_dir().to_string_lossy().contains("object-detective"));
    }
}
