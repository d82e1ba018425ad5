//! Policy configuration loaded from TOML.

use crate::CsrCheckError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables of the validation policy. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Upper bound on the number of SAN entries.
    pub san_entries_max: usize,
    /// The only accepted key size.
    pub required_key_bits: u32,
    /// Debian weak-key digest file. Missing file: the weak-key check passes.
    pub weak_key_file: Option<PathBuf>,
    /// Blacklist feed URL list. Missing file: the configuration check fails.
    pub blacklist_urls_file: Option<PathBuf>,
    pub whois_timeout_secs: f64,
    pub feed_timeout_secs: f64,
    pub whois_concurrency: usize,
    pub feed_concurrency: usize,
    pub profiles: Vec<ProfileConfig>,
}

/// A product profile layered on top of baseline compliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub allow_wildcard: bool,
    /// Maximum number of distinct registrable domains.
    #[serde(default)]
    pub max_domains: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            san_entries_max: 100,
            required_key_bits: 2048,
            weak_key_file: None,
            blacklist_urls_file: None,
            whois_timeout_secs: 15.0,
            feed_timeout_secs: 60.0,
            whois_concurrency: 4,
            feed_concurrency: 4,
            profiles: vec![
                ProfileConfig {
                    name: "Standard SSL".into(),
                    enabled: true,
                    allow_wildcard: true,
                    max_domains: None,
                },
                ProfileConfig {
                    name: "EV SSL".into(),
                    enabled: false,
                    allow_wildcard: false,
                    max_domains: None,
                },
            ],
        }
    }
}

impl PolicyConfig {
    /// Load and validate a TOML file.
    ///
    /// Relative `weak_key_file` / `blacklist_urls_file` paths resolve against
    /// the directory containing the config file.
    pub fn from_file(path: &Path) -> Result<Self, CsrCheckError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CsrCheckError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.weak_key_file = config.weak_key_file.map(|p| resolve(base, p));
            config.blacklist_urls_file = config.blacklist_urls_file.map(|p| resolve(base, p));
        }
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, CsrCheckError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| CsrCheckError::Config(format!("failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CsrCheckError> {
        if self.san_entries_max == 0 {
            return Err(CsrCheckError::Config("san_entries_max must be at least 1".into()));
        }
        if self.required_key_bits == 0 {
            return Err(CsrCheckError::Config("required_key_bits must be positive".into()));
        }
        if self.whois_concurrency == 0 || self.feed_concurrency == 0 {
            return Err(CsrCheckError::Config("concurrency limits must be at least 1".into()));
        }
        for (name, secs) in [
            ("whois_timeout_secs", self.whois_timeout_secs),
            ("feed_timeout_secs", self.feed_timeout_secs),
        ] {
            if Duration::try_from_secs_f64(secs).map_or(true, |d| d.is_zero()) {
                return Err(CsrCheckError::Config(format!(
                    "{} must be a positive number of seconds",
                    name
                )));
            }
        }
        let mut names = std::collections::HashSet::new();
        for profile in &self.profiles {
            if profile.name.trim().is_empty() {
                return Err(CsrCheckError::Config("profile names must not be empty".into()));
            }
            if !names.insert(profile.name.as_str()) {
                return Err(CsrCheckError::Config(format!(
                    "duplicate profile name {:?}",
                    profile.name
                )));
            }
            if profile.max_domains == Some(0) {
                return Err(CsrCheckError::Config(format!(
                    "profile {:?}: max_domains must be at least 1",
                    profile.name
                )));
            }
        }
        Ok(())
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.whois_timeout_secs).unwrap_or(Duration::from_secs(15))
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.feed_timeout_secs).unwrap_or(Duration::from_secs(60))
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_valid() {
        let config = PolicyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.whois_timeout(), Duration::from_secs(15));
        assert_eq!(config.feed_timeout(), Duration::from_secs(60));
        assert_eq!(config.profiles.len(), 2);
        assert!(!config.profiles[1].enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PolicyConfig::from_toml_str(
            r#"
            san_entries_max = 5
            whois_timeout_secs = 0.5

            [[profiles]]
            name = "Multi-Domain"
            max_domains = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.san_entries_max, 5);
        assert_eq!(config.required_key_bits, 2048);
        assert_eq!(config.whois_timeout(), Duration::from_millis(500));
        assert_eq!(config.profiles.len(), 1);
        assert!(config.profiles[0].enabled);
        assert!(config.profiles[0].allow_wildcard);
        assert_eq!(config.profiles[0].max_domains, Some(3));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for toml in [
            "san_entries_max = 0",
            "whois_concurrency = 0",
            "feed_timeout_secs = -1.0",
            "whois_timeout_secs = 0.0",
            "[[profiles]]\nname = \"\"",
            "[[profiles]]\nname = \"A\"\n[[profiles]]\nname = \"A\"",
            "unknown_field = 1",
        ] {
            let err = PolicyConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, CsrCheckError::Config(_)), "{toml}");
        }
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "weak_key_file = \"keys.txt\"\nblacklist_urls_file = \"/etc/csrcheck/feeds.txt\""
        )
        .unwrap();
        let config = PolicyConfig::from_file(file.path()).unwrap();
        let dir = file.path().parent().unwrap();
        assert_eq!(config.weak_key_file, Some(dir.join("keys.txt")));
        assert_eq!(
            config.blacklist_urls_file,
            Some(PathBuf::from("/etc/csrcheck/feeds.txt"))
        );
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = PolicyConfig::from_file(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, CsrCheckError::Config(_)));
    }
}
