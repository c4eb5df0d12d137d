//! sealctl configuration.
//!
//! Read from `--config`, else `$XDG_CONFIG_HOME/sealchain/config.toml` when
//! present, else defaults. Command-line flags and `SEAL_*` environment
//! variables override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use seal_attest::DeviceProfile;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::{Cli, ElementKind};
use crate::error::CliError;

/// Default ledger node.
pub const DEFAULT_LEDGER_URL: &str = "https://ipdb-eu2.riddleandcode.com";

/// Default vendor library path.
pub const DEFAULT_LIBRARY_PATH: &str = "libseadyn.so";

/// Default record directory.
pub const DEFAULT_DATABASE_DIR: &str = "database";

/// Default machine description fields for `identity create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MachineConfig {
    /// Machine type.
    pub kind: String,
    /// Owning organisation.
    pub owner: String,
    /// Street address.
    pub address_line: String,
    /// Postal code.
    pub zip_code: String,
    /// City.
    pub city: String,
    /// Site within the premises.
    pub location: Option<String>,
}

impl MachineConfig {
    /// Device profile for a machine called `name`.
    #[must_use]
    pub fn profile(&self, name: &str) -> DeviceProfile {
        DeviceProfile {
            name: name.to_string(),
            kind: self.kind.clone(),
            owner: self.owner.clone(),
            address_line: self.address_line.clone(),
            zip_code: self.zip_code.clone(),
            city: self.city.clone(),
            location: self.location.clone(),
        }
    }
}

/// Main sealctl configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SealConfig {
    /// Ledger node URL.
    pub ledger_url: String,
    /// Directory of local attestation records.
    pub database_dir: PathBuf,
    /// Secure element backend.
    pub element: ElementKind,
    /// Native secure element library.
    pub library_path: PathBuf,
    /// File persisting the simulated element between runs.
    pub simulator_state: Option<PathBuf>,
    /// Timeout of every ledger request in seconds.
    pub request_timeout_secs: u64,
    /// Maximum asset matches fetched per search.
    pub search_limit: usize,
    /// Verifications run at once by `check`.
    pub check_concurrency: usize,
    /// Machine description defaults.
    pub machine: MachineConfig,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            ledger_url: DEFAULT_LEDGER_URL.to_string(),
            database_dir: PathBuf::from(DEFAULT_DATABASE_DIR),
            element: ElementKind::default(),
            library_path: PathBuf::from(DEFAULT_LIBRARY_PATH),
            simulator_state: None,
            request_timeout_secs: 30,
            search_limit: 50,
            check_concurrency: 4,
            machine: MachineConfig::default(),
        }
    }
}

impl SealConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self =
            toml::from_str(content).map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// The per-user configuration file, if the platform has a config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sealchain").join("config.toml"))
    }

    /// Resolve the configuration for a command line.
    ///
    /// An explicit `--config` file must exist; the per-user file is only
    /// read when present.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or the result is invalid.
    pub fn resolve(cli: &Cli) -> Result<Self, CliError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line and environment overrides.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(url) = &cli.ledger {
            self.ledger_url.clone_from(url);
        }
        if let Some(dir) = &cli.database {
            self.database_dir.clone_from(dir);
        }
        if let Some(element) = cli.element {
            self.element = element;
        }
        if let Some(path) = &cli.library {
            self.library_path.clone_from(path);
        }
    }

    /// Ledger request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.ledger_url.is_empty() {
            return Err(CliError::Config("ledger_url cannot be empty".to_string()));
        }

        let url = Url::parse(&self.ledger_url)
            .map_err(|e| CliError::Config(format!("invalid ledger_url '{}': {e}", self.ledger_url)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CliError::Config(
                "ledger_url must start with http:// or https://".to_string(),
            ));
        }

        if self.database_dir.as_os_str().is_empty() {
            return Err(CliError::Config("database_dir cannot be empty".to_string()));
        }

        if self.request_timeout_secs == 0 {
            return Err(CliError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.search_limit == 0 {
            return Err(CliError::Config(
                "search_limit must be greater than 0".to_string(),
            ));
        }

        if self.check_concurrency == 0 {
            return Err(CliError::Config(
                "check_concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("failed to write temp file");
        file
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = SealConfig::from_toml("").expect("should parse empty config");
        assert_eq!(config, SealConfig::default());
        assert_eq!(config.ledger_url, DEFAULT_LEDGER_URL);
        assert_eq!(config.element, ElementKind::Simulated);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn full_config_parses() {
        let toml = r#"
            ledger_url = "http://localhost:9984"
            database_dir = "/var/lib/sealchain/records"
            element = "native"
            library_path = "/opt/se/libseadyn.so"
            request_timeout_secs = 5
            search_limit = 10
            check_concurrency = 8

            [machine]
            kind = "Lucky Puncher"
            owner = "Wunderbar GmbH"
            city = "Linz"
            location = "Halle 8"
        "#;

        let config = SealConfig::from_toml(toml).expect("should parse full config");
        assert_eq!(config.element, ElementKind::Native);
        assert_eq!(config.library_path, PathBuf::from("/opt/se/libseadyn.so"));
        assert_eq!(config.check_concurrency, 8);

        let profile = config.machine.profile("press-4");
        assert_eq!(profile.name, "press-4");
        assert_eq!(profile.owner, "Wunderbar GmbH");
        assert_eq!(profile.location.as_deref(), Some("Halle 8"));
    }

    #[test]
    fn config_from_file() {
        let file = create_temp_config("search_limit = 7\n");
        let config = SealConfig::from_file(file.path()).expect("should load");
        assert_eq!(config.search_limit, 7);
    }

    #[test]
    fn missing_file_is_config_error() {
        let result = SealConfig::from_file("/nonexistent/sealchain.toml");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test_case("ledger_url = \"\"" ; "empty url")]
    #[test_case("ledger_url = \"ftp://ledger\"" ; "wrong scheme")]
    #[test_case("ledger_url = \"not a url\"" ; "unparsable url")]
    #[test_case("request_timeout_secs = 0" ; "zero timeout")]
    #[test_case("check_concurrency = 0" ; "zero concurrency")]
    #[test_case("search_limit = 0" ; "zero search limit")]
    #[test_case("element = \"quantum\"" ; "unknown element")]
    fn invalid_config_is_rejected(toml: &str) {
        assert!(matches!(SealConfig::from_toml(toml), Err(CliError::Config(_))));
    }

    #[test]
    fn flags_override_file_values() {
        let file = create_temp_config("ledger_url = \"http://file:9984\"\ndatabase_dir = \"file-db\"\n");
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "sealctl",
            "--config",
            &path,
            "--ledger",
            "http://flag:9984",
            "--element",
            "native",
            "check",
        ]);

        let config = SealConfig::resolve(&cli).expect("resolve");
        assert_eq!(config.ledger_url, "http://flag:9984");
        assert_eq!(config.database_dir, PathBuf::from("file-db"));
        assert_eq!(config.element, ElementKind::Native);
    }
}
