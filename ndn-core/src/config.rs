use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::certificate::Certificate;
use crate::command::{self, Command, ControlParameters};
use crate::pem;
use crate::pit::Pit;
use crate::signature::{Key, SignatureError};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Key material error: {0}")]
    Signature(#[from] SignatureError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub signing: SigningConfig,
    pub command: CommandConfig,
    pub pit: PitConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// PEM file holding the process signing key
    pub key_file: Option<PathBuf>,
    pub certificate_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub localhost: String,
    pub forwarder: String,
    pub interest_lifetime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitConfig {
    pub default_interest_lifetime_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            localhost: "localhost".to_string(),
            forwarder: "nfd".to_string(),
            interest_lifetime_ms: 4000,
        }
    }
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            default_interest_lifetime_ms: 4000,
        }
    }
}

impl Config {
    /// Read a TOML config; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Key named by `signing.key_file`, if any
    pub fn load_signing_key(&self) -> Result<Option<Key>, ConfigError> {
        let Some(path) = &self.signing.key_file else {
            return Ok(None);
        };
        let mut file = fs::File::open(path)?;
        Ok(Some(pem::read_key(&mut file)?))
    }

    /// Load the configured key and make it the process command signing key.
    /// Returns false when no key file is configured.
    pub fn install_signing_key(&self) -> Result<bool, ConfigError> {
        match self.load_signing_key()? {
            Some(key) => {
                info!(
                    "Loaded signing key {} from {}",
                    key.locator(),
                    self.signing.key_file.as_deref().unwrap_or(Path::new("")).display()
                );
                command::set_signing_key(Arc::new(key));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn load_certificate(&self) -> Result<Option<Certificate>, ConfigError> {
        match &self.signing.certificate_file {
            Some(path) => Ok(Some(Certificate::load(path)?)),
            None => Ok(None),
        }
    }

    pub fn command_lifetime(&self) -> Duration {
        Duration::from_millis(self.command.interest_lifetime_ms)
    }

    /// A command addressed to the configured forwarder prefix
    pub fn command(
        &self,
        module: impl Into<String>,
        command: impl Into<String>,
        parameters: ControlParameters,
    ) -> Command {
        Command::new(module, command, parameters)
            .with_prefix(self.command.localhost.as_str(), self.command.forwarder.as_str())
    }

    /// An empty PIT using the configured default Interest lifetime
    pub fn pit<C: Eq + std::hash::Hash + Clone>(&self) -> Pit<C> {
        Pit::with_default_lifetime(Duration::from_millis(self.pit.default_interest_lifetime_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.command_lifetime(), Duration::from_secs(4));
        assert!(config.load_signing_key().unwrap().is_none());
        assert!(config.load_certificate().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndn.toml");

        let mut config = Config::default();
        config.command.forwarder = "router".to_string();
        config.pit.default_interest_lifetime_ms = 250;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[command]\nlocalhost = \"localhop\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.command.localhost, "localhop");
        assert_eq!(config.command.forwarder, "nfd");
        assert_eq!(config.pit, PitConfig::default());

        let command_name = config
            .command("rib", "register", ControlParameters::new())
            .encode_with(&Key::generate_hmac(name("/keys/k")))
            .unwrap();
        assert_eq!(command_name.get(0).unwrap().as_bytes(), b"localhop");
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[pit\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_key_and_certificate_files() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("site.pem");
        let cert_path = dir.path().join("site.cert");

        let key = Key::generate_ecdsa(name("/keys/site")).unwrap();
        pem::write_key(&mut fs::File::create(&key_path).unwrap(), &key).unwrap();
        Certificate::new(&key, &key).unwrap().save(&cert_path).unwrap();

        let mut config = Config::default();
        config.signing.key_file = Some(key_path);
        config.signing.certificate_file = Some(cert_path);

        let loaded = config.load_signing_key().unwrap().unwrap();
        assert_eq!(loaded.locator(), key.locator());
        let cert = config.load_certificate().unwrap().unwrap();
        cert.verify_with(&loaded).unwrap();
    }

    #[test]
    fn test_missing_key_file() {
        let mut config = Config::default();
        config.signing.key_file = Some(PathBuf::from("/nonexistent/key.pem"));
        assert!(matches!(config.load_signing_key(), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_configured_pit_lifetime() {
        let config = Config {
            pit: PitConfig {
                default_interest_lifetime_ms: 10,
            },
            ..Config::default()
        };
        let pit = config.pit();
        let now = std::time::Instant::now();
        pit.insert_at(&crate::packets::Interest::new(name("/p")), 1u8, now);
        assert_eq!(pit.evict_expired(now + Duration::from_millis(20)), 1);
    }
}
