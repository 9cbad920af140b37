use crate::error::{FipsError, FipsResult};
use crate::native::{NSS_FIPS_SYMBOL, NSS_LIBRARY};
use crate::policy::CRYPTO_POLICIES_CONFIG;
use crate::status_file::FIPS_ENABLED_PATH;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default location of the probe configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sysfips.toml";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NativeCfg {
    #[serde(default = "default_library")]
    pub library: String,

    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Look for the symbol in the running process before opening `library`.
    #[serde(default = "default_true")]
    pub probe_linked: bool,
}

fn default_true() -> bool {
    true
}

fn default_library() -> String {
    NSS_LIBRARY.to_string()
}

fn default_symbol() -> String {
    NSS_FIPS_SYMBOL.to_string()
}

impl Default for NativeCfg {
    fn default() -> Self {
        Self {
            library: default_library(),
            symbol: default_symbol(),
            probe_linked: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusCfg {
    #[serde(default = "default_status_path")]
    pub path: String,
}

fn default_status_path() -> String {
    FIPS_ENABLED_PATH.to_string()
}

impl Default for StatusCfg {
    fn default() -> Self {
        Self {
            path: default_status_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PolicyCfg {
    /// When false, crypto-policy alignment is never reported as active.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_policy_path")]
    pub config_path: String,
}

fn default_policy_path() -> String {
    CRYPTO_POLICIES_CONFIG.to_string()
}

impl PolicyCfg {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.config_path)
    }
}

impl Default for PolicyCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            config_path: default_policy_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticsCfg {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProbeConfig {
    #[serde(default)]
    pub native: NativeCfg,

    #[serde(default)]
    pub status: StatusCfg,

    #[serde(default)]
    pub policy: PolicyCfg,

    #[serde(default)]
    pub diagnostics: DiagnosticsCfg,

    #[serde(skip)]
    pub path: PathBuf,
}

impl ProbeConfig {
    /// Load and validate the configuration at `path`. Files ending in
    /// `.toml` are parsed as TOML, everything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> FipsResult<Self> {
        let cfg = Self::parse(path)?;
        if let Some(first) = cfg.validate().into_iter().next() {
            return Err(FipsError::InvalidConfig(first));
        }
        Ok(cfg)
    }

    /// Parse without validating.
    pub fn parse<P: AsRef<Path>>(path: P) -> FipsResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut cfg = if matches!(path.extension().and_then(|ext| ext.to_str()), Some(ext) if ext.eq_ignore_ascii_case("toml"))
        {
            toml::from_str::<Self>(&contents)?
        } else {
            serde_yaml::from_str::<Self>(&contents)?
        };

        cfg.path = path.to_path_buf();
        Ok(cfg)
    }

    /// Like [`ProbeConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> FipsResult<Self> {
        match Self::load(path.as_ref()) {
            Err(FipsError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    "no configuration at {}, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Collect every problem with the configuration instead of stopping at
    /// the first one.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.native.library.trim().is_empty() {
            issues.push("native.library must not be empty".to_string());
        }
        if self.native.symbol.trim().is_empty() {
            issues.push("native.symbol must not be empty".to_string());
        }
        if !Path::new(&self.status.path).is_absolute() {
            issues.push(format!(
                "status.path must be absolute (got `{}`)",
                self.status.path
            ));
        }
        if self.policy.enabled && !Path::new(&self.policy.config_path).is_absolute() {
            issues.push(format!(
                "policy.config_path must be absolute (got `{}`)",
                self.policy.config_path
            ));
        }
        issues
    }

    pub fn status_path(&self) -> PathBuf {
        PathBuf::from(&self.status.path)
    }
}
