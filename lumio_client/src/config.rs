use crate::address::{self, DEFAULT_SS58_PREFIX, MAX_SS58_PREFIX};
use anyhow::{anyhow, Context, Result};
use lumio_io::ActorId;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_GATEWAY: &str = "https://gateway.pinata.cloud/ipfs/";
const DEFAULT_PIN_ENDPOINT: &str = "https://api.pinata.cloud/pinning/pinFileToIPFS";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct LumioConfig {
    /// Contract instance the client talks to; scopes the local ledger.
    pub program_id: Option<ActorId>,
    pub ss58_prefix: u16,
    pub paths: LumioPaths,
    pub timing: TimingConfig,
    pub media: MediaConfig,
}

impl LumioConfig {
    pub fn from_env() -> Result<Self> {
        let paths = match env::var("LUMIO_HOME") {
            Ok(raw) if !raw.trim().is_empty() => LumioPaths::from_base_dir(raw.trim())?,
            _ => LumioPaths::discover()?,
        };
        let program_id = match env::var("LUMIO_PROGRAM_ID") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                address::parse_account(&raw)
                    .with_context(|| format!("LUMIO_PROGRAM_ID is not a valid address: {raw}"))?,
            ),
            _ => None,
        };
        let ss58_prefix = match env_string("LUMIO_SS58_PREFIX") {
            Some(raw) => parse_ss58_prefix(&raw)?,
            None => DEFAULT_SS58_PREFIX,
        };
        Ok(Self {
            program_id,
            ss58_prefix,
            paths,
            timing: TimingConfig::from_env(),
            media: MediaConfig::from_env(),
        })
    }

    pub fn new(paths: LumioPaths, program_id: Option<ActorId>) -> Self {
        Self {
            program_id,
            ss58_prefix: DEFAULT_SS58_PREFIX,
            paths,
            timing: TimingConfig::default(),
            media: MediaConfig::default(),
        }
    }

    pub fn with_media(mut self, media: MediaConfig) -> Self {
        self.media = media;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Wait before re-querying posts after a transaction.
    pub reload_delay: Duration,
    /// Wait before re-querying the profile after an update.
    pub profile_reload_delay: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reload_delay: Duration::from_millis(2000),
            profile_reload_delay: Duration::from_millis(3000),
        }
    }
}

impl TimingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let reload_delay = env_millis("LUMIO_RELOAD_DELAY_MS").unwrap_or(defaults.reload_delay);
        let profile_reload_delay = env_millis("LUMIO_PROFILE_RELOAD_DELAY_MS")
            .unwrap_or(defaults.profile_reload_delay);
        Self {
            reload_delay,
            profile_reload_delay,
        }
    }

    pub fn immediate() -> Self {
        Self {
            reload_delay: Duration::ZERO,
            profile_reload_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub pin_endpoint: String,
    pub gateway: String,
    pub jwt: Option<String>,
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub max_upload_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            pin_endpoint: DEFAULT_PIN_ENDPOINT.to_string(),
            gateway: DEFAULT_GATEWAY.to_string(),
            jwt: None,
            api_key: None,
            secret_key: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut gateway = env_string("LUMIO_PINATA_GATEWAY").unwrap_or(defaults.gateway);
        if !gateway.ends_with('/') {
            gateway.push('/');
        }
        Self {
            pin_endpoint: env_string("LUMIO_PINATA_ENDPOINT").unwrap_or(defaults.pin_endpoint),
            gateway,
            jwt: env_string("LUMIO_PINATA_JWT"),
            api_key: env_string("LUMIO_PINATA_API_KEY"),
            secret_key: env_string("LUMIO_PINATA_SECRET_KEY"),
            max_upload_bytes: env::var("LUMIO_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(defaults.max_upload_bytes),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LumioPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl LumioPaths {
    pub fn discover() -> Result<Self> {
        let exe_path = std::env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("lumio.db");
        Ok(Self {
            base,
            data_dir,
            db_path,
        })
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse_ss58_prefix(raw: &str) -> Result<u16> {
    let prefix: u16 = raw
        .parse()
        .with_context(|| format!("LUMIO_SS58_PREFIX is not a number: {raw}"))?;
    if prefix > MAX_SS58_PREFIX {
        return Err(anyhow!(
            "LUMIO_SS58_PREFIX {prefix} is out of range (max {MAX_SS58_PREFIX})"
        ));
    }
    Ok(prefix)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
}
