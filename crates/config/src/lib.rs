use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "huddle.toml",
    "config/huddle.toml",
    "crates/config/huddle.toml",
    "../huddle.toml",
    "../config/huddle.toml",
];

/// Paths served by the gateway itself; mounted applications may not shadow them.
const RESERVED_PREFIXES: &[&str] = &["/ws", "/upload", "/files", "/health", "/api", "/api-docs"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub room: RoomConfig,
    pub uploads: UploadConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

/// Limits of the single chat room hosted by the process.
///
/// ```
/// use huddle_config::RoomConfig;
///
/// let room = RoomConfig::default();
/// assert_eq!(room.capacity, 8);
/// assert_eq!(room.history_limit, 1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Initial member capacity; the elected admin may change it at runtime.
    pub capacity: usize,
    /// Messages retained for replay to new joiners.
    pub history_limit: usize,
    pub max_name_length: usize,
    /// Events queued per connection before deliveries to it are dropped.
    pub outbound_buffer: usize,
}

impl RoomConfig {
    /// Events a joiner is sent before anything else: welcome, history, its
    /// own join message and, when elected, the capacity prompt.
    pub const MIN_OUTBOUND_BUFFER: usize = 4;
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            history_limit: 1000,
            max_name_length: 32,
            outbound_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "uploads".to_string(),
            max_bytes: 100 * 1024 * 1024,
            max_files: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "TlsConfig::default_hostname")]
    pub hostname: String,
    #[serde(default = "TlsConfig::default_cert_path")]
    pub cert_path: String,
    #[serde(default = "TlsConfig::default_key_path")]
    pub key_path: String,
}

impl TlsConfig {
    fn default_hostname() -> String {
        "localhost".to_string()
    }

    fn default_cert_path() -> String {
        "certs/cert.pem".to_string()
    }

    fn default_key_path() -> String {
        "certs/key.pem".to_string()
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hostname: Self::default_hostname(),
            cert_path: Self::default_cert_path(),
            key_path: Self::default_key_path(),
        }
    }
}

/// Startup supervision: wait for the server to report healthy, then obtain a
/// public URL either from `public_url` or from an external tunnel binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "BootstrapConfig::default_health_timeout")]
    pub health_timeout_seconds: u64,
    #[serde(default = "BootstrapConfig::default_tunnel_timeout")]
    pub tunnel_timeout_seconds: u64,
    #[serde(default = "BootstrapConfig::default_poll_interval")]
    pub poll_interval_millis: u64,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub tunnel: Option<TunnelConfig>,
}

impl BootstrapConfig {
    const fn default_health_timeout() -> u64 {
        20
    }

    const fn default_tunnel_timeout() -> u64 {
        15
    }

    const fn default_poll_interval() -> u64 {
        500
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            health_timeout_seconds: Self::default_health_timeout(),
            tunnel_timeout_seconds: Self::default_tunnel_timeout(),
            poll_interval_millis: Self::default_poll_interval(),
            public_url: None,
            tunnel: None,
        }
    }
}

/// External tunnel binary. Occurrences of `{port}` in `args` are replaced with
/// the local port being exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A secondary static application served under `prefix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    pub prefix: String,
    pub dir: String,
}

impl AppConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.room.capacity == 0 {
            bail!("room.capacity must be at least 1");
        }
        if self.room.history_limit == 0 {
            bail!("room.history_limit must be at least 1");
        }
        if self.room.max_name_length == 0 {
            bail!("room.max_name_length must be at least 1");
        }
        if self.room.outbound_buffer < RoomConfig::MIN_OUTBOUND_BUFFER {
            bail!(
                "room.outbound_buffer must be at least {}",
                RoomConfig::MIN_OUTBOUND_BUFFER
            );
        }
        if self.uploads.max_bytes == 0 {
            bail!("uploads.max_bytes must be at least 1");
        }
        if self.uploads.max_files == 0 {
            bail!("uploads.max_files must be at least 1");
        }

        for mount in &self.mounts {
            let prefix = mount.prefix.trim_end_matches('/');
            if !prefix.starts_with('/') || prefix.is_empty() {
                bail!("mount prefix `{}` must be an absolute path other than `/`", mount.prefix);
            }
            let shadows = RESERVED_PREFIXES.iter().any(|reserved| {
                prefix == *reserved || prefix.starts_with(&format!("{reserved}/"))
            });
            if shadows {
                bail!("mount prefix `{}` collides with a built-in route", mount.prefix);
            }
        }

        Ok(())
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use huddle_config::load;
///
/// std::env::remove_var("HUDDLE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("room.capacity", to_i64(defaults.room.capacity))?
        .set_default("room.history_limit", to_i64(defaults.room.history_limit))?
        .set_default("room.max_name_length", to_i64(defaults.room.max_name_length))?
        .set_default("room.outbound_buffer", to_i64(defaults.room.outbound_buffer))?
        .set_default("uploads.dir", defaults.uploads.dir.clone())?
        .set_default(
            "uploads.max_bytes",
            i64::try_from(defaults.uploads.max_bytes).unwrap_or(i64::MAX),
        )?
        .set_default("uploads.max_files", to_i64(defaults.uploads.max_files))?;

    let environment_overrides = config::Environment::with_prefix("HUDDLE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("HUDDLE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via HUDDLE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    config.validate().context("invalid configuration")?;

    debug!(?config, "loaded huddle configuration");
    Ok(config)
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
