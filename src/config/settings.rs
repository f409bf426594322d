use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::atom::DEFAULT_MAX_PROBES;
use crate::capture::DEFAULT_MAX_FRAME_SIZE;
use crate::device::{DeviceInstance, GlVersion};

use super::paths::default_data_dir;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of everything gfxreplay stores on disk
    pub data_dir: PathBuf,
    pub rpc: RpcConfig,
    pub pipeline: PipelineConfig,
    pub manager: ManagerConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
}

impl RpcConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.address())
    }
}

/// Limits applied to every pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_allocation_probes: u32,
    pub max_frame_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_allocation_probes: DEFAULT_MAX_PROBES,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Actions buffered between a search and its HTTP response stream
    pub search_stream_depth: usize,
    /// Tasks buffered between a registration and its HTTP response stream
    pub register_stream_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Defaults to the host name
    pub name: Option<String>,
    pub gl_version: GlVersion,
}

impl DeviceConfig {
    /// The device this process advertises.
    pub fn instance(&self) -> DeviceInstance {
        let name = self.name.clone().unwrap_or_else(local_device_name);
        DeviceInstance::new(name, self.gl_version)
    }
}

fn local_device_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rpc: RpcConfig {
                host: "127.0.0.1".to_string(),
                port: 8574,
            },
            pipeline: PipelineConfig::default(),
            manager: ManagerConfig {
                search_stream_depth: 64,
                register_stream_depth: 16,
            },
            device: DeviceConfig {
                name: None,
                gl_version: GlVersion::new(3, 0),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlRpcConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPipelineConfig {
    pub max_allocation_probes: Option<u32>,
    pub max_frame_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlManagerConfig {
    pub search_stream_depth: Option<usize>,
    pub register_stream_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlDeviceConfig {
    pub name: Option<String>,
    pub gl_version: Option<String>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub rpc: Option<TomlRpcConfig>,
    pub pipeline: Option<TomlPipelineConfig>,
    pub manager: Option<TomlManagerConfig>,
    pub device: Option<TomlDeviceConfig>,
}

impl Config {
    /// Load `<data_dir>/config.toml` on top of the defaults. A missing file
    /// is created from the bundled example; an unreadable one is logged and
    /// ignored.
    pub fn load(data_dir: Option<PathBuf>) -> Self {
        let mut config = Config {
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            ..Config::default()
        };

        let config_file = config.config_path();
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        match fs::read_to_string(&config_file) {
            Ok(contents) => match toml::from_str::<TomlConfig>(&contents) {
                Ok(toml_config) => config.merge(toml_config),
                Err(e) => {
                    tracing::warn!(path = %config_file.display(), error = %e, "ignoring invalid config");
                }
            },
            Err(e) => {
                tracing::debug!(path = %config_file.display(), error = %e, "no config file");
            }
        }

        config
    }

    /// Parse `contents` on top of the defaults.
    pub fn from_toml_str(data_dir: PathBuf, contents: &str) -> Result<Self, toml::de::Error> {
        let mut config = Config {
            data_dir,
            ..Config::default()
        };
        config.merge(toml::from_str(contents)?);
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) {
        if let Some(rpc) = toml_config.rpc {
            if let Some(host) = rpc.host {
                self.rpc.host = host;
            }
            if let Some(port) = rpc.port {
                self.rpc.port = port;
            }
        }

        if let Some(pipeline) = toml_config.pipeline {
            if let Some(probes) = pipeline.max_allocation_probes {
                self.pipeline.max_allocation_probes = probes.max(1);
            }
            if let Some(size) = pipeline.max_frame_size {
                self.pipeline.max_frame_size = size;
            }
        }

        if let Some(manager) = toml_config.manager {
            if let Some(depth) = manager.search_stream_depth {
                self.manager.search_stream_depth = depth.max(1);
            }
            if let Some(depth) = manager.register_stream_depth {
                self.manager.register_stream_depth = depth.max(1);
            }
        }

        if let Some(device) = toml_config.device {
            if device.name.is_some() {
                self.device.name = device.name;
            }
            if let Some(version) = device.gl_version {
                match GlVersion::parse(&version) {
                    Some(parsed) => self.device.gl_version = parsed,
                    None => tracing::warn!(%version, "ignoring unparsable device.gl_version"),
                }
            }
        }
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create config directory");
                return;
            }
        }
        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "failed to write default config");
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.rpc.port = port;
        self
    }
}
