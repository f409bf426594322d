//! Devices that drive or execute replays.

mod registry;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use registry::DeviceRegistry;

/// OpenGL ES version reported by a device driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
}

impl GlVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Vertex array objects are core from ES 3.0.
    pub fn has_vertex_arrays(&self) -> bool {
        self.major >= 3
    }

    /// Extract the first `major.minor` token of a driver version string
    /// such as `"OpenGL ES 3.1 V@415.0"`.
    pub fn parse(driver: &str) -> Option<Self> {
        driver.split_whitespace().find_map(|token| {
            let (major, rest) = token.split_once('.')?;
            let minor: String = rest.chars().take_while(char::is_ascii_digit).collect();
            Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
        })
    }
}

impl Default for GlVersion {
    fn default() -> Self {
        Self::new(2, 0)
    }
}

impl fmt::Display for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for GlVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GlVersion::parse(s).ok_or_else(|| format!("no GL version in {s:?}"))
    }
}

/// Description of a host or target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInstance {
    pub id: String,
    pub name: String,
    pub os: String,
    pub gl_version: GlVersion,
}

impl DeviceInstance {
    pub fn new(id: impl Into<String>, gl_version: GlVersion) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            os: std::env::consts::OS.to_string(),
            gl_version,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
