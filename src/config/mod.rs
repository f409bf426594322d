mod paths;
mod settings;

pub use paths::default_data_dir;
pub use settings::{
    Config, DeviceConfig, ManagerConfig, PipelineConfig, RpcConfig, TomlConfig, EXAMPLE_CONFIG,
};
