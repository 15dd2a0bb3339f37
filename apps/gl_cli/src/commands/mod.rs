// apps/gl_cli/src/commands/mod.rs

//! 子命令

pub mod invert;
pub mod run;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use gl_config::ModelConfig;

/// 读取配置文件，未给出时取缺省配置
pub fn load_config(path: Option<&Path>) -> Result<ModelConfig> {
    match path {
        Some(path) => ModelConfig::from_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display())),
        None => {
            tracing::info!("未指定配置文件，使用缺省配置");
            Ok(ModelConfig::default())
        }
    }
}
