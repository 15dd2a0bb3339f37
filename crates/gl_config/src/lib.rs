// crates/gl_config/src/lib.rs

//! GlacioSim Config Layer (Layer 1)
//!
//! 配置层，定义正演模拟与反演的全部参数，JSON 序列化。
//!
//! # 模块概览
//!
//! - [`model_config`]: ModelConfig 及时间、冰流、物质平衡、侵蚀、输出各节
//! - [`inversion_config`]: 反演控制变量、代价项与优化参数
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 4: gl_cli        ─> 加载 ModelConfig
//! Layer 3: gl_inversion  ─> 使用 InversionConfig
//! Layer 2: gl_physics    ─> 使用 TimeConfig, SmbConfig, ErosionConfig
//! Layer 1: gl_config     ─> 本层
//! Layer 0: gl_foundation
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod inversion_config;
pub mod model_config;

/// 层级标识
pub const LAYER: u8 = 1;

// 重导出核心类型
pub use error::ConfigError;
pub use inversion_config::{ControlField, CostTerm, InversionConfig};
pub use model_config::{
    ErosionConfig, IceflowConfig, InitConfig, ModelConfig, OutputConfig, SignalSmbConfig,
    SimpleSmbRow, SmbConfig, SmbKind, TimeConfig,
};
