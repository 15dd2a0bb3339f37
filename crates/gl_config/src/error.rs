// crates/gl_config/src/error.rs

//! 配置层错误类型

use gl_foundation::GlError;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 无效值
    #[error("无效值 '{key}': {value} - {reason}")]
    InvalidValue {
        /// 配置键
        key: String,
        /// 配置值
        value: String,
        /// 原因
        reason: String,
    },

    /// 配置项之间相互矛盾
    #[error("配置不一致: {0}")]
    Inconsistent(String),
}

impl ConfigError {
    /// 构造无效值错误
    pub fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for GlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => GlError::io_with_source("读取配置失败", e),
            ConfigError::Parse(msg) => GlError::config(msg),
            ConfigError::InvalidValue { key, value, reason } => {
                GlError::invalid_config(key, value, reason)
            }
            ConfigError::Inconsistent(msg) => GlError::config(msg),
        }
    }
}
