// crates/gl_inversion/src/error.rs

//! 反演错误类型
//!
//! 全部为进入迭代循环之前检出的前置条件违例，不做重试。

use std::path::PathBuf;

use gl_config::ConfigError;
use gl_foundation::GlError;

/// 反演结果类型
pub type InversionResult<T> = Result<T, InversionError>;

/// 反演错误
#[derive(Debug, thiserror::Error)]
pub enum InversionError {
    /// 速度模型签名不受支持
    #[error("速度模型不适用于反演: 输入 {inputs:?}")]
    UnsupportedSignature {
        /// 模型输入
        inputs: Vec<String>,
    },

    /// 速度模型缺少必需输出
    #[error("速度模型缺少输出: {missing:?}")]
    MissingOutputs {
        /// 缺失的输出
        missing: Vec<String>,
    },

    /// 请求了剖面代价但剖面文件不存在
    #[error("请求了冰厚剖面代价，但文件不存在: {path}")]
    ProfileFileNotFound {
        /// 文件路径
        path: PathBuf,
    },

    /// 剖面文件格式错误
    #[error("剖面文件 {path} 第 {line} 行: {message}")]
    ProfileFormat {
        /// 文件路径
        path: PathBuf,
        /// 行号
        line: usize,
        /// 错误信息
        message: String,
    },

    /// 请求了栅格冰厚代价但观测全部缺测
    #[error("请求了冰厚代价，但冰厚观测全部缺测")]
    ThicknessObservationsMissing,

    /// 代价项所需观测缺失
    #[error("代价项 {term} 需要观测字段 {field}")]
    MissingObservation {
        /// 代价项
        term: String,
        /// 缺失字段
        field: String,
    },

    /// 控制变量与代价项不一致
    #[error("反演设置不一致: {0}")]
    Inconsistent(String),

    /// 反演已结束，不能继续迭代
    #[error("反演处于 {0} 阶段，不能继续迭代")]
    InvalidPhase(&'static str),

    /// 配置错误
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 底层错误
    #[error(transparent)]
    Core(#[from] GlError),
}

impl InversionError {
    /// 缺失观测
    pub fn missing_observation(term: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingObservation {
            term: term.into(),
            field: field.into(),
        }
    }
}

impl From<std::io::Error> for InversionError {
    fn from(err: std::io::Error) -> Self {
        Self::Core(GlError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = InversionError::ProfileFileNotFound {
            path: PathBuf::from("profiles.dat"),
        };
        assert!(err.to_string().contains("profiles.dat"));
    }

    #[test]
    fn test_from_config_error() {
        let err: InversionError = ConfigError::Inconsistent("usurf".into()).into();
        assert!(matches!(err, InversionError::Config(_)));
    }
}
