// crates/gl_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `GlError` 枚举和 `GlResult` 类型别名，用于整个项目的错误处理。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义核心错误，反演相关错误在 gl_inversion 中定义
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **前置检查**: 所有致命错误在迭代循环开始前抛出
//!
//! # 示例
//!
//! ```
//! use gl_foundation::error::{GlError, GlResult};
//!
//! fn read_config() -> GlResult<()> {
//!     Err(GlError::config("配置文件格式错误"))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type GlResult<T> = Result<T, GlError>;

/// GlacioSim 错误类型
#[derive(Error, Debug)]
pub enum GlError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================

    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 文件解析错误
    #[error("文件解析错误: {file} 第{line}行: {message}")]
    ParseError {
        /// 文件路径
        file: PathBuf,
        /// 行号
        line: usize,
        /// 错误信息
        message: String,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    // ========================================================================
    // 数据与网格错误
    // ========================================================================

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 数组形状不匹配
    #[error("数组形状不匹配: {name} 期望{expected:?}, 实际{actual:?}")]
    SizeMismatch {
        /// 数据名称
        name: String,
        /// 期望形状 (ny, nx)
        expected: (usize, usize),
        /// 实际形状
        actual: (usize, usize),
    },

    /// 两个方向网格间距不一致
    #[error("网格间距不一致: dx={dx}, dy={dy}")]
    GridSpacingMismatch {
        /// x 方向间距
        dx: f64,
        /// y 方向间距
        dy: f64,
    },

    /// 无效网格
    #[error("无效的网格: {message}")]
    InvalidGrid {
        /// 具体错误信息
        message: String,
    },

    /// 缺少必需字段
    #[error("缺少必需字段: {field}")]
    MissingField {
        /// 字段名
        field: String,
    },

    // ========================================================================
    // 配置与模型错误
    // ========================================================================

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 速度模型签名不受支持
    #[error("不支持的速度模型签名: 输入={inputs:?}, 输出={outputs:?}")]
    UnsupportedModel {
        /// 模型声明的输入字段
        inputs: Vec<String>,
        /// 模型声明的输出字段
        outputs: Vec<String>,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl GlError {
    /// 从IO错误创建
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 从IO错误创建（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 文件不存在
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 解析错误
    pub fn parse(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 数组形状不匹配
    pub fn size_mismatch(
        name: impl Into<String>,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        Self::SizeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// 无效网格
    pub fn invalid_grid(message: impl Into<String>) -> Self {
        Self::InvalidGrid {
            message: message.into(),
        }
    }

    /// 缺少字段
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 不支持的模型签名
    pub fn unsupported_model<I, O>(inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
        O: IntoIterator,
        O::Item: ToString,
    {
        Self::UnsupportedModel {
            inputs: inputs.into_iter().map(|s| s.to_string()).collect(),
            outputs: outputs.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl GlError {
    /// 检查二维数组形状是否匹配
    #[inline]
    pub fn check_shape(
        name: impl Into<String>,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> GlResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }
}

/// 条件不满足时提前返回错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for GlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================
