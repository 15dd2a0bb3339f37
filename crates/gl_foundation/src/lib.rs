// crates/gl_foundation/src/lib.rs

//! GlacioSim Foundation Layer
//!
//! 基础层，提供整个项目共享的网格、字段与错误抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型
//! - [`grid`]: 规则二维网格
//! - [`field`]: 强类型字段名与物理尺度表
//!
//! # 示例
//!
//! ```
//! use gl_foundation::{Grid, FieldName, FieldBounds};
//!
//! let grid = Grid::regular(20, 10, 100.0, 0.0, 0.0).unwrap();
//! assert_eq!(grid.shape(), (10, 20));
//!
//! let bounds = FieldBounds::new().with(FieldName::Thk, 1000.0);
//! assert_eq!(bounds.scale(FieldName::Thk).unwrap(), 1000.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod field;
pub mod grid;

// 重导出常用类型
pub use error::{GlError, GlResult};
pub use field::{Field, FieldBounds, FieldName, MISSING_THRESHOLD};
pub use grid::Grid;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::ensure;
    pub use crate::error::{GlError, GlResult};
    pub use crate::field::{Field, FieldBounds, FieldName};
    pub use crate::grid::Grid;
}
