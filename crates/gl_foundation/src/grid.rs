// crates/gl_foundation/src/grid.rs

//! 规则二维网格
//!
//! 网格由单元中心坐标向量 `x`（列）和 `y`（行）定义，两个方向间距必须相同。
//! 字段数组统一采用 `(ny, nx)` 行优先布局，即 `field[[j, i]]` 对应 `(x[i], y[j])`。

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{GlError, GlResult};

/// 间距比较的相对容差
const SPACING_REL_TOL: f64 = 1e-4;

/// 规则网格（初始化后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    x: Array1<f32>,
    y: Array1<f32>,
    dx: f32,
}

impl Grid {
    /// 从坐标向量创建网格
    ///
    /// # 错误
    ///
    /// - 任一方向少于 2 个点
    /// - 间距非正或坐标不均匀
    /// - x 与 y 方向间距不一致（`GridSpacingMismatch`）
    pub fn new(x: Array1<f32>, y: Array1<f32>) -> GlResult<Self> {
        if x.len() < 2 || y.len() < 2 {
            return Err(GlError::invalid_grid(format!(
                "每个方向至少需要 2 个点: nx={}, ny={}",
                x.len(),
                y.len()
            )));
        }

        let dx = (x[1] - x[0]) as f64;
        let dy = (y[1] - y[0]) as f64;

        if dx <= 0.0 || dy <= 0.0 {
            return Err(GlError::invalid_grid(format!(
                "网格间距必须为正: dx={dx}, dy={dy}"
            )));
        }
        if (dx - dy).abs() > SPACING_REL_TOL * dx {
            return Err(GlError::GridSpacingMismatch { dx, dy });
        }
        check_uniform(&x, dx, "x")?;
        check_uniform(&y, dy, "y")?;

        Ok(Self {
            x,
            y,
            dx: dx as f32,
        })
    }

    /// 以左下角单元中心 `(x0, y0)` 创建 `nx × ny` 规则网格
    pub fn regular(nx: usize, ny: usize, dx: f32, x0: f32, y0: f32) -> GlResult<Self> {
        if dx <= 0.0 || !dx.is_finite() {
            return Err(GlError::invalid_grid(format!("网格间距必须为正: dx={dx}")));
        }
        let x = Array1::from_iter((0..nx).map(|i| x0 + i as f32 * dx));
        let y = Array1::from_iter((0..ny).map(|j| y0 + j as f32 * dx));
        Self::new(x, y)
    }

    /// 网格间距
    #[inline]
    pub fn dx(&self) -> f32 {
        self.dx
    }

    /// x 方向单元数
    #[inline]
    pub fn nx(&self) -> usize {
        self.x.len()
    }

    /// y 方向单元数
    #[inline]
    pub fn ny(&self) -> usize {
        self.y.len()
    }

    /// 字段形状 `(ny, nx)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.ny(), self.nx())
    }

    /// 单元面积
    #[inline]
    pub fn cell_area(&self) -> f64 {
        (self.dx as f64) * (self.dx as f64)
    }

    /// x 坐标向量
    pub fn x(&self) -> &Array1<f32> {
        &self.x
    }

    /// y 坐标向量
    pub fn y(&self) -> &Array1<f32> {
        &self.y
    }

    /// 最小 x 坐标
    pub fn x_min(&self) -> f32 {
        self.x[0]
    }

    /// 最小 y 坐标
    pub fn y_min(&self) -> f32 {
        self.y[0]
    }

    /// 网格坐标矩阵 `(X, Y)`，形状均为 `(ny, nx)`
    pub fn mesh(&self) -> (Array2<f32>, Array2<f32>) {
        let shape = self.shape();
        let xx = Array2::from_shape_fn(shape, |(_, i)| self.x[i]);
        let yy = Array2::from_shape_fn(shape, |(j, _)| self.y[j]);
        (xx, yy)
    }

    /// 全零字段
    pub fn zeros(&self) -> Array2<f32> {
        Array2::zeros(self.shape())
    }

    /// 常值字段
    pub fn constant(&self, value: f32) -> Array2<f32> {
        Array2::from_elem(self.shape(), value)
    }
}

fn check_uniform(coords: &Array1<f32>, spacing: f64, axis: &str) -> GlResult<()> {
    for w in coords.windows(2) {
        let d = (w[1] - w[0]) as f64;
        if (d - spacing).abs() > SPACING_REL_TOL * spacing {
            return Err(GlError::invalid_grid(format!(
                "{axis} 方向坐标不均匀: 期望间距 {spacing}, 实际 {d}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regular_grid() {
        let grid = Grid::regular(12, 10, 100.0, 0.0, 500.0).unwrap();
        assert_eq!(grid.shape(), (10, 12));
        assert_eq!(grid.dx(), 100.0);
        assert_eq!(grid.y_min(), 500.0);
        assert!((grid.cell_area() - 1.0e4).abs() < 1e-9);
    }

    #[test]
    fn test_spacing_mismatch_is_fatal() {
        let x = array![0.0f32, 100.0, 200.0];
        let y = array![0.0f32, 50.0, 100.0];
        let err = Grid::new(x, y).unwrap_err();
        assert!(matches!(err, GlError::GridSpacingMismatch { .. }));
    }

    #[test]
    fn test_non_positive_spacing_rejected() {
        assert!(Grid::regular(4, 4, 0.0, 0.0, 0.0).is_err());
        assert!(Grid::regular(4, 4, -10.0, 0.0, 0.0).is_err());

        let x = array![200.0f32, 100.0, 0.0];
        let y = array![200.0f32, 100.0, 0.0];
        assert!(Grid::new(x, y).is_err());
    }

    #[test]
    fn test_mesh_layout() {
        let grid = Grid::regular(3, 2, 10.0, 0.0, 0.0).unwrap();
        let (xx, yy) = grid.mesh();
        assert_eq!(xx.dim(), (2, 3));
        assert_eq!(xx[[1, 2]], 20.0);
        assert_eq!(yy[[1, 2]], 10.0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let grid = Grid::regular(3, 3, 25.0, 0.0, 0.0).unwrap();
        let json = serde_json::to_string(&grid).unwrap();
        let back: Grid = serde_json::from_str(&json).unwrap();
        assert_eq!(grid, back);
    }
}
