// apps/gl_cli/src/synthetic.rs

//! 合成山谷几何
//!
//! 沿 x 下倾的 U 形山谷，冰面高程跨越缺省平衡线。

use gl_foundation::{Field, GlResult, Grid};

/// 谷顶高程 [m]
const HEAD_ELEVATION: f32 = 3300.0;
/// 沿谷坡度
const VALLEY_SLOPE: f32 = 0.08;
/// 谷壁抬升系数 [1/m]
const WALL_CURVATURE: f32 = 4e-4;

/// 合成山谷
#[derive(Debug, Clone)]
pub struct Valley {
    /// 网格
    pub grid: Grid,
    /// 基岩高程
    pub topg: Field,
}

impl Valley {
    /// 构造 `nx × ny` 的山谷，`dx` 为网格间距
    pub fn new(nx: usize, ny: usize, dx: f32) -> GlResult<Self> {
        let grid = Grid::regular(nx, ny, dx, 0.0, 0.0)?;
        let (xx, yy) = grid.mesh();
        let ymid = 0.5 * dx * (ny.saturating_sub(1)) as f32;
        let mut topg = xx.mapv(|x| HEAD_ELEVATION - VALLEY_SLOPE * x);
        topg.zip_mut_with(&yy, |z, &y| *z += WALL_CURVATURE * (y - ymid).powi(2));
        Ok(Self { grid, topg })
    }

    /// 谷轴附近最厚、向谷壁变薄的冰厚
    pub fn glacier(&self, max_thk: f32) -> Field {
        let (ny, nx) = self.grid.shape();
        let half_width = 0.35 * ny as f32;
        Field::from_shape_fn((ny, nx), |(j, i)| {
            let across = (j as f32 - 0.5 * (ny - 1) as f32) / half_width;
            let along = i as f32 / nx as f32;
            let h = max_thk * (1.0 - across * across) * (1.0 - 0.6 * along);
            h.max(0.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valley_shape() {
        let valley = Valley::new(30, 15, 100.0).unwrap();
        // 谷轴低于谷壁，上游高于下游
        assert!(valley.topg[[7, 10]] < valley.topg[[0, 10]]);
        assert!(valley.topg[[7, 0]] > valley.topg[[7, 29]]);

        let thk = valley.glacier(200.0);
        assert!(thk[[7, 0]] > 190.0);
        assert_eq!(thk[[0, 10]], 0.0);
        assert!(thk.iter().all(|&h| h >= 0.0));
    }
}
