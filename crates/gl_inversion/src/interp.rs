// crates/gl_inversion/src/interp.rs

//! 双线性插值及其伴随
//!
//! 查询点以分数网格索引 `(j, i)` 给出；左下角索引截断到 `[0, n-2]`，
//! 权重截断到 `[0, 1]`，域外点取边界值。

use gl_foundation::{Field, Grid};

use crate::observations::ThicknessProfiles;

/// 单个查询点的插值模板
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stencil {
    j0: usize,
    i0: usize,
    aj: f32,
    ai: f32,
}

impl Stencil {
    fn new(qj: f64, qi: f64, ny: usize, nx: usize) -> Self {
        let axis = |q: f64, n: usize| {
            let max0 = n.saturating_sub(2) as f64;
            let f = q.floor().clamp(0.0, max0);
            (f as usize, (q - f).clamp(0.0, 1.0) as f32)
        };
        let (j0, aj) = axis(qj, ny);
        let (i0, ai) = axis(qi, nx);
        Self { j0, i0, aj, ai }
    }

    #[inline]
    fn weights(&self) -> [((usize, usize), f32); 4] {
        let (j, i, aj, ai) = (self.j0, self.i0, self.aj, self.ai);
        [
            ((j, i), (1.0 - aj) * (1.0 - ai)),
            ((j, i + 1), (1.0 - aj) * ai),
            ((j + 1, i), aj * (1.0 - ai)),
            ((j + 1, i + 1), aj * ai),
        ]
    }
}

/// 固定查询点的双线性采样器
#[derive(Debug, Clone, Default)]
pub struct BilinearSampler {
    stencils: Vec<Stencil>,
}

impl BilinearSampler {
    /// 由分数索引 `(j, i)` 构造
    pub fn from_indices(points: &[(f64, f64)], ny: usize, nx: usize) -> Self {
        Self {
            stencils: points
                .iter()
                .map(|&(qj, qi)| Stencil::new(qj, qi, ny, nx))
                .collect(),
        }
    }

    /// 剖面测点映射到网格：`i = (x - xmin)/dx`，`j = (y - ymin)/dx`
    pub fn for_profiles(profiles: &ThicknessProfiles, grid: &Grid) -> Self {
        let (xmin, ymin, dx) = (grid.x_min() as f64, grid.y_min() as f64, grid.dx() as f64);
        let points: Vec<(f64, f64)> = profiles
            .points()
            .map(|p| ((p.y - ymin) / dx, (p.x - xmin) / dx))
            .collect();
        let (ny, nx) = grid.shape();
        Self::from_indices(&points, ny, nx)
    }

    /// 查询点数
    pub fn len(&self) -> usize {
        self.stencils.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.stencils.is_empty()
    }

    /// 采样
    pub fn sample(&self, field: &Field) -> Vec<f32> {
        self.stencils
            .iter()
            .map(|s| s.weights().iter().map(|&(idx, w)| w * field[idx]).sum::<f32>())
            .collect()
    }

    /// 伴随：把各点梯度按权重散射回网格（累加到 `out`）
    pub fn scatter(&self, grads: &[f32], out: &mut Field) {
        for (s, &g) in self.stencils.iter().zip(grads) {
            for (idx, w) in s.weights() {
                out[idx] += w * g;
            }
        }
    }
}
