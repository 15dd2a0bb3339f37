// crates/gl_physics/src/operators.rs

//! 规则网格差分算子
//!
//! - 中心差分梯度（边界采用常值延拓）及其伴随
//! - 向量模
//! - 全场最大绝对速度（并行规约）
//!
//! # 梯度格式
//!
//! 先在单元边上取相邻单元平均（边界边取边界单元值），再对边值差分：
//!
//! $$ \partial_x s_i = \frac{s_{\min(i+1, n-1)} - s_{\max(i-1, 0)}}{2\Delta x} $$

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, Zip};

/// 中心差分梯度 `(∂s/∂x, ∂s/∂y)`
pub fn compute_gradient(s: ArrayView2<f32>, dx: f32, dy: f32) -> (Array2<f32>, Array2<f32>) {
    let (ny, nx) = s.dim();
    let mut gx = Array2::zeros((ny, nx));
    let mut gy = Array2::zeros((ny, nx));
    if ny == 0 || nx == 0 {
        return (gx, gy);
    }

    let inv2dx = 0.5 / dx;
    let inv2dy = 0.5 / dy;

    Zip::indexed(&mut gx).par_for_each(|(j, i), g| {
        let ie = (i + 1).min(nx - 1);
        let iw = i.saturating_sub(1);
        *g = (s[[j, ie]] - s[[j, iw]]) * inv2dx;
    });
    Zip::indexed(&mut gy).par_for_each(|(j, i), g| {
        let jn = (j + 1).min(ny - 1);
        let js = j.saturating_sub(1);
        *g = (s[[jn, i]] - s[[js, i]]) * inv2dy;
    });

    (gx, gy)
}

/// [`compute_gradient`] 的伴随：由 `(∂L/∂gx, ∂L/∂gy)` 得到 `∂L/∂s`
pub fn compute_gradient_adjoint(
    grad_gx: ArrayView2<f32>,
    grad_gy: ArrayView2<f32>,
    dx: f32,
    dy: f32,
) -> Array2<f32> {
    let (ny, nx) = grad_gx.dim();
    let mut out = Array2::zeros((ny, nx));
    if ny == 0 || nx == 0 {
        return out;
    }

    let inv2dx = 0.5 / dx;
    let inv2dy = 0.5 / dy;

    for j in 0..ny {
        for i in 0..nx {
            let gx = grad_gx[[j, i]] * inv2dx;
            out[[j, (i + 1).min(nx - 1)]] += gx;
            out[[j, i.saturating_sub(1)]] -= gx;

            let gy = grad_gy[[j, i]] * inv2dy;
            out[[(j + 1).min(ny - 1), i]] += gy;
            out[[j.saturating_sub(1), i]] -= gy;
        }
    }
    out
}

/// 向量模 `sqrt(u² + v²)`
pub fn magnitude(u: ArrayView2<f32>, v: ArrayView2<f32>) -> Array2<f32> {
    Zip::from(&u)
        .and(&v)
        .par_map_collect(|&a, &b| (a * a + b * b).sqrt())
}

/// `max(|u|, |v|)` 全场最大值（NaN 被忽略）
pub fn max_abs_velocity(u: ArrayView2<f32>, v: ArrayView2<f32>) -> f32 {
    let max_abs = |a: ArrayView2<f32>| {
        a.into_par_iter()
            .map(|x| x.abs())
            .reduce(|| 0.0f32, f32::max)
    };
    max_abs(u).max(max_abs(v))
}
