// crates/gl_physics/src/transport.rs

//! 质量守恒输运求解器
//!
//! 以显式前向 Euler 和迎风有限体积格式求解冰厚演化方程：
//!
//! $$ \frac{\partial h}{\partial t} + \frac{\partial (u h)}{\partial x} + \frac{\partial (v h)}{\partial y} = \dot{b} $$
//!
//! # 离散
//!
//! 1. 速度插值到单元边（交错网格）：内部边取相邻单元平均，边界边取相邻单元值
//! 2. 冰厚在边界外延拓一层，取边界单元自身的值
//! 3. 边通量取上游单元冰厚 `Q = u_e * h_upwind`；`u_e == 0` 时取 "非 u>0" 分支
//! 4. 散度 `(Q_e - Q_w)/dx + (Q_n - Q_s)/dy`
//!
//! 更新后投影到非负：`h = max(h + dt (smb - div), 0)`，再由 `usurf = topg + h`
//! 重建冰面并重算坡度。

use ndarray::{Array2, ArrayView2, Zip};

use crate::state::SimulationState;

/// 单元 `k-1` 与 `k` 之间的边速度（`k` 取 0..=n）
#[inline]
fn edge_velocity(row: impl Fn(usize) -> f32, k: usize, n: usize) -> f32 {
    if k == 0 {
        row(0)
    } else if k == n {
        row(n - 1)
    } else {
        0.5 * (row(k - 1) + row(k))
    }
}

/// 边 `k` 的上游单元索引（含边界延拓）
#[inline]
fn upwind_index(ue: f32, k: usize, n: usize) -> usize {
    if ue > 0.0 {
        k.saturating_sub(1)
    } else {
        k.min(n - 1)
    }
}

/// 迎风通量散度
///
/// `u`, `v`, `h` 形状均为 `(ny, nx)`，返回同形状散度场。
pub fn compute_divflux(
    u: ArrayView2<f32>,
    v: ArrayView2<f32>,
    h: ArrayView2<f32>,
    dx: f32,
    dy: f32,
) -> Array2<f32> {
    let (ny, nx) = h.dim();
    let mut div = Array2::zeros((ny, nx));
    if ny == 0 || nx == 0 {
        return div;
    }

    Zip::indexed(&mut div).par_for_each(|(j, i), d| {
        let urow = |k: usize| u[[j, k]];
        let vcol = |k: usize| v[[k, i]];

        let uw = edge_velocity(urow, i, nx);
        let ue = edge_velocity(urow, i + 1, nx);
        let vs = edge_velocity(vcol, j, ny);
        let vn = edge_velocity(vcol, j + 1, ny);

        let qw = uw * h[[j, upwind_index(uw, i, nx)]];
        let qe = ue * h[[j, upwind_index(ue, i + 1, nx)]];
        let qs = vs * h[[upwind_index(vs, j, ny), i]];
        let qn = vn * h[[upwind_index(vn, j + 1, ny), i]];

        *d = (qe - qw) / dx + (qn - qs) / dy;
    });

    div
}

/// [`compute_divflux`] 的伴随
///
/// 迎风选择视为分段常数（与自动微分对 `where` 的处理一致）。
/// 返回 `(∂L/∂u, ∂L/∂v, ∂L/∂h)`。
pub fn compute_divflux_adjoint(
    u: ArrayView2<f32>,
    v: ArrayView2<f32>,
    h: ArrayView2<f32>,
    dx: f32,
    dy: f32,
    grad_div: ArrayView2<f32>,
) -> (Array2<f32>, Array2<f32>, Array2<f32>) {
    let (ny, nx) = h.dim();
    let mut gu = Array2::zeros((ny, nx));
    let mut gv = Array2::zeros((ny, nx));
    let mut gh = Array2::zeros((ny, nx));
    if ny == 0 || nx == 0 {
        return (gu, gv, gh);
    }

    // x 方向边
    for j in 0..ny {
        for k in 0..=nx {
            let ue = edge_velocity(|c| u[[j, c]], k, nx);
            let up = upwind_index(ue, k, nx);

            let mut gq = 0.0;
            if k >= 1 {
                gq += grad_div[[j, k - 1]];
            }
            if k < nx {
                gq -= grad_div[[j, k]];
            }
            gq /= dx;
            if gq == 0.0 {
                continue;
            }

            gh[[j, up]] += gq * ue;
            let gue = gq * h[[j, up]];
            if k == 0 {
                gu[[j, 0]] += gue;
            } else if k == nx {
                gu[[j, nx - 1]] += gue;
            } else {
                gu[[j, k - 1]] += 0.5 * gue;
                gu[[j, k]] += 0.5 * gue;
            }
        }
    }

    // y 方向边
    for i in 0..nx {
        for k in 0..=ny {
            let ve = edge_velocity(|c| v[[c, i]], k, ny);
            let up = upwind_index(ve, k, ny);

            let mut gq = 0.0;
            if k >= 1 {
                gq += grad_div[[k - 1, i]];
            }
            if k < ny {
                gq -= grad_div[[k, i]];
            }
            gq /= dy;
            if gq == 0.0 {
                continue;
            }

            gh[[up, i]] += gq * ve;
            let gve = gq * h[[up, i]];
            if k == 0 {
                gv[[0, i]] += gve;
            } else if k == ny {
                gv[[ny - 1, i]] += gve;
            } else {
                gv[[k - 1, i]] += 0.5 * gve;
                gv[[k, i]] += 0.5 * gve;
            }
        }
    }

    (gu, gv, gh)
}

/// 前向 Euler 冰厚更新并投影到非负
pub fn advance_thickness(
    thk: ArrayView2<f32>,
    smb: ArrayView2<f32>,
    divflux: ArrayView2<f32>,
    dt: f32,
) -> Array2<f32> {
    Zip::from(&thk)
        .and(&smb)
        .and(&divflux)
        .par_map_collect(|&h, &b, &d| (h + dt * (b - d)).max(0.0))
}

/// 输运求解器（无内部状态，持有 `thk`/`usurf`/坡度的写权限）
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportSolver;

impl TransportSolver {
    /// 推进一个时间步
    ///
    /// 更新 `divflux`、`thk`、`usurf`、`slopsurfx`、`slopsurfy`。
    pub fn step(&self, state: &mut SimulationState, dt: f32) {
        let dx = state.grid.dx();

        state.divflux = compute_divflux(
            state.ubar.view(),
            state.vbar.view(),
            state.thk.view(),
            dx,
            dx,
        );
        state.thk = advance_thickness(
            state.thk.view(),
            state.smb.view(),
            state.divflux.view(),
            dt,
        );
        state.rebuild_surface();

        log::trace!(
            "输运更新: dt={:.4}, max|div|={:.4e}",
            dt,
            state.divflux.iter().fold(0.0f32, |m, v| m.max(v.abs()))
        );
    }
}
