// crates/gl_inversion/src/cost.rs

//! 代价项及其对模型量的梯度
//!
//! 每个函数返回 `(代价值, 梯度)`，梯度针对函数输入的同一物理量，
//! 链式法则由 [`crate::engine`] 组合。
//!
//! # 约定
//!
//! - 失配项：`0.5 * mean(((model - target) / std)²)`，只在有效单元上取平均
//! - 有效单元为空时代价与梯度均为 0
//! - 罚项权重 [`PENALTY_WEIGHT`] 对全部单元取平均

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use gl_foundation::Field;

use crate::interp::BilinearSampler;
use crate::observations::ThicknessProfiles;

/// 软约束罚项权重
pub const PENALTY_WEIGHT: f64 = 1e10;

/// 冰川掩膜阈值
pub const MASK_THRESHOLD: f32 = 0.5;

/// 诊断统计与人工空洞只认掩膜恰为该值的单元，比 [`MASK_THRESHOLD`] 更严
pub const GLACIATED: f32 = 1.0;

/// 单次迭代的代价分解
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// 冰面速度失配
    pub velsurf: f64,
    /// 冰厚失配
    pub thk: f64,
    /// 通量散度失配
    pub divflux: f64,
    /// 冰面高程失配
    pub usurf: f64,
    /// `usurf = topg + thk` 罚项
    pub topg: f64,
    /// 掩膜外冰厚罚项
    pub icemask: f64,
    /// 负冰厚罚项
    pub positivity: f64,
    /// 流动控制场名义值罚项
    pub strflowctrl: f64,
    /// 冰厚正则化
    pub regu_thk: f64,
    /// 流动控制场正则化
    pub regu_strflowctrl: f64,
}

impl CostBreakdown {
    /// 总代价
    pub fn total(&self) -> f64 {
        self.velsurf
            + self.thk
            + self.divflux
            + self.usurf
            + self.topg
            + self.icemask
            + self.positivity
            + self.strflowctrl
            + self.regu_thk
            + self.regu_strflowctrl
    }

    /// `costs.dat` 中的一行：`COST_U COST_H COST_D COST_S REGU_H REGU_A`
    pub fn report_row(&self) -> [f64; 6] {
        [
            self.velsurf,
            self.thk,
            self.divflux,
            self.usurf,
            self.regu_thk,
            self.regu_strflowctrl,
        ]
    }
}

/// 掩膜内（`> 0.5`）布尔场
pub fn inside_mask(mask: &Field) -> Array2<bool> {
    mask.mapv(|m| m > MASK_THRESHOLD)
}

/// 有效观测（非 NaN）布尔场
pub fn valid(obs: &Field) -> Array2<bool> {
    obs.mapv(|v| !v.is_nan())
}

/// 在 `active` 单元上的标准化失配
///
/// 梯度针对 `model`：`(model - target) / (std² N)`。
pub fn masked_misfit(
    model: &Field,
    target: &Field,
    std: f64,
    active: &Array2<bool>,
) -> (f64, Field) {
    let mut grad = Field::zeros(model.raw_dim());
    let n = active.iter().filter(|&&a| a).count();
    if n == 0 {
        return (0.0, grad);
    }

    let var = std * std;
    let mut sum = 0.0;
    Zip::from(&mut grad)
        .and(model)
        .and(target)
        .and(active)
        .for_each(|g, &m, &t, &a| {
            if a {
                let r = m as f64 - t as f64;
                sum += r * r / var;
                *g = (r / var / n as f64) as f32;
            }
        });
    (0.5 * sum / n as f64, grad)
}

/// 冰面速度矢量失配，两分量的有效值合并取平均
///
/// 返回 `(代价, ∂/∂uvelsurf, ∂/∂vvelsurf)`。
pub fn velocity_misfit(
    uvelsurf: &Field,
    vvelsurf: &Field,
    uobs: &Field,
    vobs: &Field,
    std: f64,
) -> (f64, Field, Field) {
    let (vu, vv) = (valid(uobs), valid(vobs));
    let n = vu.iter().chain(vv.iter()).filter(|&&a| a).count();
    if n == 0 {
        let zeros = Field::zeros(uvelsurf.raw_dim());
        return (0.0, zeros.clone(), zeros);
    }

    // 分别按各自有效数求值，再按总数 n 重新加权
    let (cu, gu) = masked_misfit(uvelsurf, uobs, std, &vu);
    let (cv, gv) = masked_misfit(vvelsurf, vobs, std, &vv);
    let (nu, nv) = (
        vu.iter().filter(|&&a| a).count() as f64,
        vv.iter().filter(|&&a| a).count() as f64,
    );
    let n = n as f64;
    let (ru, rv) = ((nu / n) as f32, (nv / n) as f32);
    (
        (cu * nu + cv * nv) / n,
        gu.mapv(|g| g * ru),
        gv.mapv(|g| g * rv),
    )
}

/// 剖面冰厚失配（双线性插值，逐点标准差）
///
/// 梯度针对物理冰厚。
pub fn profile_misfit(
    thk: &Field,
    profiles: &ThicknessProfiles,
    sampler: &BilinearSampler,
) -> (f64, Field) {
    let mut grad = Field::zeros(thk.raw_dim());
    let n = sampler.len();
    if n == 0 {
        return (0.0, grad);
    }

    let sampled = sampler.sample(thk);
    let mut sum = 0.0;
    let point_grads: Vec<f32> = profiles
        .points()
        .zip(&sampled)
        .map(|(p, &m)| {
            let var = (p.std as f64).powi(2);
            let r = m as f64 - p.thk as f64;
            sum += r * r / var;
            (r / var / n as f64) as f32
        })
        .collect();
    sampler.scatter(&point_grads, &mut grad);
    (0.5 * sum / n as f64, grad)
}

/// `usurf - thk - topg` 在掩膜内的硬约束罚项
///
/// 返回 `(代价, ∂/∂usurf, ∂/∂thk)`。
pub fn surface_consistency_penalty(
    usurf: &Field,
    thk: &Field,
    topg: &Field,
    active: &Array2<bool>,
) -> (f64, Field, Field) {
    let mut gs = Field::zeros(usurf.raw_dim());
    let n = active.iter().filter(|&&a| a).count();
    if n == 0 {
        return (0.0, gs.clone(), gs);
    }

    let mut sum = 0.0;
    Zip::from(&mut gs)
        .and(usurf)
        .and(thk)
        .and(topg)
        .and(active)
        .for_each(|g, &s, &h, &b, &a| {
            if a {
                let r = s as f64 - h as f64 - b as f64;
                sum += r * r;
                *g = (2.0 * PENALTY_WEIGHT * r / n as f64) as f32;
            }
        });
    let gh = gs.mapv(|g| -g);
    (PENALTY_WEIGHT * sum / n as f64, gs, gh)
}

/// 全场平均的二次罚项 `W * mean(where(pred, x², 0))`
fn quadratic_penalty(x: &Field, pred: impl Fn(f32, usize) -> bool) -> (f64, Field) {
    let n = x.len().max(1) as f64;
    let mut sum = 0.0;
    let grad = Array2::from_shape_fn(x.raw_dim(), |(j, i)| {
        let v = x[[j, i]];
        if pred(v, j * x.ncols() + i) {
            sum += (v as f64).powi(2);
            (2.0 * PENALTY_WEIGHT * v as f64 / n) as f32
        } else {
            0.0
        }
    });
    (PENALTY_WEIGHT * sum / n, grad)
}

/// 掩膜外冰厚罚项（针对无量纲冰厚）
pub fn outside_mask_penalty(thk_n: &Field, mask: &Field) -> (f64, Field) {
    let outside: Vec<bool> = mask.iter().map(|&m| m <= MASK_THRESHOLD).collect();
    quadratic_penalty(thk_n, |_, k| outside[k])
}

/// 负冰厚罚项（针对无量纲冰厚）
pub fn negativity_penalty(thk_n: &Field) -> (f64, Field) {
    quadratic_penalty(thk_n, |v, _| v < 0.0)
}

/// 流动控制场偏离名义值的罚项，梯度针对物理值
pub fn nominal_penalty(field: &Field, nominal: f64, std: f64) -> (f64, Field) {
    let all = Array2::from_elem(field.raw_dim(), true);
    let target = Field::from_elem(field.raw_dim(), nominal as f32);
    masked_misfit(field, &target, std, &all)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 中心差分检查：`f(x + e) - f(x - e) ≈ 2 e g`
    fn check_gradient(f: impl Fn(&Field) -> (f64, Field), x: &Field, eps: f32, tol: f64) {
        let (_, g) = f(x);
        for idx in [(0, 0), (1, 2), (2, 1)] {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[idx] += eps;
            xm[idx] -= eps;
            let fd = (f(&xp).0 - f(&xm).0) / (2.0 * eps as f64);
            let an = g[idx] as f64;
            assert!(
                (fd - an).abs() <= tol * (1.0 + an.abs()),
                "{idx:?}: fd={fd} analytic={an}"
            );
        }
    }

    fn sample_field() -> Field {
        Field::from_shape_fn((3, 4), |(j, i)| 10.0 + (j * 4 + i) as f32 * 1.5)
    }

    #[test]
    fn test_masked_misfit_value() {
        let model = Field::from_elem((2, 2), 3.0);
        let target = Field::from_elem((2, 2), 1.0);
        let mut active = Array2::from_elem((2, 2), true);
        active[[0, 0]] = false;
        let (c, g) = masked_misfit(&model, &target, 2.0, &active);
        // 0.5 * (2/2)² = 0.5
        assert!((c - 0.5).abs() < 1e-12);
        assert_eq!(g[[0, 0]], 0.0);
        assert!((g[[1, 1]] - 0.5 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_active_set_is_zero() {
        let model = Field::from_elem((2, 2), 3.0);
        let active = Array2::from_elem((2, 2), false);
        let (c, g) = masked_misfit(&model, &model, 1.0, &active);
        assert_eq!(c, 0.0);
        assert!(g.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_velocity_misfit_pools_components() {
        let u = Field::from_elem((2, 2), 4.0);
        let v = Field::from_elem((2, 2), 0.0);
        let mut uobs = Field::from_elem((2, 2), 2.0);
        let vobs = Field::from_elem((2, 2), f32::NAN);
        uobs[[0, 0]] = f32::NAN;
        let (c, gu, gv) = velocity_misfit(&u, &v, &uobs, &vobs, 1.0);
        assert!((c - 2.0).abs() < 1e-12);
        assert!((gu[[1, 1]] - 2.0 / 3.0).abs() < 1e-6);
        assert!(gv.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_velocity_gradient() {
        let uobs = sample_field().mapv(|v| v * 0.9);
        let vobs = sample_field().mapv(|v| -v);
        let v = sample_field();
        check_gradient(
            |u| {
                let (c, gu, _) = velocity_misfit(u, &v, &uobs, &vobs, 3.0);
                (c, gu)
            },
            &sample_field(),
            1e-2,
            1e-3,
        );
    }

    #[test]
    fn test_profile_gradient() {
        let profiles = ThicknessProfiles::from_rows(&[
            (1.0, 50.0, 50.0, 20.0, 5.0),
            (1.0, 150.0, 120.0, 15.0, 5.0),
            (2.0, 220.0, 40.0, 30.0, 2.0),
        ]);
        let sampler = BilinearSampler::from_indices(&[(0.5, 0.5), (1.2, 1.5), (0.4, 2.2)], 3, 4);
        check_gradient(
            |h| profile_misfit(h, &profiles, &sampler),
            &sample_field(),
            1e-2,
            1e-3,
        );
    }

    #[test]
    fn test_penalties() {
        let mut thk_n = Field::from_elem((2, 2), 0.1);
        thk_n[[0, 1]] = -0.2;
        let (c, g) = negativity_penalty(&thk_n);
        assert!((c / (PENALTY_WEIGHT * 0.01) - 1.0).abs() < 1e-6);
        assert_eq!(g[[0, 0]], 0.0);
        assert!(g[[0, 1]] < 0.0);

        let mut mask = Field::from_elem((2, 2), 1.0);
        mask[[1, 1]] = 0.0;
        let (c, g) = outside_mask_penalty(&thk_n, &mask);
        assert!((c / (PENALTY_WEIGHT * 0.0025) - 1.0).abs() < 1e-6);
        assert!(g[[1, 1]] > 0.0);
        assert_eq!(g[[0, 0]], 0.0);
    }

    #[test]
    fn test_surface_consistency() {
        let topg = Field::from_elem((2, 2), 100.0);
        let thk = Field::from_elem((2, 2), 50.0);
        let usurf = Field::from_elem((2, 2), 150.0);
        let active = Array2::from_elem((2, 2), true);
        let (c, gs, gh) = surface_consistency_penalty(&usurf, &thk, &topg, &active);
        assert_eq!(c, 0.0);
        assert!(gs.iter().chain(gh.iter()).all(|&g| g == 0.0));

        let usurf = Field::from_elem((2, 2), 151.0);
        let (c, gs, gh) = surface_consistency_penalty(&usurf, &thk, &topg, &active);
        assert!((c - PENALTY_WEIGHT).abs() < 1.0);
        assert_eq!(gs[[0, 0]], -gh[[0, 0]]);
    }

    #[test]
    fn test_breakdown_total() {
        let c = CostBreakdown {
            velsurf: 1.0,
            thk: 2.0,
            regu_thk: 0.5,
            positivity: 0.25,
            ..Default::default()
        };
        assert_eq!(c.total(), 3.75);
        assert_eq!(c.report_row(), [1.0, 2.0, 0.0, 0.0, 0.5, 0.0]);
    }
}
