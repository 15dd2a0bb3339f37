// crates/gl_inversion/src/regularization.rs

//! 控制变量的平滑正则化
//!
//! # 冰厚
//!
//! 在单元角点（形状 `(ny-1, nx-1)`）上取差分：
//!
//! ```text
//! dbdx[j,i] = ((h[j,i+1] - h[j,i]) + (h[j+1,i+1] - h[j+1,i])) / 2
//! dbdy[j,i] = ((h[j+1,i] - h[j,i]) + (h[j+1,i+1] - h[j,i+1])) / 2
//! ```
//!
//! 各向同性（因子为 1）：`R = λ (‖dbdx‖² + ‖dbdy‖²) / 2`。
//! 否则按观测流向 `(fx, fy)` 分解为顺流与横流分量，横流乘以各向异性因子，
//! 并减去凸性项 `γ Σh`。
//!
//! # 流动控制场
//!
//! 只对两端都在掩膜内的相邻单元对取差分。

use ndarray::Array2;

use gl_foundation::Field;

use crate::cost::MASK_THRESHOLD;
use crate::flowdir::FlowDirection;

/// `‖x‖² / 2`
fn half_l2(x: &Array2<f32>) -> f64 {
    0.5 * x.iter().map(|&v| (v as f64).powi(2)).sum::<f64>()
}

/// 角点差分 `(dbdx, dbdy)`
pub fn corner_differences(h: &Field) -> (Array2<f32>, Array2<f32>) {
    let (ny, nx) = h.dim();
    let shape = (ny.saturating_sub(1), nx.saturating_sub(1));
    let dbdx = Array2::from_shape_fn(shape, |(j, i)| {
        0.5 * ((h[[j, i + 1]] - h[[j, i]]) + (h[[j + 1, i + 1]] - h[[j + 1, i]]))
    });
    let dbdy = Array2::from_shape_fn(shape, |(j, i)| {
        0.5 * ((h[[j + 1, i]] - h[[j, i]]) + (h[[j + 1, i + 1]] - h[[j, i + 1]]))
    });
    (dbdx, dbdy)
}

/// [`corner_differences`] 的伴随
pub fn corner_differences_adjoint(
    gx: &Array2<f32>,
    gy: &Array2<f32>,
    shape: (usize, usize),
) -> Field {
    let mut out = Field::zeros(shape);
    for ((j, i), &a) in gx.indexed_iter() {
        let b = gy[[j, i]];
        out[[j, i]] += -0.5 * a - 0.5 * b;
        out[[j, i + 1]] += 0.5 * a - 0.5 * b;
        out[[j + 1, i]] += -0.5 * a + 0.5 * b;
        out[[j + 1, i + 1]] += 0.5 * a + 0.5 * b;
    }
    out
}

/// 冰厚平滑正则化
#[derive(Debug, Clone)]
pub struct ThicknessSmoothing {
    weight: f64,
    anisotropy: f64,
    convexity: f64,
    flow: Option<FlowDirection>,
}

impl ThicknessSmoothing {
    /// 各向同性平滑
    pub fn isotropic(weight: f64) -> Self {
        Self {
            weight,
            anisotropy: 1.0,
            convexity: 0.0,
            flow: None,
        }
    }

    /// 沿观测流向的各向异性平滑
    pub fn anisotropic(weight: f64, anisotropy: f64, convexity: f64, flow: FlowDirection) -> Self {
        Self {
            weight,
            anisotropy,
            convexity,
            flow: Some(flow),
        }
    }

    /// 是否为各向同性
    pub fn is_isotropic(&self) -> bool {
        self.flow.is_none()
    }

    /// 求值与对无量纲冰厚的梯度
    pub fn evaluate(&self, thk_n: &Field) -> (f64, Field) {
        let shape = thk_n.dim();
        if shape.0 < 2 || shape.1 < 2 {
            return (0.0, Field::zeros(shape));
        }
        let (dbdx, dbdy) = corner_differences(thk_n);
        let w = self.weight as f32;

        match &self.flow {
            None => {
                let value = self.weight * (half_l2(&dbdx) + half_l2(&dbdy));
                let grad = corner_differences_adjoint(&(&dbdx * w), &(&dbdy * w), shape);
                (value, grad)
            }
            Some(flow) => {
                let (fx, fy) = (&flow.x, &flow.y);
                let along = &dbdx * fx + &dbdy * fy;
                let across = &dbdx * fy - &dbdy * fx;
                let aniso = self.anisotropy as f32;

                let total: f64 = thk_n.iter().map(|&h| h as f64).sum();
                let value = self.weight
                    * (half_l2(&along) + self.anisotropy * half_l2(&across)
                        - self.convexity * total);

                let gx = (&along * fx + &(&across * fy) * aniso) * w;
                let gy = (&along * fy - &(&across * fx) * aniso) * w;
                let mut grad = corner_differences_adjoint(&gx, &gy, shape);
                let shift = (self.weight * self.convexity) as f32;
                grad.mapv_inplace(|g| g - shift);
                (value, grad)
            }
        }
    }
}

/// 流动控制场在掩膜内的平滑正则化，返回对无量纲场的梯度
pub fn flow_control_smoothing(sf_n: &Field, mask: &Field, weight: f64) -> (f64, Field) {
    let (ny, nx) = sf_n.dim();
    let mut grad = Field::zeros((ny, nx));
    let inside = |j: usize, i: usize| mask[[j, i]] > MASK_THRESHOLD;
    let w = weight as f32;
    let mut sum = 0.0;

    for j in 0..ny {
        for i in 0..nx {
            if i + 1 < nx && inside(j, i) && inside(j, i + 1) {
                let d = sf_n[[j, i + 1]] - sf_n[[j, i]];
                sum += (d as f64).powi(2);
                grad[[j, i + 1]] += w * d;
                grad[[j, i]] -= w * d;
            }
            if j + 1 < ny && inside(j, i) && inside(j + 1, i) {
                let d = sf_n[[j + 1, i]] - sf_n[[j, i]];
                sum += (d as f64).powi(2);
                grad[[j + 1, i]] += w * d;
                grad[[j, i]] -= w * d;
            }
        }
    }
    (0.5 * weight * sum, grad)
}
