// crates/gl_inversion/src/optimizer.rs

//! Adam 优化器
//!
//! 每个控制变量持有独立的一阶、二阶矩估计：
//!
//! ```text
//! m = β1 m + (1 - β1) g
//! v = β2 v + (1 - β2) g²
//! lr_t = lr · sqrt(1 - β2^t) / (1 - β1^t)
//! x -= lr_t · m / (sqrt(v) + ε)
//! ```
//!
//! 梯度恒为零的单元，矩保持为零，参数不变。

use ndarray::{Array2, Zip};

/// 一阶矩衰减
const BETA1: f64 = 0.9;
/// 二阶矩衰减
const BETA2: f64 = 0.999;
/// 数值稳定项
const EPSILON: f64 = 1e-7;

/// Adam 优化器
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    t: i32,
    moments: Vec<(Array2<f32>, Array2<f32>)>,
}

impl Adam {
    /// 为 `n_params` 个形状为 `shape` 的参数创建优化器
    pub fn new(lr: f64, n_params: usize, shape: (usize, usize)) -> Self {
        Self {
            lr,
            t: 0,
            moments: (0..n_params)
                .map(|_| (Array2::zeros(shape), Array2::zeros(shape)))
                .collect(),
        }
    }

    /// 已执行的步数
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// 一步更新，`params` 与 `grads` 顺序与创建时一致
    pub fn step(&mut self, params: &mut [&mut Array2<f32>], grads: &[Array2<f32>]) {
        self.t += 1;
        let lr_t = self.lr * (1.0 - BETA2.powi(self.t)).sqrt() / (1.0 - BETA1.powi(self.t));
        let (lr_t, b1, b2, eps) = (lr_t as f32, BETA1 as f32, BETA2 as f32, EPSILON as f32);

        for ((x, g), (m, v)) in params.iter_mut().zip(grads).zip(self.moments.iter_mut()) {
            Zip::from(&mut **x)
                .and(g)
                .and(m)
                .and(v)
                .for_each(|x, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *x -= lr_t * *m / (v.sqrt() + eps);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_moves_by_lr() {
        let mut x = Array2::<f32>::from_elem((2, 2), 1.0);
        let g = Array2::<f32>::from_elem((2, 2), 5.0);
        let mut adam = Adam::new(0.1, 1, (2, 2));
        adam.step(&mut [&mut x], &[g]);
        // 首步位移约为 lr·sign(g)
        assert!((x[[0, 0]] - 0.9).abs() < 1e-4);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_zero_gradient_keeps_parameter() {
        let mut x = Array2::<f32>::from_elem((3, 3), 0.25);
        let g = Array2::<f32>::zeros((3, 3));
        let mut adam = Adam::new(0.01, 1, (3, 3));
        for _ in 0..10 {
            adam.step(&mut [&mut x], &[g.clone()]);
        }
        assert!(x.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut x = Array2::<f32>::from_elem((1, 1), 3.0);
        let mut adam = Adam::new(0.05, 1, (1, 1));
        for _ in 0..500 {
            let g = x.mapv(|v| 2.0 * (v - 1.0));
            adam.step(&mut [&mut x], &[g]);
        }
        assert!((x[[0, 0]] - 1.0).abs() < 0.05);
    }
}
