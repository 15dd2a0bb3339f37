// crates/gl_inversion/src/flowdir.rs

//! 各向异性平滑所用的观测流向
//!
//! 1. 缺测速度置 0，平均到单元角点（形状 `(ny-1, nx-1)`）
//! 2. 高斯平滑（σ = 3 单元，边界外取 0，截断半径 4σ）
//! 3. 归一化为单位向量，零向量处取 0

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use gl_foundation::Field;

/// 平滑尺度 [单元]
const SIGMA: f64 = 3.0;
/// 截断倍数
const TRUNCATE: f64 = 4.0;

/// 单位流向场（角点）
#[derive(Debug, Clone)]
pub struct FlowDirection {
    /// x 分量
    pub x: Array2<f32>,
    /// y 分量
    pub y: Array2<f32>,
}

impl FlowDirection {
    /// 由观测冰面速度计算
    pub fn from_velocity(uobs: &Field, vobs: &Field) -> Self {
        let fx = gaussian_filter(corner_average(uobs.view()).view(), SIGMA);
        let fy = gaussian_filter(corner_average(vobs.view()).view(), SIGMA);

        let (mut x, mut y) = (fx, fy);
        Zip::from(&mut x).and(&mut y).for_each(|u, v| {
            let mag = (*u * *u + *v * *v).sqrt();
            if mag > 0.0 && mag.is_finite() {
                *u /= mag;
                *v /= mag;
            } else {
                *u = 0.0;
                *v = 0.0;
            }
        });
        Self { x, y }
    }
}

/// 四邻单元平均到角点，NaN 视为 0
pub fn corner_average(f: ArrayView2<f32>) -> Array2<f32> {
    let (ny, nx) = f.dim();
    let val = |j: usize, i: usize| {
        let v = f[[j, i]];
        if v.is_nan() {
            0.0
        } else {
            v
        }
    };
    Array2::from_shape_fn((ny.saturating_sub(1), nx.saturating_sub(1)), |(j, i)| {
        0.25 * (val(j, i) + val(j + 1, i) + val(j, i + 1) + val(j + 1, i + 1))
    })
}

/// 归一化一维高斯核
fn gaussian_kernel(sigma: f64) -> Array1<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as i64;
    let k = Array1::from_iter(
        (-radius..=radius).map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp()),
    );
    let sum = k.sum();
    k / sum
}

/// 可分离高斯平滑，域外为 0
pub fn gaussian_filter(f: ArrayView2<f32>, sigma: f64) -> Array2<f32> {
    let kernel = gaussian_kernel(sigma);
    let tmp = convolve_axis(f.mapv(f64::from).view(), &kernel, Axis(1));
    convolve_axis(tmp.view(), &kernel, Axis(0)).mapv(|v| v as f32)
}

fn convolve_axis(f: ArrayView2<f64>, kernel: &Array1<f64>, axis: Axis) -> Array2<f64> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array2::<f64>::zeros(f.raw_dim());
    Zip::from(out.lanes_mut(axis))
        .and(f.lanes(axis))
        .for_each(|mut o, lane| {
            let n = lane.len() as isize;
            for k in 0..n {
                let mut acc = 0.0;
                for (t, &w) in kernel.iter().enumerate() {
                    let src = k + t as isize - radius;
                    if (0..n).contains(&src) {
                        acc += w * lane[src as usize];
                    }
                }
                o[k as usize] = acc;
            }
        });
    out
}
