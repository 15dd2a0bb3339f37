// crates/gl_physics/src/iceflow/emulator.rs

//! 浅冰近似解析代理模型
//!
//! 逐点浅冰近似（SIA）速度映射，Jacobian 解析给出，可同时满足两种输入签名。
//!
//! # 速度公式
//!
//! 记 $G = s_x^2 + s_y^2$，$C' = 1000\,C$，$h \ge 0$：
//!
//! $$ W = (\rho g)^3 \left(a A h^4 + b C' h^3\right), \quad K = W G $$
//! $$ u = -K s_x, \quad v = -K s_y $$
//!
//! | 输出 | a | b |
//! |------|---|---|
//! | ubar, vbar | 0.4 | 1 |
//! | uvelsurf, vvelsurf | 0.5 | 1 |
//! | uvelbase, vvelbase | 0 | 1 |
//!
//! 综合流动控制签名下按阈值分解：
//! `A = min(sf, thr)`，`C = max(sf - thr, 0) / 10`。
//!
//! 内部以 f64 计算，输入输出均为无量纲值。

use ndarray::{Array3, ArrayView1, ArrayViewMut1, Axis, Zip};

use gl_foundation::{FieldBounds, FieldName, GlError, GlResult};

use super::{decompose_flow_control, DifferentiableFieldMap, ModelSignature, REMAINDER_DIVISOR};

/// 冰密度乘重力加速度 [MPa/m]
const RHO_G: f64 = 8.927e-3;
/// 滑动系数换算
const SLIDING_FACTOR: f64 = 1000.0;
/// 综合流动控制场默认分解阈值
pub const DEFAULT_THRESHOLD: f64 = 78.0;

/// 输出顺序
const OUTPUTS: [FieldName; 6] = [
    FieldName::Ubar,
    FieldName::Vbar,
    FieldName::Uvelsurf,
    FieldName::Vvelsurf,
    FieldName::Uvelbase,
    FieldName::Vvelbase,
];

/// 每对输出的 (a, b) 系数，与 [`OUTPUTS`] 成对对应
const PAIR_COEFFS: [(f64, f64); 3] = [(0.4, 1.0), (0.5, 1.0), (0.0, 1.0)];

/// 默认物理尺度
fn default_bounds() -> FieldBounds {
    let mut bounds = FieldBounds::new()
        .with(FieldName::Thk, 1000.0)
        .with(FieldName::Slopsurfx, 1.0)
        .with(FieldName::Slopsurfy, 1.0)
        .with(FieldName::Arrhenius, 200.0)
        .with(FieldName::Slidingco, 100.0)
        .with(FieldName::Strflowctrl, 200.0);
    for name in OUTPUTS {
        bounds.set(name, 1000.0);
    }
    bounds
}

/// 单点物理量
#[derive(Debug, Clone, Copy)]
struct Point {
    h: f64,
    sx: f64,
    sy: f64,
    a: f64,
    c: f64,
}

/// 浅冰近似代理模型
#[derive(Debug, Clone)]
pub struct ShallowIceEmulator {
    signature: ModelSignature,
    inputs: Vec<FieldName>,
    outputs: Vec<FieldName>,
    bounds: FieldBounds,
    in_scales: Vec<f64>,
    out_scales: Vec<f64>,
    threshold: f64,
    block_size: Option<usize>,
}

impl ShallowIceEmulator {
    /// 分开输入流动律与滑动系数
    pub fn split() -> Self {
        Self::build(ModelSignature::SplitFlowLaw, default_bounds(), DEFAULT_THRESHOLD)
    }

    /// 输入综合流动控制场，按 `threshold` 分解
    pub fn combined(threshold: f64) -> Self {
        Self::build(ModelSignature::CombinedFlowControl, default_bounds(), threshold)
    }

    /// 替换物理尺度，所有输入输出字段都必须给出尺度
    pub fn with_bounds(self, bounds: FieldBounds) -> GlResult<Self> {
        for &f in self.inputs.iter().chain(self.outputs.iter()) {
            bounds.scale(f)?;
        }
        let mut model = Self::build(self.signature, bounds, self.threshold);
        model.block_size = self.block_size;
        Ok(model)
    }

    /// 声明块大小要求
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = (block_size > 0).then_some(block_size);
        self
    }

    fn build(signature: ModelSignature, bounds: FieldBounds, threshold: f64) -> Self {
        let inputs = signature.inputs().to_vec();
        let outputs = OUTPUTS.to_vec();
        let scales = |fields: &[FieldName]| -> Vec<f64> {
            fields
                .iter()
                .map(|&f| bounds.get(f).map_or(1.0, f64::from))
                .collect()
        };
        let in_scales = scales(&inputs);
        let out_scales = scales(&outputs);
        Self {
            signature,
            inputs,
            outputs,
            bounds,
            in_scales,
            out_scales,
            threshold,
            block_size: None,
        }
    }

    /// 分解阈值
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 解码一个像素的无量纲输入，同时返回 `sf <= thr` 分支标志
    fn decode(&self, x: ArrayView1<f32>) -> (Point, bool) {
        let s = &self.in_scales;
        let h = (x[0] as f64 * s[0]).max(0.0);
        let sx = x[1] as f64 * s[1];
        let sy = x[2] as f64 * s[2];
        match self.signature {
            ModelSignature::SplitFlowLaw => {
                let a = x[3] as f64 * s[3];
                let c = x[4] as f64 * s[4];
                (Point { h, sx, sy, a, c }, true)
            }
            ModelSignature::CombinedFlowControl => {
                let sf = x[3] as f64 * s[3];
                let (a, c) = decompose_flow_control(sf, self.threshold);
                (Point { h, sx, sy, a, c }, sf <= self.threshold)
            }
        }
    }

    fn forward_point(&self, x: ArrayView1<f32>, mut y: ArrayViewMut1<f32>) {
        let (p, _) = self.decode(x);
        let rg3 = RHO_G.powi(3);
        let g = p.sx * p.sx + p.sy * p.sy;
        let cp = SLIDING_FACTOR * p.c;

        for (k, &(ca, cb)) in PAIR_COEFFS.iter().enumerate() {
            let w = rg3 * (ca * p.a * p.h.powi(4) + cb * cp * p.h.powi(3));
            let kk = w * g;
            y[2 * k] = (-kk * p.sx / self.out_scales[2 * k]) as f32;
            y[2 * k + 1] = (-kk * p.sy / self.out_scales[2 * k + 1]) as f32;
        }
    }

    fn backward_point(&self, x: ArrayView1<f32>, gy: ArrayView1<f32>, mut gx: ArrayViewMut1<f32>) {
        let (p, below) = self.decode(x);
        let rg3 = RHO_G.powi(3);
        let g = p.sx * p.sx + p.sy * p.sy;
        let cp = SLIDING_FACTOR * p.c;
        let (h2, h3) = (p.h * p.h, p.h.powi(3));
        let h4 = h3 * p.h;

        let (mut gh, mut gsx, mut gsy, mut ga, mut gc) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (k, &(ca, cb)) in PAIR_COEFFS.iter().enumerate() {
            let gu = gy[2 * k] as f64 / self.out_scales[2 * k];
            let gv = gy[2 * k + 1] as f64 / self.out_scales[2 * k + 1];
            if gu == 0.0 && gv == 0.0 {
                continue;
            }

            let w = rg3 * (ca * p.a * h4 + cb * cp * h3);
            let kk = w * g;
            // ∂L/∂K
            let gk = -(gu * p.sx + gv * p.sy);

            let dk_dh = if p.h > 0.0 {
                rg3 * g * (4.0 * ca * p.a * h3 + 3.0 * cb * cp * h2)
            } else {
                0.0
            };
            gh += gk * dk_dh;
            ga += gk * ca * rg3 * g * h4;
            gc += gk * SLIDING_FACTOR * cb * rg3 * g * h3;

            gsx += -gu * (kk + 2.0 * w * p.sx * p.sx) - gv * 2.0 * w * p.sx * p.sy;
            gsy += -gu * 2.0 * w * p.sx * p.sy - gv * (kk + 2.0 * w * p.sy * p.sy);
        }

        let s = &self.in_scales;
        gx[0] = (gh * s[0]) as f32;
        gx[1] = (gsx * s[1]) as f32;
        gx[2] = (gsy * s[2]) as f32;
        match self.signature {
            ModelSignature::SplitFlowLaw => {
                gx[3] = (ga * s[3]) as f32;
                gx[4] = (gc * s[4]) as f32;
            }
            ModelSignature::CombinedFlowControl => {
                let gsf = if below { ga } else { gc / REMAINDER_DIVISOR };
                gx[3] = (gsf * s[3]) as f32;
            }
        }
    }

    fn check_channels(&self, name: &str, tensor: &Array3<f32>, expected: usize) -> GlResult<()> {
        let channels = tensor.len_of(Axis(0));
        if channels != expected {
            return Err(GlError::invalid_input(format!(
                "{} 通道数 {} 与模型声明 {} 不符",
                name, channels, expected
            )));
        }
        Ok(())
    }
}

impl DifferentiableFieldMap for ShallowIceEmulator {
    fn name(&self) -> &str {
        match self.signature {
            ModelSignature::SplitFlowLaw => "sia-split",
            ModelSignature::CombinedFlowControl => "sia-combined",
        }
    }

    fn input_fields(&self) -> &[FieldName] {
        &self.inputs
    }

    fn output_fields(&self) -> &[FieldName] {
        &self.outputs
    }

    fn bounds(&self) -> &FieldBounds {
        &self.bounds
    }

    fn block_size(&self) -> Option<usize> {
        self.block_size
    }

    fn forward(&self, inputs: &Array3<f32>) -> GlResult<Array3<f32>> {
        self.check_channels("输入", inputs, self.inputs.len())?;
        let (_, ny, nx) = inputs.dim();
        let mut outputs = Array3::<f32>::zeros((self.outputs.len(), ny, nx));

        Zip::from(outputs.lanes_mut(Axis(0)))
            .and(inputs.lanes(Axis(0)))
            .par_for_each(|y, x| self.forward_point(x, y));

        Ok(outputs)
    }

    fn backward(&self, inputs: &Array3<f32>, output_grad: &Array3<f32>) -> GlResult<Array3<f32>> {
        self.check_channels("输入", inputs, self.inputs.len())?;
        self.check_channels("输出梯度", output_grad, self.outputs.len())?;
        let (_, ny, nx) = inputs.dim();
        if output_grad.dim().1 != ny || output_grad.dim().2 != nx {
            return Err(GlError::size_mismatch(
                "output_grad",
                (ny, nx),
                (output_grad.dim().1, output_grad.dim().2),
            ));
        }

        let mut grad = Array3::<f32>::zeros(inputs.raw_dim());
        Zip::from(grad.lanes_mut(Axis(0)))
            .and(inputs.lanes(Axis(0)))
            .and(output_grad.lanes(Axis(0)))
            .par_for_each(|gx, x, gy| self.backward_point(x, gy, gx));

        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_inputs(model: &ShallowIceEmulator, rng: &mut StdRng) -> Array3<f32> {
        let c = model.input_fields().len();
        let mut x = Array3::<f32>::zeros((c, 3, 4));
        for mut lane in x.lanes_mut(Axis(0)) {
            lane[0] = rng.gen_range(0.05..0.4);
            lane[1] = rng.gen_range(-0.2..0.2);
            lane[2] = rng.gen_range(-0.2..0.2);
            lane[3] = rng.gen_range(0.2..0.6);
            if c == 5 {
                lane[4] = rng.gen_range(0.0..0.2);
            }
        }
        x
    }

    /// `<g, f(x)>` 在 f64 下的值，用于有限差分
    fn weighted_output(model: &ShallowIceEmulator, x: &Array3<f32>, g: &Array3<f32>) -> f64 {
        let y = model.forward(x).unwrap();
        y.iter().zip(g.iter()).map(|(&a, &b)| a as f64 * b as f64).sum()
    }

    fn check_jacobian(model: ShallowIceEmulator) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut x = random_inputs(&model, &mut rng);
        // 被检查的像素取远离分解阈值与零坡度的值
        let (i, j) = (1, 2);
        x[[0, i, j]] = 0.25;
        x[[1, i, j]] = 0.12;
        x[[2, i, j]] = -0.08;
        x[[3, i, j]] = 0.45;
        if x.len_of(Axis(0)) == 5 {
            x[[4, i, j]] = 0.1;
        }
        let mut g = Array3::<f32>::zeros((6, 3, 4));
        g.mapv_inplace(|_| rng.gen_range(-1.0..1.0));

        let grad = model.backward(&x, &g).unwrap();

        let eps = 1e-3f32;
        for c in 0..x.len_of(Axis(0)) {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[[c, i, j]] += eps;
            xm[[c, i, j]] -= eps;
            let fd = (weighted_output(&model, &xp, &g) - weighted_output(&model, &xm, &g))
                / (2.0 * eps as f64);
            let an = grad[[c, i, j]] as f64;
            let tol = 2e-2 * fd.abs().max(1e-3);
            assert!(
                (fd - an).abs() < tol,
                "通道 {c}: 有限差分 {fd} vs 解析 {an}"
            );
        }
    }

    #[test]
    fn test_jacobian_split() {
        check_jacobian(ShallowIceEmulator::split());
    }

    #[test]
    fn test_jacobian_combined() {
        check_jacobian(ShallowIceEmulator::combined(DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_flow_is_downslope_and_surface_fastest() {
        let model = ShallowIceEmulator::split();
        let mut x = Array3::<f32>::zeros((5, 1, 1));
        x[[0, 0, 0]] = 0.2; // 200 m
        x[[1, 0, 0]] = 0.1; // 向 +x 上坡
        x[[3, 0, 0]] = 0.39; // A = 78
        x[[4, 0, 0]] = 0.01; // C = 1

        let y = model.forward(&x).unwrap();
        let (ubar, usurf, ubase) = (y[[0, 0, 0]], y[[2, 0, 0]], y[[4, 0, 0]]);
        assert!(ubar < 0.0 && usurf < 0.0 && ubase < 0.0);
        assert!(usurf.abs() > ubar.abs());
        assert!(ubar.abs() > ubase.abs());
        assert_eq!(y[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_no_ice_no_velocity() {
        let model = ShallowIceEmulator::combined(78.0);
        let mut x = Array3::<f32>::zeros((4, 2, 2));
        x.index_axis_mut(Axis(0), 1).fill(0.3);
        x.index_axis_mut(Axis(0), 3).fill(0.5);
        let y = model.forward(&x).unwrap();
        assert!(y.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_combined_decomposition() {
        let model = ShallowIceEmulator::combined(78.0);
        let mut x = Array3::<f32>::zeros((4, 1, 1));
        x[[3, 0, 0]] = 0.59; // sf = 118
        let (p, below) = model.decode(x.slice(ndarray::s![.., 0, 0]));
        assert!(!below);
        assert!((p.a - 78.0).abs() < 1e-3);
        assert!((p.c - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let model = ShallowIceEmulator::split();
        let x = Array3::<f32>::zeros((4, 2, 2));
        assert!(model.forward(&x).is_err());
    }
}
