// crates/gl_physics/src/iceflow/velocity.rs

//! 速度模型包装
//!
//! 负责把 [`SimulationState`] 中的物理字段组装为无量纲多通道张量、
//! 按块大小补零、调用模型、裁剪回原尺寸、反无量纲化并写回状态。
//!
//! 写回时：
//! - `thk <= 0` 的单元速度置零
//! - 配置了 `force_max_velbar` 时，`(ubar, vbar)` 模超限的单元按比例缩回上限，方向不变

use ndarray::{s, Array3, Axis, Zip};

use gl_config::IceflowConfig;
use gl_foundation::{Field, FieldName, GlResult};

use super::{channel_of, DifferentiableFieldMap, ModelSignature};
use crate::state::SimulationState;

/// 速度模型
pub struct VelocityModel {
    model: Box<dyn DifferentiableFieldMap>,
    signature: ModelSignature,
    block_size: Option<usize>,
    force_max_velbar: f32,
}

impl std::fmt::Debug for VelocityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelocityModel")
            .field("model", &self.model.name())
            .field("signature", &self.signature)
            .field("block_size", &self.block_size)
            .field("force_max_velbar", &self.force_max_velbar)
            .finish()
    }
}

impl VelocityModel {
    /// 包装模型并校验签名与尺度
    ///
    /// # 错误
    ///
    /// - 输入输出字段不属于支持的签名：`GlError::UnsupportedModel`
    /// - 某个输入输出字段缺少物理尺度
    pub fn new(model: Box<dyn DifferentiableFieldMap>, config: &IceflowConfig) -> GlResult<Self> {
        let signature = ModelSignature::detect(model.input_fields(), model.output_fields())?;
        for &f in model.input_fields().iter().chain(model.output_fields()) {
            model.bounds().scale(f)?;
        }

        let block_size = if config.multiple_window_size > 0 {
            Some(config.multiple_window_size)
        } else {
            model.block_size()
        };

        log::info!(
            "速度模型 {}: 签名 {:?}, 块大小 {:?}",
            model.name(),
            signature,
            block_size
        );

        Ok(Self {
            model,
            signature,
            block_size,
            force_max_velbar: config.force_max_velbar as f32,
        })
    }

    /// 输入签名
    pub fn signature(&self) -> ModelSignature {
        self.signature
    }

    /// 被包装的模型
    pub fn model(&self) -> &dyn DifferentiableFieldMap {
        self.model.as_ref()
    }

    /// 有序输入字段
    pub fn input_fields(&self) -> &[FieldName] {
        self.model.input_fields()
    }

    /// 有序输出字段
    pub fn output_fields(&self) -> &[FieldName] {
        self.model.output_fields()
    }

    /// 字段物理尺度
    pub fn scale(&self, name: FieldName) -> GlResult<f32> {
        self.model.bounds().scale(name)
    }

    /// 生效的块大小
    pub fn block_size(&self) -> Option<usize> {
        self.block_size
    }

    /// 补零后的空间尺寸
    pub fn padded_shape(&self, ny: usize, nx: usize) -> (usize, usize) {
        match self.block_size {
            Some(b) => (ny.div_ceil(b) * b, nx.div_ceil(b) * b),
            None => (ny, nx),
        }
    }

    /// 在末端补零到块大小的整数倍
    pub fn pad(&self, x: &Array3<f32>) -> Array3<f32> {
        let (c, ny, nx) = x.dim();
        let (py, px) = self.padded_shape(ny, nx);
        if (py, px) == (ny, nx) {
            return x.clone();
        }
        let mut padded = Array3::<f32>::zeros((c, py, px));
        padded.slice_mut(s![.., ..ny, ..nx]).assign(x);
        padded
    }

    /// 裁剪回原尺寸
    pub fn crop(&self, y: &Array3<f32>, ny: usize, nx: usize) -> Array3<f32> {
        y.slice(s![.., ..ny, ..nx]).to_owned()
    }

    /// 由状态组装无量纲输入张量（未补零）
    pub fn assemble_inputs(&self, state: &SimulationState) -> GlResult<Array3<f32>> {
        let fields = self.input_fields();
        let (ny, nx) = state.grid.shape();
        let mut x = Array3::<f32>::zeros((fields.len(), ny, nx));
        for (k, &name) in fields.iter().enumerate() {
            let scale = self.scale(name)?;
            Zip::from(x.index_axis_mut(Axis(0), k))
                .and(state.field(name))
                .for_each(|o, &v| *o = v / scale);
        }
        Ok(x)
    }

    /// 补零、前向、裁剪
    pub fn forward_padded(&self, inputs: &Array3<f32>) -> GlResult<Array3<f32>> {
        let (_, ny, nx) = inputs.dim();
        let y = self.model.forward(&self.pad(inputs))?;
        Ok(self.crop(&y, ny, nx))
    }

    /// 补零、反向、裁剪
    pub fn backward_padded(
        &self,
        inputs: &Array3<f32>,
        output_grad: &Array3<f32>,
    ) -> GlResult<Array3<f32>> {
        let (_, ny, nx) = inputs.dim();
        let g = self
            .model
            .backward(&self.pad(inputs), &self.pad(output_grad))?;
        Ok(self.crop(&g, ny, nx))
    }

    /// 输出张量中某字段的物理值
    pub fn output_field(&self, outputs: &Array3<f32>, name: FieldName) -> GlResult<Field> {
        let k = channel_of(self.output_fields(), name)?;
        let scale = self.scale(name)?;
        Ok(outputs.index_axis(Axis(0), k).mapv(|v| v * scale))
    }

    /// 用当前状态更新全部输出字段
    pub fn update(&self, state: &mut SimulationState) -> GlResult<()> {
        let x = self.assemble_inputs(state)?;
        let y = self.forward_padded(&x)?;

        for &name in self.output_fields() {
            let mut field = self.output_field(&y, name)?;
            field.zip_mut_with(&state.thk, |v, &h| {
                if h <= 0.0 {
                    *v = 0.0;
                }
            });
            *state.field_mut(name) = field;
        }

        if self.force_max_velbar > 0.0 {
            cap_magnitude(&mut state.ubar, &mut state.vbar, self.force_max_velbar);
        }

        log::trace!(
            "速度更新: 最大 |ubar| = {:.3}",
            state.ubar.iter().fold(0.0f32, |m, v| m.max(v.abs()))
        );
        Ok(())
    }
}

/// 模超过 `max` 的向量缩回到 `max`
pub fn cap_magnitude(u: &mut Field, v: &mut Field, max: f32) {
    Zip::from(u).and(v).for_each(|u, v| {
        let norm = (*u * *u + *v * *v).sqrt();
        if norm > max {
            let r = max / norm;
            *u *= r;
            *v *= r;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iceflow::ShallowIceEmulator;
    use crate::inputs::InputFields;
    use gl_config::InitConfig;
    use gl_foundation::{FieldBounds, GlError, Grid};

    fn sloped_state(nx: usize, ny: usize) -> SimulationState {
        let grid = Grid::regular(nx, ny, 100.0, 0.0, 0.0).unwrap();
        let (xx, _) = grid.mesh();
        let usurf = xx.mapv(|x| 3000.0 - 0.1 * x);
        let inputs = InputFields::new()
            .with("usurf", usurf)
            .with("thk", grid.constant(200.0));
        SimulationState::initialize(grid, &inputs, &InitConfig::default()).unwrap()
    }

    /// 声明了非法输入签名的模型
    struct BadModel {
        inputs: Vec<FieldName>,
        outputs: Vec<FieldName>,
        bounds: FieldBounds,
    }

    impl DifferentiableFieldMap for BadModel {
        fn name(&self) -> &str {
            "bad"
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
        fn forward(&self, inputs: &Array3<f32>) -> GlResult<Array3<f32>> {
            Ok(inputs.clone())
        }
        fn backward(&self, _: &Array3<f32>, g: &Array3<f32>) -> GlResult<Array3<f32>> {
            Ok(g.clone())
        }
    }

    #[test]
    fn test_unsupported_signature_is_rejected() {
        let model = BadModel {
            inputs: vec![FieldName::Thk, FieldName::Usurf],
            outputs: vec![FieldName::Ubar, FieldName::Vbar],
            bounds: FieldBounds::new(),
        };
        let err = VelocityModel::new(Box::new(model), &IceflowConfig::default()).unwrap_err();
        assert!(matches!(err, GlError::UnsupportedModel { .. }));
    }

    #[test]
    fn test_update_flows_downslope_and_masks_no_ice() {
        let mut state = sloped_state(6, 5);
        state.thk[[2, 3]] = 0.0;
        state.rebuild_surface();

        let vm = VelocityModel::new(
            Box::new(ShallowIceEmulator::combined(78.0)),
            &IceflowConfig::default(),
        )
        .unwrap();
        vm.update(&mut state).unwrap();

        assert!(state.ubar[[0, 0]] > 0.0);
        assert_eq!(state.ubar[[2, 3]], 0.0);
        assert_eq!(state.uvelsurf[[2, 3]], 0.0);
        assert!(state.uvelsurf[[0, 0]] > state.ubar[[0, 0]]);
    }

    #[test]
    fn test_padding_matches_unpadded() {
        let state = sloped_state(7, 5);
        let plain = VelocityModel::new(
            Box::new(ShallowIceEmulator::split()),
            &IceflowConfig::default(),
        )
        .unwrap();
        let config = IceflowConfig {
            multiple_window_size: 4,
            ..IceflowConfig::default()
        };
        let padded = VelocityModel::new(Box::new(ShallowIceEmulator::split()), &config).unwrap();
        assert_eq!(padded.padded_shape(5, 7), (8, 8));

        let x = plain.assemble_inputs(&state).unwrap();
        let a = plain.forward_padded(&x).unwrap();
        let b = padded.forward_padded(&x).unwrap();
        assert_eq!(a.dim(), b.dim());
        assert!(a.iter().zip(b.iter()).all(|(p, q)| (p - q).abs() < 1e-6));

        let g = Array3::<f32>::ones(a.raw_dim());
        let ga = plain.backward_padded(&x, &g).unwrap();
        let gb = padded.backward_padded(&x, &g).unwrap();
        assert_eq!(ga.dim(), x.dim());
        assert!(ga.iter().zip(gb.iter()).all(|(p, q)| (p - q).abs() < 1e-4));
    }

    #[test]
    fn test_velocity_cap_keeps_direction() {
        let mut u = Field::from_elem((1, 2), 30.0);
        let mut v = Field::from_elem((1, 2), 40.0);
        v[[0, 1]] = 0.0;
        cap_magnitude(&mut u, &mut v, 10.0);
        assert!((u[[0, 0]] - 6.0).abs() < 1e-5);
        assert!((v[[0, 0]] - 8.0).abs() < 1e-5);
        assert!((u[[0, 1]] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_update_applies_cap() {
        let mut state = sloped_state(4, 4);
        let config = IceflowConfig {
            force_max_velbar: 1.0,
            ..IceflowConfig::default()
        };
        let vm = VelocityModel::new(Box::new(ShallowIceEmulator::combined(78.0)), &config).unwrap();
        vm.update(&mut state).unwrap();
        let max = crate::operators::magnitude(state.ubar.view(), state.vbar.view())
            .iter()
            .fold(0.0f32, |m, &x| m.max(x));
        assert!(max <= 1.0 + 1e-5);
    }
}
