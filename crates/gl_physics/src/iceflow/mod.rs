// crates/gl_physics/src/iceflow/mod.rs

//! 冰流模型接口
//!
//! 速度模型（训练好的代理模型、手写伴随或带解析 Jacobian 的经典求解器）
//! 只通过 [`DifferentiableFieldMap`] 能力接口被消费：
//!
//! - 输入/输出字段名有序列表（即张量通道顺序），加载时固定
//! - 每个字段的物理尺度（无量纲化）
//! - `forward` 与 `backward`（向量-Jacobian 积）
//!
//! 张量布局为通道优先 `(c, ny, nx)`，数值均为无量纲值。
//!
//! # 支持的签名
//!
//! | 签名 | 输入 |
//! |------|------|
//! | [`ModelSignature::SplitFlowLaw`] | thk, slopsurfx, slopsurfy, arrhenius, slidingco |
//! | [`ModelSignature::CombinedFlowControl`] | thk, slopsurfx, slopsurfy, strflowctrl |
//!
//! 输出至少包含 ubar, vbar, uvelsurf, vvelsurf。

pub mod emulator;
pub mod velocity;

use ndarray::Array3;

use gl_foundation::{FieldBounds, FieldName, GlError, GlResult};

pub use emulator::ShallowIceEmulator;
pub use velocity::VelocityModel;

/// 可微字段映射能力
pub trait DifferentiableFieldMap: Send + Sync {
    /// 模型名称
    fn name(&self) -> &str;

    /// 有序输入字段
    fn input_fields(&self) -> &[FieldName];

    /// 有序输出字段
    fn output_fields(&self) -> &[FieldName];

    /// 输入输出字段的物理尺度
    fn bounds(&self) -> &FieldBounds;

    /// 空间维度需对齐的块大小（`None` 表示无要求）
    fn block_size(&self) -> Option<usize> {
        None
    }

    /// 前向：`(c_in, ny, nx) -> (c_out, ny, nx)`
    fn forward(&self, inputs: &Array3<f32>) -> GlResult<Array3<f32>>;

    /// 反向：在 `inputs` 处由 `∂L/∂outputs` 求 `∂L/∂inputs`
    fn backward(&self, inputs: &Array3<f32>, output_grad: &Array3<f32>) -> GlResult<Array3<f32>>;
}

/// 速度模型输入签名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSignature {
    /// 流动律系数与滑动系数分开输入
    SplitFlowLaw,
    /// 综合流动控制场输入
    CombinedFlowControl,
}

/// 必需的输出字段
pub const REQUIRED_OUTPUTS: [FieldName; 4] = [
    FieldName::Ubar,
    FieldName::Vbar,
    FieldName::Uvelsurf,
    FieldName::Vvelsurf,
];

impl ModelSignature {
    /// 该签名的有序输入字段
    pub fn inputs(&self) -> &'static [FieldName] {
        match self {
            ModelSignature::SplitFlowLaw => &[
                FieldName::Thk,
                FieldName::Slopsurfx,
                FieldName::Slopsurfy,
                FieldName::Arrhenius,
                FieldName::Slidingco,
            ],
            ModelSignature::CombinedFlowControl => &[
                FieldName::Thk,
                FieldName::Slopsurfx,
                FieldName::Slopsurfy,
                FieldName::Strflowctrl,
            ],
        }
    }

    /// 校验模型声明的输入输出，返回匹配的签名
    pub fn detect(inputs: &[FieldName], outputs: &[FieldName]) -> GlResult<Self> {
        let signature = [ModelSignature::SplitFlowLaw, ModelSignature::CombinedFlowControl]
            .into_iter()
            .find(|s| s.inputs() == inputs);

        match signature {
            Some(s) if REQUIRED_OUTPUTS.iter().all(|f| outputs.contains(f)) => Ok(s),
            _ => Err(GlError::unsupported_model(inputs, outputs)),
        }
    }
}

/// 分解时剩余部分的缩放
pub const REMAINDER_DIVISOR: f64 = 10.0;

/// 把综合流动控制值分解为 `(arrhenius, slidingco)`
///
/// `A = min(sf, thr)`，`C = max(sf - thr, 0) / 10`
#[inline]
pub fn decompose_flow_control(sf: f64, thr: f64) -> (f64, f64) {
    (sf.min(thr), (sf - thr).max(0.0) / REMAINDER_DIVISOR)
}

/// 输出字段在通道中的索引
pub fn channel_of(fields: &[FieldName], name: FieldName) -> GlResult<usize> {
    fields
        .iter()
        .position(|&f| f == name)
        .ok_or_else(|| GlError::missing_field(name.as_str()))
}
