// crates/gl_foundation/src/field.rs

//! 字段注册表
//!
//! 用强类型的 [`FieldName`] 枚举取代按字符串查找字段。
//! 缺测值统一用 `NaN` 表示，读入时大于 [`MISSING_THRESHOLD`] 的值视为缺测。

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{GlError, GlResult};

/// 二维单精度字段，布局 `(ny, nx)`
pub type Field = Array2<f32>;

/// 大于该值的输入视为缺测（NetCDF 填充值约定）
pub const MISSING_THRESHOLD: f32 = 1e35;

/// 模型字段名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldName {
    /// 冰厚 [m]
    Thk,
    /// 冰面高程 [m]
    Usurf,
    /// 基岩高程 [m]
    Topg,
    /// 冰面坡度 x 分量
    Slopsurfx,
    /// 冰面坡度 y 分量
    Slopsurfy,
    /// 垂向平均速度 x 分量 [m/a]
    Ubar,
    /// 垂向平均速度 y 分量 [m/a]
    Vbar,
    /// 冰面速度 x 分量 [m/a]
    Uvelsurf,
    /// 冰面速度 y 分量 [m/a]
    Vvelsurf,
    /// 冰底速度 x 分量 [m/a]
    Uvelbase,
    /// 冰底速度 y 分量 [m/a]
    Vvelbase,
    /// 表面物质平衡 [m/a 冰当量]
    Smb,
    /// 综合流动控制场
    Strflowctrl,
    /// 流动律系数
    Arrhenius,
    /// 滑动系数
    Slidingco,
    /// 冰川掩膜
    Icemask,
    /// 通量散度 [m/a]
    Divflux,
    /// 冰厚变化率 [m/a]
    Dhdt,
    /// 基岩侵蚀速率 [m/a]
    Dtopgdt,
}

impl FieldName {
    /// 全部字段
    pub const ALL: [FieldName; 19] = [
        FieldName::Thk,
        FieldName::Usurf,
        FieldName::Topg,
        FieldName::Slopsurfx,
        FieldName::Slopsurfy,
        FieldName::Ubar,
        FieldName::Vbar,
        FieldName::Uvelsurf,
        FieldName::Vvelsurf,
        FieldName::Uvelbase,
        FieldName::Vvelbase,
        FieldName::Smb,
        FieldName::Strflowctrl,
        FieldName::Arrhenius,
        FieldName::Slidingco,
        FieldName::Icemask,
        FieldName::Divflux,
        FieldName::Dhdt,
        FieldName::Dtopgdt,
    ];

    /// 字段名字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Thk => "thk",
            FieldName::Usurf => "usurf",
            FieldName::Topg => "topg",
            FieldName::Slopsurfx => "slopsurfx",
            FieldName::Slopsurfy => "slopsurfy",
            FieldName::Ubar => "ubar",
            FieldName::Vbar => "vbar",
            FieldName::Uvelsurf => "uvelsurf",
            FieldName::Vvelsurf => "vvelsurf",
            FieldName::Uvelbase => "uvelbase",
            FieldName::Vvelbase => "vvelbase",
            FieldName::Smb => "smb",
            FieldName::Strflowctrl => "strflowctrl",
            FieldName::Arrhenius => "arrhenius",
            FieldName::Slidingco => "slidingco",
            FieldName::Icemask => "icemask",
            FieldName::Divflux => "divflux",
            FieldName::Dhdt => "dhdt",
            FieldName::Dtopgdt => "dtopgdt",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = GlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| GlError::invalid_input(format!("未知字段名: {s}")))
    }
}

/// 字段物理尺度表（用于速度模型输入输出的无量纲化）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    scales: BTreeMap<FieldName, f32>,
}

impl FieldBounds {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置尺度
    pub fn with(mut self, name: FieldName, scale: f32) -> Self {
        self.scales.insert(name, scale);
        self
    }

    /// 设置尺度
    pub fn set(&mut self, name: FieldName, scale: f32) {
        self.scales.insert(name, scale);
    }

    /// 查询尺度
    pub fn get(&self, name: FieldName) -> Option<f32> {
        self.scales.get(&name).copied()
    }

    /// 查询尺度，缺失或非正时报错
    pub fn scale(&self, name: FieldName) -> GlResult<f32> {
        match self.scales.get(&name) {
            Some(&s) if s > 0.0 && s.is_finite() => Ok(s),
            Some(&s) => Err(GlError::invalid_config(
                format!("bounds.{name}"),
                s.to_string(),
                "尺度必须为正",
            )),
            None => Err(GlError::missing_field(format!("bounds.{name}"))),
        }
    }

    /// 是否包含字段
    pub fn contains(&self, name: FieldName) -> bool {
        self.scales.contains_key(&name)
    }

    /// 迭代 (字段, 尺度)
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, f32)> + '_ {
        self.scales.iter().map(|(k, v)| (*k, *v))
    }
}

/// 将填充值（> 1e35）替换为 NaN
pub fn sanitize_missing(field: &mut Field) {
    field.mapv_inplace(|v| if v > MISSING_THRESHOLD { f32::NAN } else { v });
}

/// 字段是否全部缺测
pub fn all_missing(field: &Field) -> bool {
    field.iter().all(|v| v.is_nan())
}

/// 字段体积和（忽略 NaN）
pub fn nansum(field: &Field) -> f64 {
    field
        .iter()
        .filter(|v| !v.is_nan())
        .map(|&v| v as f64)
        .sum()
}
