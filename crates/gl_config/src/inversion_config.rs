// crates/gl_config/src/inversion_config.rs

//! 反演配置
//!
//! 控制变量集合、代价项集合、观测标准差、正则化权重与优化器参数。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// 控制变量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlField {
    /// 冰厚
    Thk,
    /// 综合流动控制场
    Strflowctrl,
    /// 冰面高程
    Usurf,
}

/// 代价项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTerm {
    /// 冰面速度失配
    Velsurf,
    /// 冰厚失配（栅格或剖面）
    Thk,
    /// 冰面高程失配
    Usurf,
    /// `usurf = topg + thk` 硬约束
    Topg,
    /// 通量散度失配（目标为 smb - dhdt）
    Divfluxobs,
    /// 通量散度失配（目标为散度对高程的线性回归）
    Divfluxfcz,
    /// 冰川掩膜外冰厚为零
    Icemask,
}

/// 反演配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionConfig {
    /// 控制变量
    #[serde(default = "default_control")]
    pub control: Vec<ControlField>,

    /// 代价项
    #[serde(default = "default_cost")]
    pub cost: Vec<CostTerm>,

    /// 流动控制场分解阈值
    #[serde(default = "default_thr_strflowctrl")]
    pub thr_strflowctrl: f64,

    /// 以零冰厚初始化
    #[serde(default)]
    pub init_zero_thk: bool,

    /// 冰厚正则化权重
    #[serde(default = "default_regu_param_thk")]
    pub regu_param_thk: f64,

    /// 流动控制场正则化权重
    #[serde(default = "default_regu_param_strflowctrl")]
    pub regu_param_strflowctrl: f64,

    /// 各向异性平滑因子（1 表示各向同性）
    #[serde(default = "default_smooth_anisotropy_factor")]
    pub smooth_anisotropy_factor: f64,

    /// 凸性权重
    #[serde(default = "default_convexity_weight")]
    pub convexity_weight: f64,

    /// 冰面高程观测标准差 [m]
    #[serde(default = "default_usurfobs_std")]
    pub usurfobs_std: f64,

    /// 流动控制场标准差
    #[serde(default = "default_strflowctrl_std")]
    pub strflowctrl_std: f64,

    /// 冰面速度观测标准差 [m/a]
    #[serde(default = "default_velsurfobs_std")]
    pub velsurfobs_std: f64,

    /// 冰厚观测标准差 [m]
    #[serde(default = "default_thkobs_std")]
    pub thkobs_std: f64,

    /// 通量散度标准差 [m/a]
    #[serde(default = "default_divfluxobs_std")]
    pub divfluxobs_std: f64,

    /// 最少迭代次数（提前停止判据生效前）
    #[serde(default = "default_nbitmin")]
    pub nbitmin: usize,

    /// 最大迭代次数
    #[serde(default = "default_nbitmax")]
    pub nbitmax: usize,

    /// Adam 学习率
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// 人工数据空洞：0 关闭, 1..=98 百分比, 100 全部, 200 上半区
    #[serde(default)]
    pub make_holes_in_data: u32,

    /// 诊断输出间隔（迭代数）
    #[serde(default = "default_output_freq")]
    pub output_freq: usize,

    /// 散度回归目标刷新周期（迭代数）
    #[serde(default = "default_divflux_refit_period")]
    pub divflux_refit_period: usize,

    /// 代价平台期提前停止
    #[serde(default)]
    pub early_stop: bool,

    /// 冰厚剖面文件
    #[serde(default)]
    pub thk_profiles_file: Option<PathBuf>,

    /// 写回时低于该值的冰厚置零 [m]
    #[serde(default = "default_thk_zero_threshold")]
    pub thk_zero_threshold: f64,
}

fn default_control() -> Vec<ControlField> {
    vec![ControlField::Thk, ControlField::Strflowctrl, ControlField::Usurf]
}
fn default_cost() -> Vec<CostTerm> {
    vec![
        CostTerm::Velsurf,
        CostTerm::Thk,
        CostTerm::Usurf,
        CostTerm::Divfluxfcz,
        CostTerm::Icemask,
    ]
}
fn default_thr_strflowctrl() -> f64 { 78.0 }
fn default_regu_param_thk() -> f64 { 10.0 }
fn default_regu_param_strflowctrl() -> f64 { 1.0 }
fn default_smooth_anisotropy_factor() -> f64 { 0.2 }
fn default_convexity_weight() -> f64 { 0.002 }
fn default_usurfobs_std() -> f64 { 5.0 }
fn default_strflowctrl_std() -> f64 { 5.0 }
fn default_velsurfobs_std() -> f64 { 3.0 }
fn default_thkobs_std() -> f64 { 5.0 }
fn default_divfluxobs_std() -> f64 { 1.0 }
fn default_nbitmin() -> usize { 50 }
fn default_nbitmax() -> usize { 1000 }
fn default_step_size() -> f64 { 0.001 }
fn default_output_freq() -> usize { 50 }
fn default_divflux_refit_period() -> usize { 10 }
fn default_thk_zero_threshold() -> f64 { 0.01 }

impl Default for InversionConfig {
    fn default() -> Self {
        Self {
            control: default_control(),
            cost: default_cost(),
            thr_strflowctrl: default_thr_strflowctrl(),
            init_zero_thk: false,
            regu_param_thk: default_regu_param_thk(),
            regu_param_strflowctrl: default_regu_param_strflowctrl(),
            smooth_anisotropy_factor: default_smooth_anisotropy_factor(),
            convexity_weight: default_convexity_weight(),
            usurfobs_std: default_usurfobs_std(),
            strflowctrl_std: default_strflowctrl_std(),
            velsurfobs_std: default_velsurfobs_std(),
            thkobs_std: default_thkobs_std(),
            divfluxobs_std: default_divfluxobs_std(),
            nbitmin: default_nbitmin(),
            nbitmax: default_nbitmax(),
            step_size: default_step_size(),
            make_holes_in_data: 0,
            output_freq: default_output_freq(),
            divflux_refit_period: default_divflux_refit_period(),
            early_stop: false,
            thk_profiles_file: None,
            thk_zero_threshold: default_thk_zero_threshold(),
        }
    }
}

impl InversionConfig {
    /// 是否为控制变量
    pub fn has_control(&self, field: ControlField) -> bool {
        self.control.contains(&field)
    }

    /// 是否启用代价项
    pub fn has_cost(&self, term: CostTerm) -> bool {
        self.cost.contains(&term)
    }

    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.is_empty() {
            return Err(ConfigError::invalid("inversion.control", "[]", "至少需要一个控制变量"));
        }
        if self.has_cost(CostTerm::Usurf) != self.has_control(ControlField::Usurf) {
            return Err(ConfigError::Inconsistent(
                "usurf 必须同时出现在 inversion.control 与 inversion.cost 中，或都不出现".into(),
            ));
        }
        if self.has_cost(CostTerm::Divfluxobs) && self.has_cost(CostTerm::Divfluxfcz) {
            return Err(ConfigError::Inconsistent(
                "divfluxobs 与 divfluxfcz 只能选择其一".into(),
            ));
        }

        let stds = [
            ("inversion.usurfobs_std", self.usurfobs_std),
            ("inversion.strflowctrl_std", self.strflowctrl_std),
            ("inversion.velsurfobs_std", self.velsurfobs_std),
            ("inversion.thkobs_std", self.thkobs_std),
            ("inversion.divfluxobs_std", self.divfluxobs_std),
        ];
        for (key, value) in stds {
            if !(value > 0.0) {
                return Err(ConfigError::invalid(key, value, "标准差必须为正"));
            }
        }

        if !(self.step_size > 0.0) {
            return Err(ConfigError::invalid("inversion.step_size", self.step_size, "学习率必须为正"));
        }
        if self.nbitmax == 0 {
            return Err(ConfigError::invalid("inversion.nbitmax", 0, "最大迭代次数必须为正"));
        }
        if self.output_freq == 0 {
            return Err(ConfigError::invalid("inversion.output_freq", 0, "输出间隔必须为正"));
        }
        if self.divflux_refit_period == 0 {
            return Err(ConfigError::invalid(
                "inversion.divflux_refit_period",
                0,
                "回归刷新周期必须为正",
            ));
        }
        if self.smooth_anisotropy_factor < 0.0 {
            return Err(ConfigError::invalid(
                "inversion.smooth_anisotropy_factor",
                self.smooth_anisotropy_factor,
                "各向异性因子不能为负",
            ));
        }
        match self.make_holes_in_data {
            0..=98 | 100 | 200 => {}
            other => {
                return Err(ConfigError::invalid(
                    "inversion.make_holes_in_data",
                    other,
                    "仅支持 0..=98, 100, 200",
                ))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = InversionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.has_control(ControlField::Usurf));
        assert!(config.has_cost(CostTerm::Divfluxfcz));
        assert_eq!(config.nbitmax, 1000);
    }

    #[test]
    fn test_usurf_pairing() {
        let mut config = InversionConfig::default();
        config.cost.retain(|c| *c != CostTerm::Usurf);
        assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))));

        config.control.retain(|c| *c != ControlField::Usurf);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_holes_values() {
        let mut config = InversionConfig::default();
        config.make_holes_in_data = 200;
        assert!(config.validate().is_ok());
        config.make_holes_in_data = 99;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_names_serialize_lowercase() {
        let json = serde_json::to_string(&vec![CostTerm::Divfluxfcz, CostTerm::Velsurf]).unwrap();
        assert_eq!(json, r#"["divfluxfcz","velsurf"]"#);
    }
}
