// crates/gl_config/src/model_config.rs

//! ModelConfig - 正演模型配置
//!
//! 定义时间推进、冰流模型、场初始化、物质平衡、侵蚀与输出的全部参数。
//! 所有数值使用 f64 存储以便 JSON 序列化，构建模型时再转换为 f32 场运算。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::inversion_config::InversionConfig;

/// 模型总配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 时间推进
    #[serde(default)]
    pub time: TimeConfig,

    /// 冰流模型
    #[serde(default)]
    pub iceflow: IceflowConfig,

    /// 场初始化缺省值
    #[serde(default)]
    pub init: InitConfig,

    /// 表面物质平衡
    #[serde(default)]
    pub smb: SmbConfig,

    /// 基岩侵蚀
    #[serde(default)]
    pub erosion: ErosionConfig,

    /// 反演
    #[serde(default)]
    pub inversion: InversionConfig,

    /// 输出
    #[serde(default)]
    pub output: OutputConfig,
}

// ============================================================================
// 时间推进
// ============================================================================

/// 时间推进配置 [a]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// 起始时间
    #[serde(default = "default_tstart")]
    pub tstart: f64,

    /// 结束时间
    #[serde(default = "default_tend")]
    pub tend: f64,

    /// 保存间隔
    #[serde(default = "default_tsave")]
    pub tsave: f64,

    /// CFL 数
    #[serde(default = "default_cfl")]
    pub cfl: f64,

    /// 最大时间步长
    #[serde(default = "default_dtmax")]
    pub dtmax: f64,
}

fn default_tstart() -> f64 { 0.0 }
fn default_tend() -> f64 { 150.0 }
fn default_tsave() -> f64 { 10.0 }
fn default_cfl() -> f64 { 0.3 }
fn default_dtmax() -> f64 { 10.0 }

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            tstart: default_tstart(),
            tend: default_tend(),
            tsave: default_tsave(),
            cfl: default_cfl(),
            dtmax: default_dtmax(),
        }
    }
}

impl TimeConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cfl > 0.0 && self.cfl < 1.0) {
            return Err(ConfigError::invalid("time.cfl", self.cfl, "CFL 必须在 (0, 1) 范围内"));
        }
        if !(self.dtmax > 0.0) {
            return Err(ConfigError::invalid("time.dtmax", self.dtmax, "最大时间步长必须为正"));
        }
        if !(self.tsave > 0.0) {
            return Err(ConfigError::invalid("time.tsave", self.tsave, "保存间隔必须为正"));
        }
        if self.tend < self.tstart {
            return Err(ConfigError::invalid(
                "time.tend",
                self.tend,
                format!("结束时间不能早于起始时间 {}", self.tstart),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// 冰流模型
// ============================================================================

/// 冰流模型配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IceflowConfig {
    /// 输入需补零到该块大小的整数倍（0 表示不补零）
    #[serde(default)]
    pub multiple_window_size: usize,

    /// 垂向平均速度上限 [m/a]（0 表示不限制）
    #[serde(default)]
    pub force_max_velbar: f64,
}

impl IceflowConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.force_max_velbar < 0.0 || !self.force_max_velbar.is_finite() {
            return Err(ConfigError::invalid(
                "iceflow.force_max_velbar",
                self.force_max_velbar,
                "速度上限不能为负",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// 场初始化
// ============================================================================

/// 输入缺失时的常值缺省
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// 综合流动控制场
    #[serde(default = "default_init_strflowctrl")]
    pub strflowctrl: f64,

    /// 流动律系数
    #[serde(default = "default_init_arrhenius")]
    pub arrhenius: f64,

    /// 滑动系数
    #[serde(default)]
    pub slidingco: f64,
}

fn default_init_strflowctrl() -> f64 { 78.0 }
fn default_init_arrhenius() -> f64 { 78.0 }

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            strflowctrl: default_init_strflowctrl(),
            arrhenius: default_init_arrhenius(),
            slidingco: 0.0,
        }
    }
}

// ============================================================================
// 表面物质平衡
// ============================================================================

/// 物质平衡策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmbKind {
    /// 零物质平衡
    Zero,
    /// ELA + 梯度参数表（随时间插值）
    #[default]
    Simple,
    /// 古气候温度信号驱动的 ELA
    Signal,
    /// 外部给定场，保持不变
    Given,
}

/// 参数表的一行
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimpleSmbRow {
    /// 时间 [a]
    pub time: f64,
    /// 消融梯度 [(m/a)/m]
    pub gradabl: f64,
    /// 积累梯度 [(m/a)/m]
    pub gradacc: f64,
    /// 平衡线高度 [m]
    pub ela: f64,
    /// 最大积累 [m/a]
    pub maxacc: f64,
}

fn default_simple_table() -> Vec<SimpleSmbRow> {
    vec![
        SimpleSmbRow { time: 1900.0, gradabl: 0.009, gradacc: 0.005, ela: 2800.0, maxacc: 2.0 },
        SimpleSmbRow { time: 2000.0, gradabl: 0.009, gradacc: 0.005, ela: 2900.0, maxacc: 2.0 },
    ]
}

/// 信号驱动物质平衡参数
///
/// `ela = pdela + deladt * dT(t)`，`dT` 为温度差时间序列（区间外取端点值）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSmbConfig {
    /// 现代平衡线高度 [m]
    #[serde(default = "default_pdela")]
    pub pdela: f64,
    /// ELA 对温度差的敏感度 [m/K]
    #[serde(default = "default_deladt")]
    pub deladt: f64,
    /// 消融梯度
    #[serde(default = "default_signal_gradabl")]
    pub gradabl: f64,
    /// 积累梯度
    #[serde(default = "default_signal_gradacc")]
    pub gradacc: f64,
    /// 最大积累
    #[serde(default = "default_signal_maxacc")]
    pub maxacc: f64,
    /// 温度差信号 `(time, dT)`
    #[serde(default = "default_signal")]
    pub signal: Vec<(f64, f64)>,
}

fn default_pdela() -> f64 { 3000.0 }
fn default_deladt() -> f64 { 200.0 }
fn default_signal_gradabl() -> f64 { 0.0067 }
fn default_signal_gradacc() -> f64 { 0.0005 }
fn default_signal_maxacc() -> f64 { 1.0 }
fn default_signal() -> Vec<(f64, f64)> { vec![(0.0, 0.0)] }

impl Default for SignalSmbConfig {
    fn default() -> Self {
        Self {
            pdela: default_pdela(),
            deladt: default_deladt(),
            gradabl: default_signal_gradabl(),
            gradacc: default_signal_gradacc(),
            maxacc: default_signal_maxacc(),
            signal: default_signal(),
        }
    }
}

/// 物质平衡配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmbConfig {
    /// 策略
    #[serde(default)]
    pub kind: SmbKind,

    /// 更新频率 [a]
    #[serde(default = "default_smb_update_freq")]
    pub update_freq: f64,

    /// 缩放系数
    #[serde(default = "default_smb_scaling")]
    pub scaling: f64,

    /// `simple` 策略参数表
    #[serde(default = "default_simple_table")]
    pub simple: Vec<SimpleSmbRow>,

    /// `signal` 策略参数
    #[serde(default)]
    pub signal: SignalSmbConfig,
}

fn default_smb_update_freq() -> f64 { 1.0 }
fn default_smb_scaling() -> f64 { 1.0 }

impl Default for SmbConfig {
    fn default() -> Self {
        Self {
            kind: SmbKind::default(),
            update_freq: default_smb_update_freq(),
            scaling: default_smb_scaling(),
            simple: default_simple_table(),
            signal: SignalSmbConfig::default(),
        }
    }
}

impl SmbConfig {
    /// 验证
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_freq < 0.0 || !self.update_freq.is_finite() {
            return Err(ConfigError::invalid("smb.update_freq", self.update_freq, "更新频率不能为负"));
        }
        match self.kind {
            SmbKind::Simple => {
                let times: Vec<f64> = self.simple.iter().map(|r| r.time).collect();
                check_increasing("smb.simple", &times)?;
            }
            SmbKind::Signal => {
                let times: Vec<f64> = self.signal.signal.iter().map(|p| p.0).collect();
                check_increasing("smb.signal.signal", &times)?;
            }
            SmbKind::Zero | SmbKind::Given => {}
        }
        Ok(())
    }
}

fn check_increasing(key: &str, times: &[f64]) -> Result<(), ConfigError> {
    if times.is_empty() {
        return Err(ConfigError::invalid(key, "[]", "参数表不能为空"));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ConfigError::invalid(key, format!("{times:?}"), "时间必须严格递增"));
    }
    Ok(())
}

// ============================================================================
// 侵蚀
// ============================================================================

/// 基岩侵蚀配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErosionConfig {
    /// 是否启用
    #[serde(default)]
    pub enabled: bool,

    /// 侵蚀系数
    #[serde(default = "default_erosion_cst")]
    pub cst: f64,

    /// 侵蚀指数
    #[serde(default = "default_erosion_exp")]
    pub exp: f64,

    /// 更新频率 [a]
    #[serde(default = "default_erosion_update_freq")]
    pub update_freq: f64,
}

fn default_erosion_cst() -> f64 { 2.7e-7 }
fn default_erosion_exp() -> f64 { 2.0 }
fn default_erosion_update_freq() -> f64 { 100.0 }

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cst: default_erosion_cst(),
            exp: default_erosion_exp(),
            update_freq: default_erosion_update_freq(),
        }
    }
}

// ============================================================================
// 输出
// ============================================================================

/// 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出目录
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// 结束时写出检查点
    #[serde(default = "default_true")]
    pub checkpoint: bool,
}

fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_true() -> bool { true }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            checkpoint: true,
        }
    }
}

// ============================================================================
// 加载与验证
// ============================================================================

impl ModelConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;

        let config: ModelConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time.validate()?;
        self.iceflow.validate()?;
        self.smb.validate()?;

        if self.erosion.enabled && !(self.erosion.update_freq > 0.0) {
            return Err(ConfigError::invalid(
                "erosion.update_freq",
                self.erosion.update_freq,
                "侵蚀更新频率必须为正",
            ));
        }

        self.inversion.validate()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }
}
