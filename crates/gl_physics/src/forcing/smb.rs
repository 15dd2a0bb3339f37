// crates/gl_physics/src/forcing/smb.rs

//! 表面物质平衡
//!
//! 策略由 [`SmbKind`] 枚举选择，[`MassBalanceUpdater`] 负责更新频率节流、
//! 冰川掩膜与缩放。
//!
//! # 高程剖面
//!
//! `simple` 与 `signal` 两种策略共享同一剖面：
//!
//! ```text
//! smb = (usurf - ela) * gradabl     (usurf < ela)
//! smb = (usurf - ela) * gradacc     (usurf >= ela)
//! smb = clip(smb, -100, maxacc)
//! ```

use ndarray::{ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use gl_config::{SmbConfig, SmbKind};
use gl_foundation::{Field, GlResult};

use crate::forcing::timeseries::TimeSeries;
use crate::state::SimulationState;

/// 剖面下限 [m/a]
const SMB_FLOOR: f32 = -100.0;
/// `simple` 策略在掩膜外的取值 [m/a]
const SMB_OFF_MASK: f32 = -10.0;

/// 物质平衡策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SmbModel {
    /// 零物质平衡
    Zero,
    /// 参数表随时间插值
    Simple {
        /// 消融梯度
        gradabl: TimeSeries,
        /// 积累梯度
        gradacc: TimeSeries,
        /// 平衡线高度
        ela: TimeSeries,
        /// 最大积累
        maxacc: TimeSeries,
    },
    /// 温度信号驱动的平衡线
    Signal {
        /// 现代平衡线高度
        pdela: f64,
        /// ELA 对温度差的敏感度
        deladt: f64,
        /// 消融梯度
        gradabl: f64,
        /// 积累梯度
        gradacc: f64,
        /// 最大积累
        maxacc: f64,
        /// 温度差信号
        delta_t: TimeSeries,
    },
    /// 外部给定场
    Given {
        /// 初始化时捕获的场
        base: Field,
    },
}

impl SmbModel {
    /// 由配置构建策略，`Given` 捕获当前 `smb` 场
    pub fn from_config(config: &SmbConfig, state: &SimulationState) -> GlResult<Self> {
        let model = match config.kind {
            SmbKind::Zero => SmbModel::Zero,
            SmbKind::Simple => {
                let times: Vec<f64> = config.simple.iter().map(|r| r.time).collect();
                let column = |f: fn(&gl_config::SimpleSmbRow) -> f64| {
                    TimeSeries::new(times.clone(), config.simple.iter().map(f).collect())
                };
                SmbModel::Simple {
                    gradabl: column(|r| r.gradabl)?,
                    gradacc: column(|r| r.gradacc)?,
                    ela: column(|r| r.ela)?,
                    maxacc: column(|r| r.maxacc)?,
                }
            }
            SmbKind::Signal => {
                let s = &config.signal;
                SmbModel::Signal {
                    pdela: s.pdela,
                    deladt: s.deladt,
                    gradabl: s.gradabl,
                    gradacc: s.gradacc,
                    maxacc: s.maxacc,
                    delta_t: TimeSeries::from_points(&s.signal)?,
                }
            }
            SmbKind::Given => SmbModel::Given {
                base: state.smb.clone(),
            },
        };
        Ok(model)
    }

    /// 策略名
    pub fn name(&self) -> &'static str {
        match self {
            SmbModel::Zero => "zero",
            SmbModel::Simple { .. } => "simple",
            SmbModel::Signal { .. } => "signal",
            SmbModel::Given { .. } => "given",
        }
    }

    /// 计算 `t` 时刻的物质平衡（未掩膜、未缩放）
    pub fn compute(&self, state: &SimulationState, t: f64) -> Field {
        match self {
            SmbModel::Zero => state.grid.zeros(),
            SmbModel::Simple {
                gradabl,
                gradacc,
                ela,
                maxacc,
            } => {
                let smb = ela_profile(
                    state.usurf.view(),
                    ela.get_value(t) as f32,
                    gradabl.get_value(t) as f32,
                    gradacc.get_value(t) as f32,
                    maxacc.get_value(t) as f32,
                );
                Zip::from(&smb)
                    .and(&state.icemask)
                    .map_collect(|&b, &m| if m > 0.5 { b } else { SMB_OFF_MASK })
            }
            SmbModel::Signal {
                pdela,
                deladt,
                gradabl,
                gradacc,
                maxacc,
                delta_t,
            } => {
                let ela = pdela + deladt * delta_t.get_value(t);
                ela_profile(
                    state.usurf.view(),
                    ela as f32,
                    *gradabl as f32,
                    *gradacc as f32,
                    *maxacc as f32,
                )
            }
            SmbModel::Given { base } => base.clone(),
        }
    }
}

/// ELA 高程剖面
pub fn ela_profile(
    usurf: ArrayView2<f32>,
    ela: f32,
    gradabl: f32,
    gradacc: f32,
    maxacc: f32,
) -> Field {
    usurf.mapv(|z| {
        let dz = z - ela;
        let grad = if dz < 0.0 { gradabl } else { gradacc };
        (dz * grad).clamp(SMB_FLOOR, maxacc)
    })
}

/// 物质平衡更新器
///
/// 距上次更新不少于 `update_freq` 年（或 `force`）时重算，
/// 结果乘以冰川掩膜，`scaling != 1` 时再缩放。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassBalanceUpdater {
    model: SmbModel,
    update_freq: f64,
    scaling: f64,
    t_last: Option<f64>,
}

impl MassBalanceUpdater {
    /// 创建更新器
    pub fn new(config: &SmbConfig, state: &SimulationState) -> GlResult<Self> {
        let model = SmbModel::from_config(config, state)?;
        log::debug!("物质平衡策略: {}", model.name());
        Ok(Self {
            model,
            update_freq: config.update_freq,
            scaling: config.scaling,
            t_last: None,
        })
    }

    /// 需要时更新 `state.smb`，返回是否发生了更新
    pub fn update(&mut self, state: &mut SimulationState, t: f64, force: bool) -> bool {
        let due = match self.t_last {
            None => true,
            Some(t_last) => t - t_last >= self.update_freq,
        };
        if !(force || due) {
            return false;
        }

        let mut smb = self.model.compute(state, t);
        smb.zip_mut_with(&state.icemask, |b, &m| *b *= m);
        if self.scaling != 1.0 {
            let s = self.scaling as f32;
            smb.mapv_inplace(|b| b * s);
        }
        state.smb = smb;
        self.t_last = Some(t);

        log::trace!("物质平衡更新: t={t:.3}");
        true
    }

    /// 策略
    pub fn model(&self) -> &SmbModel {
        &self.model
    }

    /// 上次更新时间
    pub fn t_last(&self) -> Option<f64> {
        self.t_last
    }
}
