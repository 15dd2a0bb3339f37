// crates/gl_physics/src/erosion.rs

//! 冰川基岩侵蚀
//!
//! 侵蚀速率与冰底滑动速度模的幂律关系：
//!
//! $$ \dot{e} = c \, |u_b|^{m} $$
//!
//! 每隔 `update_freq` 年按累积时间一次性下切 `topg`，并重建 `usurf`。

use ndarray::Zip;
use serde::{Deserialize, Serialize};

use gl_config::ErosionConfig;

use crate::state::SimulationState;

/// 基岩侵蚀更新器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErosionUpdater {
    cst: f32,
    exp: f32,
    update_freq: f64,
    t_last: f64,
}

impl ErosionUpdater {
    /// 创建更新器，节流时钟从 `tstart` 开始
    pub fn new(config: &ErosionConfig, tstart: f64) -> Self {
        Self {
            cst: config.cst as f32,
            exp: config.exp as f32,
            update_freq: config.update_freq,
            t_last: tstart,
        }
    }

    /// 需要时下切基岩，返回是否发生了更新
    pub fn update(&mut self, state: &mut SimulationState, t: f64) -> bool {
        let elapsed = t - self.t_last;
        if elapsed < self.update_freq {
            return false;
        }

        let (cst, exp) = (self.cst, self.exp);
        state.dtopgdt = Zip::from(&state.uvelbase)
            .and(&state.vvelbase)
            .map_collect(|&u, &v| cst * (u * u + v * v).sqrt().powf(exp));

        let dt = elapsed as f32;
        state.topg.zip_mut_with(&state.dtopgdt, |b, &r| *b -= dt * r);
        state.rebuild_surface();

        let max_rate = state.dtopgdt.iter().fold(0.0f32, |m, r| m.max(r.abs()));
        log::debug!("基岩侵蚀: t={t:.1}, 累积 {elapsed:.1} a, 最大速率 {max_rate:.3e} m/a");

        self.t_last = t;
        true
    }

    /// 上次更新时间
    pub fn t_last(&self) -> f64 {
        self.t_last
    }
}
