// crates/gl_physics/src/timestep.rs

//! 时间步长控制模块
//!
//! 基于 CFL 条件的自适应时间步长，并精确命中保存时刻。
//!
//! ## CFL 条件
//!
//! $$ \Delta t_{target} = \min\left(C \frac{\Delta x}{\max(|\bar u|, |\bar v|)}, \Delta t_{max}\right) $$
//!
//! 冰体静止（最大速度为 0）时直接取 `dtmax`。
//!
//! ## 保存时刻
//!
//! 保存序列为 `{tstart, tstart + tsave, ..., tend}`，构造时一次性生成。
//! 若下一保存时刻落在 `t + dt_target` 之内，则截断步长恰好到达该时刻。

use serde::{Deserialize, Serialize};

use gl_config::TimeConfig;
use gl_foundation::{GlError, GlResult};

use crate::operators::max_abs_velocity;
use crate::state::SimulationState;

/// 单步推进结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// 实际步长
    pub dt: f64,
    /// CFL 目标步长
    pub dt_target: f64,
    /// 本步是否到达保存时刻
    pub save: bool,
}

/// 时间状态（可序列化，用于检查点）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeState {
    /// 当前时间
    pub t: f64,
    /// 迭代计数
    pub it: u64,
    /// 最近一步步长
    pub dt: f64,
    /// 最近一步目标步长
    pub dt_target: f64,
    /// 最近一步是否为保存点
    pub save: bool,
    /// 保存时刻序列
    pub schedule: Vec<f64>,
    /// 最近命中的保存时刻索引
    pub isave: usize,
}

/// 时间步长控制器
#[derive(Debug, Clone)]
pub struct TimeController {
    cfl: f64,
    dtmax: f64,
    dx: f64,
    tend: f64,
    state: TimeState,
}

/// 生成保存时刻序列 `arange(tstart, tend, tsave) ++ [tend]`
fn build_schedule(tstart: f64, tend: f64, tsave: f64) -> Vec<f64> {
    let mut schedule = Vec::new();
    let mut k = 0u64;
    loop {
        let t = tstart + k as f64 * tsave;
        if t >= tend {
            break;
        }
        schedule.push(t);
        k += 1;
    }
    schedule.push(tend);
    schedule
}

impl TimeController {
    /// 创建控制器并建立保存时刻序列
    ///
    /// # 错误
    ///
    /// `dx` 非正或时间配置非法时返回错误。
    pub fn new(config: &TimeConfig, dx: f32) -> GlResult<Self> {
        if !(dx > 0.0) {
            return Err(GlError::invalid_input(format!("网格间距必须为正: dx={dx}")));
        }
        config.validate()?;

        let schedule = build_schedule(config.tstart, config.tend, config.tsave);
        log::debug!(
            "时间控制器: cfl={}, dtmax={}, 保存点 {} 个",
            config.cfl,
            config.dtmax,
            schedule.len()
        );

        Ok(Self {
            cfl: config.cfl,
            dtmax: config.dtmax,
            dx: dx as f64,
            tend: config.tend,
            state: TimeState {
                t: config.tstart,
                it: 0,
                dt: 0.0,
                dt_target: config.dtmax,
                save: true,
                schedule,
                isave: 0,
            },
        })
    }

    /// 从检查点恢复
    pub fn restore(config: &TimeConfig, dx: f32, state: TimeState) -> GlResult<Self> {
        let mut controller = Self::new(config, dx)?;
        if state.schedule.is_empty() || state.isave >= state.schedule.len() {
            return Err(GlError::invalid_input("检查点中的保存时刻序列无效"));
        }
        controller.state = state;
        Ok(controller)
    }

    /// 由最大速度计算目标步长
    pub fn target_dt(&self, velomax: f64) -> f64 {
        if velomax > 0.0 {
            (self.cfl * self.dx / velomax).min(self.dtmax)
        } else {
            self.dtmax
        }
    }

    /// 以已知最大速度推进一步
    pub fn advance_with_velocity(&mut self, velomax: f64) -> StepOutcome {
        let dt_target = self.target_dt(velomax);
        let s = &mut self.state;

        let next_save = s.schedule.get(s.isave + 1).copied();
        let (dt, save) = match next_save {
            Some(ts) if ts <= s.t + dt_target => {
                let dt = ts - s.t;
                s.t = ts;
                s.isave += 1;
                (dt, true)
            }
            _ => {
                s.t += dt_target;
                (dt_target, false)
            }
        };

        s.dt = dt;
        s.dt_target = dt_target;
        s.save = save;
        s.it += 1;

        StepOutcome { dt, dt_target, save }
    }

    /// 由状态中的垂向平均速度推进一步
    pub fn advance(&mut self, state: &SimulationState) -> StepOutcome {
        let velomax = max_abs_velocity(state.ubar.view(), state.vbar.view()) as f64;
        let outcome = self.advance_with_velocity(velomax);
        log::trace!(
            "it={} t={:.3} dt={:.4} (target {:.4}, velomax {:.3})",
            self.state.it,
            self.state.t,
            outcome.dt,
            outcome.dt_target,
            velomax
        );
        outcome
    }

    /// 当前时间
    pub fn t(&self) -> f64 {
        self.state.t
    }

    /// 迭代计数
    pub fn it(&self) -> u64 {
        self.state.it
    }

    /// 是否已到结束时间
    pub fn finished(&self) -> bool {
        self.state.t >= self.tend
    }

    /// 时间状态快照
    pub fn time_state(&self) -> &TimeState {
        &self.state
    }
}
