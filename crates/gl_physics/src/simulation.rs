// crates/gl_physics/src/simulation.rs

//! 正演模拟驱动
//!
//! 显式两阶段生命周期：[`Simulation::new`] 完成一次性初始化
//! （首次物质平衡、首次速度求解、记录起始时刻诊断），
//! 之后 [`Simulation::step`] 按固定顺序推进：
//!
//! ```text
//! 物质平衡 -> 冰流速度 -> 时间推进 -> 输运 -> 侵蚀 -> (保存点) 诊断记录
//! ```
//!
//! [`Checkpoint`] 捕获全部可变状态，恢复后继续推进与不中断运行结果一致。

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use gl_config::ModelConfig;
use gl_foundation::{GlError, GlResult};

use crate::erosion::ErosionUpdater;
use crate::forcing::MassBalanceUpdater;
use crate::iceflow::VelocityModel;
use crate::state::SimulationState;
use crate::timestep::{StepOutcome, TimeController, TimeState};
use crate::transport::TransportSolver;

/// 保存点诊断
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TsRow {
    /// 时间 [a]
    pub t: f64,
    /// 冰量 [km³]
    pub volume_km3: f64,
    /// 冰川面积 [km²]
    pub area_km2: f64,
}

impl TsRow {
    fn of(t: f64, state: &SimulationState) -> Self {
        Self {
            t,
            volume_km3: state.volume_km3(),
            area_km2: state.glaciated_area_km2(),
        }
    }
}

/// 检查点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 全部字段
    pub state: SimulationState,
    /// 时间控制器状态
    pub time: TimeState,
    /// 物质平衡更新器
    pub smb: MassBalanceUpdater,
    /// 侵蚀更新器
    pub erosion: Option<ErosionUpdater>,
    /// 已记录的诊断
    pub ts: Vec<TsRow>,
}

impl Checkpoint {
    /// 写出 JSON
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> GlResult<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| GlError::io_with_source(format!("无法创建 {}", path.display()), e))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .map_err(|e| GlError::serialization(e.to_string()))?;
        log::info!("检查点已写出: {}", path.display());
        Ok(())
    }

    /// 读取 JSON
    pub fn load_json<P: AsRef<Path>>(path: P) -> GlResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GlError::file_not_found(path));
        }
        let file = File::open(path)
            .map_err(|e| GlError::io_with_source(format!("无法打开 {}", path.display()), e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| GlError::serialization(e.to_string()))
    }
}

/// 正演模拟
#[derive(Debug)]
pub struct Simulation {
    state: SimulationState,
    time: TimeController,
    smb: MassBalanceUpdater,
    erosion: Option<ErosionUpdater>,
    velocity: VelocityModel,
    transport: TransportSolver,
    ts: Vec<TsRow>,
}

impl Simulation {
    /// 初始化模拟
    pub fn new(
        config: &ModelConfig,
        mut state: SimulationState,
        velocity: VelocityModel,
    ) -> GlResult<Self> {
        config.validate()?;

        let time = TimeController::new(&config.time, state.grid.dx())?;
        let tstart = time.t();

        let mut smb = MassBalanceUpdater::new(&config.smb, &state)?;
        smb.update(&mut state, tstart, true);
        velocity.update(&mut state)?;

        let erosion = config
            .erosion
            .enabled
            .then(|| ErosionUpdater::new(&config.erosion, tstart));

        let ts = vec![TsRow::of(tstart, &state)];
        log::info!(
            "模拟初始化: t={tstart}, 冰量 {:.4} km³, 面积 {:.3} km²",
            ts[0].volume_km3,
            ts[0].area_km2
        );

        Ok(Self {
            state,
            time,
            smb,
            erosion,
            velocity,
            transport: TransportSolver,
            ts,
        })
    }

    /// 从检查点恢复
    pub fn restore(
        checkpoint: Checkpoint,
        config: &ModelConfig,
        velocity: VelocityModel,
    ) -> GlResult<Self> {
        let time = TimeController::restore(&config.time, checkpoint.state.grid.dx(), checkpoint.time)?;
        log::info!("从检查点恢复: t={}, it={}", time.t(), time.it());
        Ok(Self {
            state: checkpoint.state,
            time,
            smb: checkpoint.smb,
            erosion: checkpoint.erosion,
            velocity,
            transport: TransportSolver,
            ts: checkpoint.ts,
        })
    }

    /// 推进一步
    pub fn step(&mut self) -> GlResult<StepOutcome> {
        let t = self.time.t();
        self.smb.update(&mut self.state, t, false);
        self.velocity.update(&mut self.state)?;

        let outcome = self.time.advance(&self.state);
        self.transport.step(&mut self.state, outcome.dt as f32);

        let t = self.time.t();
        if let Some(erosion) = self.erosion.as_mut() {
            erosion.update(&mut self.state, t);
        }

        if outcome.save {
            let row = TsRow::of(t, &self.state);
            log::info!(
                "t={:.1} a, it={}, 冰量 {:.4} km³, 面积 {:.3} km²",
                row.t,
                self.time.it(),
                row.volume_km3,
                row.area_km2
            );
            self.ts.push(row);
        }
        Ok(outcome)
    }

    /// 运行到结束时间
    pub fn run(&mut self) -> GlResult<()> {
        while !self.time.finished() {
            self.step()?;
        }
        log::info!("模拟结束: t={}, 共 {} 步", self.time.t(), self.time.it());
        Ok(())
    }

    /// 当前状态快照
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            time: self.time.time_state().clone(),
            smb: self.smb.clone(),
            erosion: self.erosion.clone(),
            ts: self.ts.clone(),
        }
    }

    /// 写出诊断时间序列 `t vol area`
    pub fn write_ts<P: AsRef<Path>>(&self, path: P) -> GlResult<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| GlError::io_with_source(format!("无法创建 {}", path.display()), e))?;
        let mut w = BufWriter::new(file);
        for row in &self.ts {
            writeln!(w, "{:.4} {:.6} {:.6}", row.t, row.volume_km3, row.area_km2)?;
        }
        w.flush()?;
        Ok(())
    }

    /// 模拟状态
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// 时间控制器
    pub fn time(&self) -> &TimeController {
        &self.time
    }

    /// 诊断时间序列
    pub fn ts(&self) -> &[TsRow] {
        &self.ts
    }

    /// 速度模型
    pub fn velocity(&self) -> &VelocityModel {
        &self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iceflow::ShallowIceEmulator;
    use crate::inputs::InputFields;
    use gl_config::{IceflowConfig, SmbKind};
    use gl_foundation::Grid;

    fn setup(config: &ModelConfig) -> Simulation {
        let grid = Grid::regular(12, 8, 100.0, 0.0, 0.0).unwrap();
        let (xx, _) = grid.mesh();
        let topg = xx.mapv(|x| 3200.0 - 0.15 * x);
        let inputs = InputFields::new().with("usurf", topg);
        let state = SimulationState::initialize(grid, &inputs, &config.init).unwrap();
        let velocity = VelocityModel::new(
            Box::new(ShallowIceEmulator::combined(78.0)),
            &IceflowConfig::default(),
        )
        .unwrap();
        Simulation::new(config, state, velocity).unwrap()
    }

    fn config() -> ModelConfig {
        let mut config = ModelConfig::default();
        config.time.tstart = 0.0;
        config.time.tend = 30.0;
        config.time.tsave = 10.0;
        config.time.dtmax = 1.0;
        config.smb.kind = SmbKind::Signal;
        config.smb.signal.pdela = 3000.0;
        config
    }

    #[test]
    fn test_run_records_every_save_point() {
        let mut sim = setup(&config());
        sim.run().unwrap();

        let times: Vec<f64> = sim.ts().iter().map(|r| r.t).collect();
        assert_eq!(times, vec![0.0, 10.0, 20.0, 30.0]);
        assert!(sim.ts()[3].volume_km3 > 0.0);
        assert!(sim.state().thk.iter().all(|&h| h >= 0.0));
        assert!(sim.state().surface_residual() < 1e-3);
    }

    #[test]
    fn test_ts_file() {
        let mut sim = setup(&config());
        sim.run().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts.dat");
        sim.write_ts(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("0.0000 0.000000 0.000000"));
    }

    #[test]
    fn test_missing_checkpoint_file() {
        let err = Checkpoint::load_json("/nonexistent/checkpoint.json").unwrap_err();
        assert!(matches!(err, GlError::FileNotFound { .. }));
    }
}
