// apps/gl_cli/src/commands/run.rs

//! 正演模拟命令
//!
//! 从合成山谷（初始无冰）或 JSON 检查点出发推进到结束时间，
//! 写出诊断时间序列 `ts.dat` 与结束时刻检查点。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use gl_physics::prelude::*;
use tracing::info;

use super::load_config;
use crate::synthetic::Valley;

/// 正演模拟参数
#[derive(Args)]
pub struct RunArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 从检查点恢复
    #[arg(short, long)]
    pub restart: Option<PathBuf>,

    /// 输出目录（覆盖配置）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 合成山谷列数
    #[arg(long, default_value = "60")]
    pub nx: usize,

    /// 合成山谷行数
    #[arg(long, default_value = "30")]
    pub ny: usize,

    /// 网格间距 [m]
    #[arg(long, default_value = "100.0")]
    pub dx: f32,
}

/// 执行正演模拟
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== GlacioSim 正演模拟 ===");

    let config = load_config(args.config.as_deref())?;
    let output = args.output.unwrap_or_else(|| config.output.directory.clone());
    std::fs::create_dir_all(&output)
        .with_context(|| format!("无法创建输出目录 {}", output.display()))?;

    let velocity = VelocityModel::new(
        Box::new(ShallowIceEmulator::combined(config.inversion.thr_strflowctrl)),
        &config.iceflow,
    )
    .context("构建速度模型失败")?;

    let mut simulation = match &args.restart {
        Some(path) => {
            let checkpoint = Checkpoint::load_json(path)
                .with_context(|| format!("无法读取检查点 {}", path.display()))?;
            Simulation::restore(checkpoint, &config, velocity).context("恢复模拟失败")?
        }
        None => {
            let valley = Valley::new(args.nx, args.ny, args.dx).context("构建合成山谷失败")?;
            info!(
                "合成山谷: {}×{}, dx={} m",
                valley.grid.nx(),
                valley.grid.ny(),
                valley.grid.dx()
            );
            let inputs = InputFields::new().with("usurf", valley.topg.clone());
            let state = SimulationState::initialize(valley.grid, &inputs, &config.init)
                .context("初始化状态失败")?;
            Simulation::new(&config, state, velocity).context("初始化模拟失败")?
        }
    };

    info!(
        "时间区间 [{}, {}] a, 保存间隔 {} a, CFL={}",
        config.time.tstart, config.time.tend, config.time.tsave, config.time.cfl
    );

    let start = Instant::now();
    simulation.run().context("模拟失败")?;
    let elapsed = start.elapsed();

    let ts_path = output.join("ts.dat");
    simulation
        .write_ts(&ts_path)
        .with_context(|| format!("无法写出 {}", ts_path.display()))?;

    if config.output.checkpoint {
        let path = output.join("checkpoint.json");
        simulation
            .checkpoint()
            .save_json(&path)
            .with_context(|| format!("无法写出检查点 {}", path.display()))?;
    }

    let state = simulation.state();
    info!("=== 模拟完成 ===");
    info!("总步数: {}", simulation.time().it());
    info!("计算时间: {:.2} s", elapsed.as_secs_f64());
    info!(
        "冰量 {:.4} km³, 面积 {:.3} km²",
        state.volume_km3(),
        state.glaciated_area_km2()
    );
    Ok(())
}
