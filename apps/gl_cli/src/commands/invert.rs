// apps/gl_cli/src/commands/invert.rs

//! 孪生反演实验
//!
//! 在合成山谷上放置已知冰川，用内置速度模型生成冰面速度观测，
//! 沿谷轴给出一条冰厚观测线，再从无冰状态出发反演冰厚与流动控制场。

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use gl_foundation::Field;
use gl_inversion::{write_reports, InversionEngine, Observations};
use gl_physics::prelude::*;
use gl_physics::state::THK_PRESENCE;
use tracing::info;

use super::load_config;
use crate::synthetic::Valley;

/// 孪生反演参数
#[derive(Args)]
pub struct InvertArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 输出目录（覆盖配置）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 最大迭代次数（覆盖配置）
    #[arg(long)]
    pub nbitmax: Option<usize>,

    /// 合成山谷列数
    #[arg(long, default_value = "40")]
    pub nx: usize,

    /// 合成山谷行数
    #[arg(long, default_value = "20")]
    pub ny: usize,

    /// 网格间距 [m]
    #[arg(long, default_value = "100.0")]
    pub dx: f32,

    /// 真值冰川最大冰厚 [m]
    #[arg(long, default_value = "250.0")]
    pub max_thk: f32,
}

/// 执行孪生反演实验
pub fn execute(args: InvertArgs) -> Result<()> {
    info!("=== GlacioSim 孪生反演 ===");

    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.nbitmax {
        config.inversion.nbitmax = n;
    }
    let output = args.output.unwrap_or_else(|| config.output.directory.clone());
    std::fs::create_dir_all(&output)
        .with_context(|| format!("无法创建输出目录 {}", output.display()))?;

    let velocity = || {
        VelocityModel::new(
            Box::new(ShallowIceEmulator::combined(config.inversion.thr_strflowctrl)),
            &config.iceflow,
        )
        .context("构建速度模型失败")
    };

    // 真值
    let valley = Valley::new(args.nx, args.ny, args.dx).context("构建合成山谷失败")?;
    let grid = valley.grid.clone();
    let thk_true = valley.glacier(args.max_thk);
    let usurf_true = &valley.topg + &thk_true;
    let truth_inputs = InputFields::new()
        .with("usurf", usurf_true.clone())
        .with("thk", thk_true.clone());
    let mut truth = SimulationState::initialize(grid.clone(), &truth_inputs, &config.init)
        .context("初始化真值状态失败")?;
    velocity()?.update(&mut truth).context("真值速度求解失败")?;
    info!("真值冰量 {:.4} km³", truth.volume_km3());

    // 观测
    let icemaskobs = thk_true.mapv(|h| if h > THK_PRESENCE { 1.0 } else { 0.0 });
    let centre = grid.ny() / 2;
    let thkobs = Field::from_shape_fn(grid.shape(), |(j, i)| {
        let h = thk_true[[j, i]];
        if j == centre && h > THK_PRESENCE {
            h
        } else {
            f32::NAN
        }
    });
    let inputs = InputFields::new()
        .with("usurfobs", usurf_true)
        .with("uvelsurfobs", truth.uvelsurf.clone())
        .with("vvelsurfobs", truth.vvelsurf.clone())
        .with("icemaskobs", icemaskobs)
        .with("thkobs", thkobs);

    let state = SimulationState::initialize(grid.clone(), &inputs, &config.init)
        .context("初始化反演状态失败")?;
    let obs = Observations::from_inputs(&inputs, &grid).context("读取观测失败")?;

    let mut engine = InversionEngine::new(&config.inversion, state, obs, velocity()?)
        .context("反演前置检查失败")?;
    let model = engine.velocity();
    info!(
        "速度模型 {}，签名 {:?}，尺度: 冰厚 {} m, 冰面 {} m, 流动控制 {}",
        model.model().name(),
        model.signature(),
        engine.scales().thk,
        engine.scales().usurf,
        engine.scales().strflowctrl
    );

    let start = Instant::now();
    let summary = engine.run().context("反演失败")?;
    let elapsed = start.elapsed();

    let files = write_reports(&output, engine.history(), &summary).context("写出报告失败")?;
    let state_path = output.join("inverted_state.json");
    let text = serde_json::to_string(engine.state()).context("序列化反演状态失败")?;
    std::fs::write(&state_path, text)
        .with_context(|| format!("无法写出 {}", state_path.display()))?;

    let rms = {
        let diffs: Vec<f64> = engine
            .state()
            .thk
            .iter()
            .zip(thk_true.iter())
            .map(|(&a, &b)| (a - b) as f64)
            .collect();
        (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len().max(1) as f64).sqrt()
    };

    info!("=== 反演完成 ===");
    info!(
        "迭代 {} 次{}，耗时 {:.2} s",
        summary.iterations,
        if summary.stopped_early { "（提前停止）" } else { "" },
        elapsed.as_secs_f64()
    );
    info!(
        "冰量 {:.4} km³（真值 {:.4} km³），冰厚 rms 误差 {:.2} m",
        summary.volume_km3,
        truth.volume_km3(),
        rms
    );
    info!(
        "strflowctrl 掩膜内 {:.3} ± {:.3}",
        summary.strflowctrl_mean, summary.strflowctrl_std
    );
    for f in files.iter().chain(std::iter::once(&state_path)) {
        info!("写出 {}", f.display());
    }
    Ok(())
}
