// crates/gl_inversion/tests/inversion.rs

//! 反演引擎集成测试
//!
//! # 测试覆盖
//!
//! - 孪生实验：由真值状态生成速度观测，从低估的冰厚出发代价下降
//! - 掩膜全为零时三个控制变量都不变
//! - 前置检查：冰厚观测缺失、速度观测缺失、剖面文件不存在
//! - 结束后继续迭代报错
//! - 剖面冰厚代价与报告输出
//! - 散度代价：回归按周期刷新、外部给定的散度
//! - 冰面高程控制与 `usurf = topg + thk` 罚项
//! - 各向异性平滑、分开签名的速度模型
//! - 人工空洞、非整数掩膜不计入诊断
//! - 代价回升时提前停止

use std::f32::consts::PI;

use gl_config::{ControlField, CostTerm, IceflowConfig, InitConfig, InversionConfig};
use gl_foundation::{Field, Grid};
use gl_inversion::{write_reports, InversionEngine, InversionError, InversionPhase, Observations};
use gl_physics::prelude::*;
use gl_physics::ModelSignature;

// ============================================================================
// 测试辅助函数
// ============================================================================

const NX: usize = 20;
const NY: usize = 12;
const DX: f32 = 100.0;

fn grid() -> Grid {
    Grid::regular(NX, NY, DX, 0.0, 0.0).unwrap()
}

fn velocity() -> VelocityModel {
    VelocityModel::new(
        Box::new(ShallowIceEmulator::combined(78.0)),
        &IceflowConfig::default(),
    )
    .unwrap()
}

fn split_velocity() -> VelocityModel {
    VelocityModel::new(Box::new(ShallowIceEmulator::split()), &IceflowConfig::default()).unwrap()
}

/// 向 x 倾斜的冰面
fn usurf() -> Field {
    let (xx, _) = grid().mesh();
    xx.mapv(|x| 3000.0 - 0.1 * x)
}

/// 中部最厚的真值冰厚，处处为正
fn true_thk() -> Field {
    Field::from_shape_fn((NY, NX), |(j, i)| {
        let a = (PI * (i as f32 + 0.5) / NX as f32).sin();
        let b = (PI * (j as f32 + 0.5) / NY as f32).sin();
        60.0 + 140.0 * a * b
    })
}

/// 由真值状态前向得到的冰面速度
fn observed_velocity(model: &VelocityModel) -> (Field, Field) {
    let inputs = InputFields::new()
        .with("usurf", usurf())
        .with("thk", true_thk());
    let mut truth = SimulationState::initialize(grid(), &inputs, &InitConfig::default()).unwrap();
    model.update(&mut truth).unwrap();
    (truth.uvelsurf, truth.vvelsurf)
}

fn twin_inputs(icemask: Field) -> InputFields {
    twin_inputs_for(&velocity(), icemask)
}

fn twin_inputs_for(model: &VelocityModel, icemask: Field) -> InputFields {
    let (u, v) = observed_velocity(model);
    InputFields::new()
        .with("usurfobs", usurf())
        .with("uvelsurfobs", u)
        .with("vvelsurfobs", v)
        .with("icemaskobs", icemask)
        .with("thkinit", true_thk().mapv(|h| 0.6 * h))
}

fn thickness_only_config() -> InversionConfig {
    InversionConfig {
        control: vec![ControlField::Thk],
        cost: vec![CostTerm::Velsurf, CostTerm::Icemask],
        smooth_anisotropy_factor: 1.0,
        step_size: 0.01,
        nbitmax: 30,
        output_freq: 10,
        ..Default::default()
    }
}

fn engine(config: &InversionConfig, inputs: &InputFields) -> Result<InversionEngine, InversionError> {
    engine_with(config, inputs, velocity())
}

fn engine_with(
    config: &InversionConfig,
    inputs: &InputFields,
    model: VelocityModel,
) -> Result<InversionEngine, InversionError> {
    let grid = grid();
    let state = SimulationState::initialize(grid.clone(), inputs, &InitConfig::default())?;
    let obs = Observations::from_inputs(inputs, &grid)?;
    InversionEngine::new(config, state, obs, model)
}

fn mean(field: &Field) -> f64 {
    field.iter().map(|&v| v as f64).sum::<f64>() / field.len() as f64
}

fn count_nan(field: &Field) -> usize {
    field.iter().filter(|v| v.is_nan()).count()
}

fn assert_unchanged(name: &str, after: &Field, before: &Field) {
    for (&a, &b) in after.iter().zip(before.iter()) {
        assert!((a - b).abs() < 1e-3, "{name}: {a} vs {b}");
    }
}

// ============================================================================
// 孪生实验
// ============================================================================

#[test]
fn test_twin_experiment_reduces_cost() {
    let config = thickness_only_config();
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();
    let initial_mean = mean(&engine.state().thk);

    let summary = engine.run().unwrap();
    assert_eq!(summary.iterations, 30);
    assert!(!summary.stopped_early);
    assert_eq!(engine.phase(), InversionPhase::Done);

    let totals = engine.history().totals();
    assert_eq!(totals.len(), 30);
    assert!(totals.iter().all(|c| c.is_finite()));
    assert!(totals[29] < totals[0], "代价未下降: {} -> {}", totals[0], totals[29]);

    // 低估的冰厚被抬高
    let state = engine.state();
    assert!(mean(&state.thk) > initial_mean);
    assert!(state.thk.iter().all(|&h| h >= 0.0));

    // 结束阶段固定基岩
    for ((&t, &s), &h) in state.topg.iter().zip(state.usurf.iter()).zip(state.thk.iter()) {
        assert!((t - (s - h)).abs() < 1e-3);
    }
    assert!((summary.strflowctrl_mean - 78.0).abs() < 1e-3);
    assert!(summary.strflowctrl_std.abs() < 1e-3);
}

#[test]
fn test_zero_mask_freezes_controls() {
    let config = InversionConfig {
        control: vec![ControlField::Thk, ControlField::Strflowctrl, ControlField::Usurf],
        cost: vec![CostTerm::Velsurf, CostTerm::Icemask, CostTerm::Usurf],
        nbitmax: 5,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().zeros());
    let mut engine = engine(&config, &inputs).unwrap();

    let thk0 = engine.state().thk.clone();
    let sf0 = engine.state().strflowctrl.clone();
    let usurf0 = engine.state().usurf.clone();
    for _ in 0..5 {
        engine.iterate().unwrap();
    }

    let state = engine.state();
    assert_unchanged("thk", &state.thk, &thk0);
    assert_unchanged("strflowctrl", &state.strflowctrl, &sf0);
    assert_unchanged("usurf", &state.usurf, &usurf0);
}

// ============================================================================
// 前置检查
// ============================================================================

#[test]
fn test_missing_thickness_observations() {
    let config = InversionConfig {
        cost: vec![CostTerm::Velsurf, CostTerm::Thk],
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    assert!(matches!(
        engine(&config, &inputs),
        Err(InversionError::ThicknessObservationsMissing)
    ));

    // 全部缺测等同缺失
    let inputs = inputs.with("thkobs", grid().constant(f32::NAN));
    assert!(matches!(
        engine(&config, &inputs),
        Err(InversionError::ThicknessObservationsMissing)
    ));
}

#[test]
fn test_missing_velocity_observations() {
    let config = thickness_only_config();
    let inputs = InputFields::new().with("usurfobs", usurf());
    match engine(&config, &inputs) {
        Err(InversionError::MissingObservation { term, .. }) => assert_eq!(term, "velsurf"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_profile_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = InversionConfig {
        cost: vec![CostTerm::Velsurf, CostTerm::Thk],
        thk_profiles_file: Some(dir.path().join("profiles.dat")),
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    assert!(matches!(
        engine(&config, &inputs),
        Err(InversionError::ProfileFileNotFound { .. })
    ));
}

#[test]
fn test_iterate_after_finalize() {
    let config = InversionConfig {
        nbitmax: 2,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();
    engine.run().unwrap();

    assert!(matches!(engine.iterate(), Err(InversionError::InvalidPhase("done"))));
    assert!(matches!(engine.finalize(), Err(InversionError::InvalidPhase("done"))));
}

// ============================================================================
// 剖面冰厚与报告
// ============================================================================

#[test]
fn test_profile_cost_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let truth = true_thk();

    // 沿 y = 550 的一条剖面，取真值冰厚
    let mut text = String::from("# id x y thk std\n");
    for i in 2..NX - 2 {
        let x = i as f32 * DX;
        text.push_str(&format!("1 {x} 550 {} 5\n", 0.5 * (truth[[5, i]] + truth[[6, i]])));
    }
    let path = dir.path().join("profiles.dat");
    std::fs::write(&path, text).unwrap();

    let config = InversionConfig {
        cost: vec![CostTerm::Velsurf, CostTerm::Thk, CostTerm::Icemask],
        thk_profiles_file: Some(path),
        nbitmax: 10,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();
    let summary = engine.run().unwrap();

    let history = engine.history();
    assert_eq!(history.len(), 10);
    assert!(history.costs[0].thk > 0.0);
    assert!(history.stats[0].thk.rms > 0.0);

    let out = dir.path().join("report");
    let files = write_reports(&out, history, &summary).unwrap();
    assert!(files.iter().all(|f| f.exists()));
    let costs = std::fs::read_to_string(out.join("costs.dat")).unwrap();
    assert_eq!(costs.lines().count(), 11);
}

// ============================================================================
// 通量散度
// ============================================================================

#[test]
fn test_divflux_fit_refreshed_on_period() {
    let config = InversionConfig {
        cost: vec![CostTerm::Velsurf, CostTerm::Divfluxfcz],
        divflux_refit_period: 5,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();
    assert!(engine.divflux_fit().is_none());

    let mut fits = Vec::new();
    for _ in 0..7 {
        let costs = engine.iterate().unwrap();
        assert!(costs.divflux.is_finite());
        fits.push(engine.divflux_fit().unwrap());
    }

    // 第 0 与第 5 次迭代重新回归，其间目标保持不变
    for fit in &fits[1..5] {
        assert_eq!(*fit, fits[0]);
    }
    assert_ne!(fits[5], fits[0]);
    assert_eq!(fits[6], fits[5]);
}

#[test]
fn test_divflux_against_mass_balance() {
    let config = InversionConfig {
        cost: vec![CostTerm::Velsurf, CostTerm::Divfluxobs],
        nbitmax: 5,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0))
        .with("smb", grid().constant(2.0))
        .with("dhdt", grid().constant(0.5));
    let mut engine = engine(&config, &inputs).unwrap();
    engine.run().unwrap();

    let history = engine.history();
    assert!(history.costs[0].divflux > 0.0);
    assert!(history.stats[0].divflux.rms > 0.0);
    assert!(history.totals().iter().all(|c| c.is_finite()));
    assert!(engine.divflux_fit().is_none());
}

// ============================================================================
// 冰面高程控制
// ============================================================================

#[test]
fn test_surface_control_with_consistency_penalty() {
    // 初始基岩等于冰面，反演冰厚为正，`usurf - thk - topg` 处处为负
    let config = InversionConfig {
        control: vec![ControlField::Thk, ControlField::Usurf],
        cost: vec![CostTerm::Velsurf, CostTerm::Usurf, CostTerm::Topg],
        nbitmax: 3,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();
    assert_unchanged("topg", &engine.state().topg, &usurf());

    let costs: Vec<_> = (0..3).map(|_| engine.iterate().unwrap()).collect();
    assert!(costs[0].topg > 0.0);
    assert!(costs[2].topg < costs[0].topg, "{} -> {}", costs[0].topg, costs[2].topg);

    // 罚项把冰面抬高、把冰厚压低
    let state = engine.state();
    assert!(mean(&state.usurf) > mean(&usurf()));
    assert!(mean(&state.thk) < mean(&true_thk().mapv(|h| 0.6 * h)));
    assert!(state.usurf.iter().all(|v| v.is_finite()));
}

// ============================================================================
// 正则化与速度模型签名
// ============================================================================

#[test]
fn test_anisotropic_smoothing_in_engine() {
    let inputs = twin_inputs(grid().constant(1.0));

    let mut isotropic = engine(&thickness_only_config(), &inputs).unwrap();
    let iso = isotropic.iterate().unwrap();

    // 观测流向沿 x，横流分量被削弱，凸性项为负
    let config = InversionConfig {
        smooth_anisotropy_factor: 0.2,
        ..thickness_only_config()
    };
    let mut anisotropic = engine(&config, &inputs).unwrap();
    let aniso = anisotropic.iterate().unwrap();
    assert!(aniso.regu_thk.is_finite());
    assert!(aniso.regu_thk < iso.regu_thk, "{} vs {}", aniso.regu_thk, iso.regu_thk);
    assert_eq!(aniso.velsurf, iso.velsurf);

    anisotropic.run().unwrap();
    let totals = anisotropic.history().totals();
    assert!(totals.iter().all(|c| c.is_finite()));
    assert!(totals[totals.len() - 1] < totals[0]);
}

#[test]
fn test_split_signature_twin() {
    let config = InversionConfig {
        control: vec![ControlField::Thk, ControlField::Strflowctrl],
        ..thickness_only_config()
    };
    let inputs = twin_inputs_for(&split_velocity(), grid().constant(1.0));
    let mut engine = engine_with(&config, &inputs, split_velocity()).unwrap();
    assert_eq!(engine.velocity().signature(), ModelSignature::SplitFlowLaw);
    assert_eq!(engine.velocity().model().name(), "sia-split");

    let summary = engine.run().unwrap();
    assert_eq!(summary.iterations, 30);
    let totals = engine.history().totals();
    assert!(totals.iter().all(|c| c.is_finite()));
    assert!(totals[29] < totals[0], "代价未下降: {} -> {}", totals[0], totals[29]);

    // 结束阶段按阈值分解流动控制场
    let state = engine.state();
    let thr = config.thr_strflowctrl as f32;
    for ((&s, &a), &c) in state
        .strflowctrl
        .iter()
        .zip(state.arrhenius.iter())
        .zip(state.slidingco.iter())
    {
        assert!(a <= thr + 1e-3);
        assert!(c >= 0.0);
        if s <= thr {
            assert_eq!(a, s);
            assert_eq!(c, 0.0);
        }
    }
}

// ============================================================================
// 掩膜与观测空洞
// ============================================================================

#[test]
fn test_holes_applied_before_iterating() {
    let config = InversionConfig {
        make_holes_in_data: 30,
        nbitmax: 5,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();

    let obs = engine.observations();
    let holes = count_nan(obs.uvelsurfobs.as_ref().unwrap());
    // 掩膜内 240 个单元的 30%
    assert_eq!(holes, 72);
    assert_eq!(count_nan(obs.vvelsurfobs.as_ref().unwrap()), holes);

    engine.run().unwrap();
    let history = engine.history();
    assert!(history.costs.iter().all(|c| c.velsurf.is_finite() && c.velsurf > 0.0));
    assert!(history.stats.iter().all(|s| s.velsurf.rms.is_finite()));
}

#[test]
fn test_all_velocity_removed() {
    let config = InversionConfig {
        make_holes_in_data: 100,
        nbitmax: 2,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0));
    let mut engine = engine(&config, &inputs).unwrap();
    assert_eq!(count_nan(engine.observations().uvelsurfobs.as_ref().unwrap()), NX * NY);

    engine.run().unwrap();
    assert!(engine.history().costs.iter().all(|c| c.velsurf == 0.0));
}

#[test]
fn test_fractional_mask_excluded_from_diagnostics() {
    // 0.7 高于代价阈值，但不等于 1
    let config = InversionConfig {
        nbitmax: 3,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(0.7));
    let mut engine = engine(&config, &inputs).unwrap();
    let thk0 = mean(&engine.state().thk);
    engine.run().unwrap();

    assert!(mean(&engine.state().thk) > thk0);
    for stats in &engine.history().stats {
        assert_eq!(stats.velsurf.rms, 0.0);
        assert_eq!(stats.usurf.rms, 0.0);
    }
}

// ============================================================================
// 提前停止
// ============================================================================

#[test]
fn test_early_stop_when_cost_rises() {
    // 均匀冰厚下平滑项为零；负凸性项使冰厚每步恰好下降一个学习率，
    // 第 16 次迭代越过零点，正值罚项让后一个窗口的平均代价远高于前一个
    let config = InversionConfig {
        cost: vec![CostTerm::Icemask],
        smooth_anisotropy_factor: 0.5,
        convexity_weight: -1.0,
        early_stop: true,
        nbitmin: 0,
        nbitmax: 100,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0)).with("thkinit", grid().constant(150.0));
    let mut engine = engine(&config, &inputs).unwrap();

    let summary = engine.run().unwrap();
    assert!(summary.stopped_early);
    assert_eq!(summary.iterations, 20);

    let history = engine.history();
    assert!(history.costs[..15].iter().all(|c| c.positivity == 0.0));
    assert!(history.costs[16].positivity > 1e5);
    assert!(history.plateau_reached());
}

#[test]
fn test_early_stop_respects_nbitmin() {
    let config = InversionConfig {
        cost: vec![CostTerm::Icemask],
        smooth_anisotropy_factor: 0.5,
        convexity_weight: -1.0,
        early_stop: true,
        nbitmin: 25,
        nbitmax: 100,
        ..thickness_only_config()
    };
    let inputs = twin_inputs(grid().constant(1.0)).with("thkinit", grid().constant(150.0));
    let mut engine = engine(&config, &inputs).unwrap();

    let summary = engine.run().unwrap();
    // 第 20 次迭代时已满足平台判据，但未到最少迭代数
    assert!(summary.iterations > 25);
    if summary.stopped_early {
        assert!(engine.history().plateau_reached());
    }
}
