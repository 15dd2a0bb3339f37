// crates/gl_inversion/src/engine.rs

//! 反演引擎
//!
//! 通过速度模型的前向与向量-Jacobian 积，对无量纲控制变量
//! （冰厚、综合流动控制场、可选冰面高程）最小化组合代价。
//!
//! # 生命周期
//!
//! ```text
//! Initializing ──new()──> Iterating ──iterate() × N──> Finalizing ──> Done
//! ```
//!
//! [`InversionEngine::new`] 完成全部前置检查，之后迭代不会因数据问题失败。
//!
//! # 单次迭代
//!
//! 1. 由当前冰面高程计算坡度，组装模型输入（分开签名下分解流动控制场）
//! 2. 速度模型前向，输出写回状态
//! 3. 代价项求值与解析梯度，经模型反向传回控制变量
//! 4. 掩膜外梯度置零，Adam 更新
//! 5. 写回物理值，冰厚低于阈值置零，重算散度与诊断统计

use ndarray::{Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

use gl_config::{ControlField, CostTerm, InversionConfig};
use gl_foundation::field::all_missing;
use gl_foundation::{Field, FieldName, GlError};
use gl_physics::iceflow::{
    channel_of, decompose_flow_control, ModelSignature, REMAINDER_DIVISOR, REQUIRED_OUTPUTS,
};
use gl_physics::operators::{compute_gradient, compute_gradient_adjoint, magnitude};
use gl_physics::state::THK_PRESENCE;
use gl_physics::transport::{compute_divflux, compute_divflux_adjoint};
use gl_physics::{SimulationState, VelocityModel};

use crate::cost::{
    inside_mask, masked_misfit, negativity_penalty, nominal_penalty, outside_mask_penalty,
    profile_misfit, surface_consistency_penalty, valid, velocity_misfit, CostBreakdown,
    GLACIATED, MASK_THRESHOLD,
};
use crate::error::{InversionError, InversionResult};
use crate::flowdir::FlowDirection;
use crate::interp::BilinearSampler;
use crate::observations::{Observations, ThicknessProfiles};
use crate::optimizer::Adam;
use crate::regression::{linregress, LinearFit};
use crate::regularization::{flow_control_smoothing, ThicknessSmoothing};
use crate::stats::{IterationStats, RmsStd};

/// 提前停止判据的窗口长度
const PLATEAU_WINDOW: usize = 10;

// ============================================================================
// 类型
// ============================================================================

/// 反演阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InversionPhase {
    /// 前置检查与准备
    Initializing,
    /// 迭代中
    Iterating,
    /// 固定基岩、导出诊断字段
    Finalizing,
    /// 已结束
    Done,
}

impl InversionPhase {
    /// 阶段名
    pub fn name(&self) -> &'static str {
        match self {
            InversionPhase::Initializing => "initializing",
            InversionPhase::Iterating => "iterating",
            InversionPhase::Finalizing => "finalizing",
            InversionPhase::Done => "done",
        }
    }
}

/// 控制变量的无量纲尺度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlScales {
    /// 冰厚
    pub thk: f32,
    /// 冰面高程（坡度尺度乘网格间距）
    pub usurf: f32,
    /// 综合流动控制场
    pub strflowctrl: f32,
}

/// 迭代历史
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InversionHistory {
    /// 每次迭代的代价分解
    pub costs: Vec<CostBreakdown>,
    /// 每次迭代后的诊断统计
    pub stats: Vec<IterationStats>,
}

impl InversionHistory {
    /// 已记录的迭代数
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// 总代价序列
    pub fn totals(&self) -> Vec<f64> {
        self.costs.iter().map(CostBreakdown::total).collect()
    }

    /// 最近 10 次的平均总代价是否高于之前 10 次
    pub fn plateau_reached(&self) -> bool {
        let totals = self.totals();
        let n = totals.len();
        if n < 2 * PLATEAU_WINDOW {
            return false;
        }
        let mean = |s: &[f64]| s.iter().sum::<f64>() / s.len() as f64;
        let recent = mean(&totals[n - PLATEAU_WINDOW..]);
        let previous = mean(&totals[n - 2 * PLATEAU_WINDOW..n - PLATEAU_WINDOW]);
        recent > previous
    }
}

/// 反演结果摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InversionSummary {
    /// 执行的迭代数
    pub iterations: usize,
    /// 是否因代价平台期提前停止
    pub stopped_early: bool,
    /// 最后一次迭代的总代价
    pub final_cost: f64,
    /// 冰量 [km³]
    pub volume_km3: f64,
    /// 掩膜内流动控制场均值
    pub strflowctrl_mean: f64,
    /// 掩膜内流动控制场标准差
    pub strflowctrl_std: f64,
}

/// 单次求值结果：代价与对无量纲控制变量的梯度
struct Evaluation {
    costs: CostBreakdown,
    grad_thk: Field,
    grad_usurf: Field,
    grad_sf: Field,
}

/// 校验速度模型的输入输出是否可用于反演
pub fn check_signature(
    inputs: &[FieldName],
    outputs: &[FieldName],
) -> InversionResult<ModelSignature> {
    let signature = [ModelSignature::SplitFlowLaw, ModelSignature::CombinedFlowControl]
        .into_iter()
        .find(|s| s.inputs() == inputs)
        .ok_or_else(|| InversionError::UnsupportedSignature {
            inputs: inputs.iter().map(|f| f.as_str().to_string()).collect(),
        })?;

    let missing: Vec<String> = REQUIRED_OUTPUTS
        .iter()
        .filter(|f| !outputs.contains(f))
        .map(|f| f.as_str().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InversionError::MissingOutputs { missing });
    }
    Ok(signature)
}

// ============================================================================
// 引擎
// ============================================================================

/// 反演引擎
pub struct InversionEngine {
    config: InversionConfig,
    velocity: VelocityModel,
    state: SimulationState,
    obs: Observations,
    profiles: Option<(ThicknessProfiles, BilinearSampler)>,
    smoothing: ThicknessSmoothing,
    divfluxobs: Option<Field>,
    fit: Option<LinearFit>,
    scales: ControlScales,
    thk_n: Field,
    usurf_n: Field,
    sf_n: Field,
    adam: Adam,
    iteration: usize,
    stopped_early: bool,
    phase: InversionPhase,
    history: InversionHistory,
}

impl std::fmt::Debug for InversionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InversionEngine")
            .field("phase", &self.phase)
            .field("iteration", &self.iteration)
            .field("control", &self.config.control)
            .field("cost", &self.config.cost)
            .field("scales", &self.scales)
            .finish()
    }
}

impl InversionEngine {
    /// 前置检查并准备迭代
    ///
    /// # 错误
    ///
    /// - 配置无效
    /// - 速度模型签名不受支持或缺少输出
    /// - 请求剖面冰厚代价但文件不存在，或栅格冰厚观测全部缺测
    /// - 请求速度代价但没有速度观测
    pub fn new(
        config: &InversionConfig,
        mut state: SimulationState,
        mut obs: Observations,
        velocity: VelocityModel,
    ) -> InversionResult<Self> {
        config.validate()?;
        let signature = check_signature(velocity.input_fields(), velocity.output_fields())?;

        let grid = state.grid.clone();
        let shape = grid.shape();
        GlError::check_shape("usurfobs", shape, obs.usurfobs.dim())?;
        GlError::check_shape("icemaskobs", shape, obs.icemaskobs.dim())?;

        let profiles = if config.has_cost(CostTerm::Thk) {
            match &config.thk_profiles_file {
                Some(path) => {
                    let profiles = ThicknessProfiles::load(path)?;
                    let sampler = BilinearSampler::for_profiles(&profiles, &grid);
                    log::info!(
                        "读入 {} 条冰厚剖面, {} 个测点",
                        profiles.profiles().len(),
                        profiles.len()
                    );
                    Some((profiles, sampler))
                }
                None => {
                    if obs.thkobs.as_ref().map_or(true, all_missing) {
                        return Err(InversionError::ThicknessObservationsMissing);
                    }
                    None
                }
            }
        } else {
            None
        };

        if config.has_cost(CostTerm::Velsurf) && !obs.has_velocity() {
            return Err(InversionError::missing_observation(
                "velsurf",
                "uvelsurfobs/vvelsurfobs",
            ));
        }

        let divfluxobs = config
            .has_cost(CostTerm::Divfluxobs)
            .then(|| &state.smb - &state.dhdt);

        // 流向取自挖洞之前的观测
        let smoothing = if config.smooth_anisotropy_factor == 1.0 {
            ThicknessSmoothing::isotropic(config.regu_param_thk)
        } else if let (Some(u), Some(v)) = (&obs.uvelsurfobs, &obs.vvelsurfobs) {
            ThicknessSmoothing::anisotropic(
                config.regu_param_thk,
                config.smooth_anisotropy_factor,
                config.convexity_weight,
                FlowDirection::from_velocity(u, v),
            )
        } else {
            log::warn!("没有速度观测，冰厚正则化退回各向同性");
            ThicknessSmoothing::isotropic(config.regu_param_thk)
        };

        obs.make_holes(config.make_holes_in_data, &grid);

        state.thk = match (&obs.thkinit, config.init_zero_thk) {
            (Some(init), false) => init.mapv(|h| if h.is_nan() { 0.0 } else { h }),
            _ => grid.zeros(),
        };

        let scales = ControlScales {
            thk: velocity.scale(FieldName::Thk)?,
            usurf: velocity.scale(FieldName::Slopsurfx)? * grid.dx(),
            strflowctrl: match signature {
                ModelSignature::CombinedFlowControl => velocity.scale(FieldName::Strflowctrl)?,
                ModelSignature::SplitFlowLaw => {
                    velocity.scale(FieldName::Arrhenius)? + velocity.scale(FieldName::Slidingco)?
                }
            },
        };

        let thk_n = state.thk.mapv(|v| v / scales.thk);
        let usurf_n = state.usurf.mapv(|v| v / scales.usurf);
        let sf_n = state.strflowctrl.mapv(|v| v / scales.strflowctrl);

        let adam = Adam::new(config.step_size, config.control.len(), shape);

        log::info!(
            "反演准备完成: 控制 {:?}, 代价 {:?}, 签名 {:?}, 掩膜内 {} 个单元, 冰厚正则化{}",
            config.control,
            config.cost,
            signature,
            obs.glaciated_cells(),
            if smoothing.is_isotropic() { "各向同性" } else { "各向异性" }
        );

        Ok(Self {
            config: config.clone(),
            velocity,
            state,
            obs,
            profiles,
            smoothing,
            divfluxobs,
            fit: None,
            scales,
            thk_n,
            usurf_n,
            sf_n,
            adam,
            iteration: 0,
            stopped_early: false,
            phase: InversionPhase::Iterating,
            history: InversionHistory::default(),
        })
    }

    // ------------------------------------------------------------------------
    // 访问器
    // ------------------------------------------------------------------------

    /// 当前阶段
    pub fn phase(&self) -> InversionPhase {
        self.phase
    }

    /// 已完成的迭代数
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// 模拟状态
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// 取出模拟状态
    pub fn into_state(self) -> SimulationState {
        self.state
    }

    /// 观测（已应用数据空洞）
    pub fn observations(&self) -> &Observations {
        &self.obs
    }

    /// 迭代历史
    pub fn history(&self) -> &InversionHistory {
        &self.history
    }

    /// 控制变量尺度
    pub fn scales(&self) -> ControlScales {
        self.scales
    }

    /// 最近一次散度回归
    pub fn divflux_fit(&self) -> Option<LinearFit> {
        self.fit
    }

    /// 速度模型
    pub fn velocity(&self) -> &VelocityModel {
        &self.velocity
    }

    fn has_control(&self, field: ControlField) -> bool {
        self.config.has_control(field)
    }

    /// 控制变量的当前物理值；非控制变量取状态值
    fn physical(&self, field: ControlField) -> Field {
        match (field, self.has_control(field)) {
            (ControlField::Thk, true) => self.thk_n.mapv(|v| v * self.scales.thk),
            (ControlField::Thk, false) => self.state.thk.clone(),
            (ControlField::Usurf, true) => self.usurf_n.mapv(|v| v * self.scales.usurf),
            (ControlField::Usurf, false) => self.state.usurf.clone(),
            (ControlField::Strflowctrl, true) => self.sf_n.mapv(|v| v * self.scales.strflowctrl),
            (ControlField::Strflowctrl, false) => self.state.strflowctrl.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // 迭代
    // ------------------------------------------------------------------------

    /// 执行一次迭代，返回本次迭代的代价分解
    pub fn iterate(&mut self) -> InversionResult<CostBreakdown> {
        if self.phase != InversionPhase::Iterating {
            return Err(InversionError::InvalidPhase(self.phase.name()));
        }

        let refit = self.iteration % self.config.divflux_refit_period == 0;
        let eval = self.evaluate(refit)?;

        let mask = &self.obs.icemaskobs;
        let restrict = |g: Field| -> Field {
            let mut g = g;
            Zip::from(&mut g).and(mask).for_each(|g, &m| {
                if m <= MASK_THRESHOLD {
                    *g = 0.0;
                }
            });
            g
        };

        let mut params: Vec<&mut Field> = Vec::with_capacity(3);
        let mut grads: Vec<Field> = Vec::with_capacity(3);
        if self.config.has_control(ControlField::Thk) {
            params.push(&mut self.thk_n);
            grads.push(restrict(eval.grad_thk));
        }
        if self.config.has_control(ControlField::Usurf) {
            params.push(&mut self.usurf_n);
            grads.push(restrict(eval.grad_usurf));
        }
        if self.config.has_control(ControlField::Strflowctrl) {
            params.push(&mut self.sf_n);
            grads.push(restrict(eval.grad_sf));
        }
        self.adam.step(params.as_mut_slice(), &grads);

        self.write_back();

        let dx = self.state.grid.dx();
        self.state.divflux = compute_divflux(
            self.state.ubar.view(),
            self.state.vbar.view(),
            self.state.thk.view(),
            dx,
            dx,
        );

        let stats = self.compute_stats();
        if self.iteration % self.config.output_freq == 0 {
            log::info!(
                "反演 第 {:5} 步, 冰量 {:7.2} km³, COST_U {:7.2}, COST_H {:7.2}, COST_D {:7.2}, COST_S {:7.2}, REGU_H {:7.2}, REGU_A {:7.2}",
                self.iteration,
                self.state.volume_km3(),
                eval.costs.velsurf,
                eval.costs.thk,
                eval.costs.divflux,
                eval.costs.usurf,
                eval.costs.regu_thk,
                eval.costs.regu_strflowctrl,
            );
            log::debug!(
                "诊断: rms thk {:.3}, rms vel {:.3}, rms usurf {:.3}",
                stats.thk.rms,
                stats.velsurf.rms,
                stats.usurf.rms
            );
        }

        self.history.costs.push(eval.costs);
        self.history.stats.push(stats);
        self.iteration += 1;
        Ok(eval.costs)
    }

    /// 迭代到最大次数（或提前停止），然后结束
    pub fn run(&mut self) -> InversionResult<InversionSummary> {
        while self.iteration < self.config.nbitmax {
            self.iterate()?;
            if self.config.early_stop
                && self.iteration > self.config.nbitmin
                && self.history.plateau_reached()
            {
                log::info!("代价进入平台期，在第 {} 步停止", self.iteration);
                self.stopped_early = true;
                break;
            }
        }
        self.finalize()
    }

    /// 固定基岩，导出流动律分解与冰川掩膜
    pub fn finalize(&mut self) -> InversionResult<InversionSummary> {
        if self.phase != InversionPhase::Iterating {
            return Err(InversionError::InvalidPhase(self.phase.name()));
        }
        self.phase = InversionPhase::Finalizing;

        let thr = self.config.thr_strflowctrl;
        let state = &mut self.state;
        state.topg = &state.usurf - &state.thk;
        state.icemask = state.thk.mapv(|h| if h > THK_PRESENCE { 1.0 } else { 0.0 });
        state.arrhenius = state
            .strflowctrl
            .mapv(|s| decompose_flow_control(s as f64, thr).0 as f32);
        state.slidingco = state
            .strflowctrl
            .mapv(|s| decompose_flow_control(s as f64, thr).1 as f32);

        let inside: Vec<f64> = state
            .strflowctrl
            .iter()
            .zip(self.obs.icemaskobs.iter())
            .filter(|(_, &m)| m > MASK_THRESHOLD)
            .map(|(&s, _)| s as f64)
            .collect();
        let (mean, std) = if inside.is_empty() {
            (0.0, 0.0)
        } else {
            let n = inside.len() as f64;
            let mean = inside.iter().sum::<f64>() / n;
            let var = inside.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        };

        let summary = InversionSummary {
            iterations: self.iteration,
            stopped_early: self.stopped_early,
            final_cost: self.history.costs.last().map_or(0.0, CostBreakdown::total),
            volume_km3: state.volume_km3(),
            strflowctrl_mean: mean,
            strflowctrl_std: std,
        };

        self.phase = InversionPhase::Done;
        log::info!(
            "反演结束: {} 次迭代, 冰量 {:.3} km³, strflowctrl {:.3} ± {:.3}",
            summary.iterations,
            summary.volume_km3,
            summary.strflowctrl_mean,
            summary.strflowctrl_std
        );
        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // 内部
    // ------------------------------------------------------------------------

    /// 前向、代价与梯度
    fn evaluate(&mut self, refit: bool) -> InversionResult<Evaluation> {
        let dx = self.state.grid.dx();
        let shape = self.state.grid.shape();
        let thr = self.config.thr_strflowctrl;

        let thk = self.physical(ControlField::Thk);
        let usurf = self.physical(ControlField::Usurf);
        let sf = self.physical(ControlField::Strflowctrl);
        let (sx, sy) = compute_gradient(usurf.view(), dx, dx);
        let arr = sf.mapv(|s| decompose_flow_control(s as f64, thr).0 as f32);
        let slid = sf.mapv(|s| decompose_flow_control(s as f64, thr).1 as f32);

        // 组装无量纲输入
        let fields = self.velocity.input_fields().to_vec();
        let mut x = Array3::<f32>::zeros((fields.len(), shape.0, shape.1));
        for (k, &name) in fields.iter().enumerate() {
            let src = match name {
                FieldName::Thk => &thk,
                FieldName::Slopsurfx => &sx,
                FieldName::Slopsurfy => &sy,
                FieldName::Strflowctrl => &sf,
                FieldName::Arrhenius => &arr,
                FieldName::Slidingco => &slid,
                other => return Err(GlError::missing_field(other.as_str()).into()),
            };
            let scale = self.velocity.scale(name)?;
            Zip::from(x.index_axis_mut(Axis(0), k))
                .and(src)
                .for_each(|o, &v| *o = v / scale);
        }

        let y = self.velocity.forward_padded(&x)?;
        for &name in self.velocity.output_fields() {
            *self.state.field_mut(name) = self.velocity.output_field(&y, name)?;
        }

        let mut costs = CostBreakdown::default();
        let mut g_thk = Field::zeros(shape);
        let mut g_usurf = Field::zeros(shape);
        let mut g_sf = Field::zeros(shape);
        let mut g_ubar = Field::zeros(shape);
        let mut g_vbar = Field::zeros(shape);
        let mut g_uvelsurf = Field::zeros(shape);
        let mut g_vvelsurf = Field::zeros(shape);
        let in_mask = inside_mask(&self.obs.icemaskobs);
        let cfg = &self.config;

        if cfg.has_cost(CostTerm::Velsurf) {
            if let (Some(uo), Some(vo)) = (&self.obs.uvelsurfobs, &self.obs.vvelsurfobs) {
                let (c, gu, gv) = velocity_misfit(
                    &self.state.uvelsurf,
                    &self.state.vvelsurf,
                    uo,
                    vo,
                    cfg.velsurfobs_std,
                );
                costs.velsurf = c;
                g_uvelsurf = gu;
                g_vvelsurf = gv;
            }
        }

        if cfg.has_cost(CostTerm::Thk) {
            let (c, g) = match (&self.profiles, &self.obs.thkobs) {
                (Some((profiles, sampler)), _) => profile_misfit(&thk, profiles, sampler),
                (None, Some(thkobs)) => {
                    masked_misfit(&thk, thkobs, cfg.thkobs_std, &valid(thkobs))
                }
                (None, None) => (0.0, Field::zeros(shape)),
            };
            costs.thk = c;
            g_thk += &g;
        }

        let fcz = cfg.has_cost(CostTerm::Divfluxfcz);
        if fcz || cfg.has_cost(CostTerm::Divfluxobs) {
            let (ubar, vbar) = (self.state.ubar.view(), self.state.vbar.view());
            let div = compute_divflux(ubar, vbar, thk.view(), dx, dx);

            let target = if fcz {
                if refit || self.fit.is_none() {
                    self.fit = linregress(
                        self.state
                            .usurf
                            .iter()
                            .zip(div.iter())
                            .zip(in_mask.iter())
                            .filter(|(_, &a)| a)
                            .map(|((&s, &d), _)| (s as f64, d as f64)),
                    );
                }
                let fit = self.fit;
                let mut target = Field::zeros(shape);
                Zip::from(&mut target)
                    .and(&self.state.usurf)
                    .and(&in_mask)
                    .for_each(|t, &s, &a| {
                        if let (true, Some(fit)) = (a, fit) {
                            *t = fit.eval(s as f64) as f32;
                        }
                    });
                target
            } else {
                self.divfluxobs.clone().unwrap_or_else(|| Field::zeros(shape))
            };

            let (c, g_div) = masked_misfit(&div, &target, cfg.divfluxobs_std, &in_mask);
            costs.divflux = c;
            let (gu, gv, gh) =
                compute_divflux_adjoint(ubar, vbar, thk.view(), dx, dx, g_div.view());
            g_ubar += &gu;
            g_vbar += &gv;
            g_thk += &gh;
        }

        if cfg.has_cost(CostTerm::Usurf) {
            let (c, g) = masked_misfit(&usurf, &self.obs.usurfobs, cfg.usurfobs_std, &in_mask);
            costs.usurf = c;
            g_usurf += &g;
        }

        if cfg.has_cost(CostTerm::Topg) {
            let (c, gs, gh) =
                surface_consistency_penalty(&usurf, &thk, &self.state.topg, &in_mask);
            costs.topg = c;
            g_usurf += &gs;
            g_thk += &gh;
        }

        // 直接作用于无量纲控制变量的项
        let mut g_thk_n = Field::zeros(shape);
        let mut g_sf_n = Field::zeros(shape);

        if cfg.has_cost(CostTerm::Icemask) {
            let (c, g) = outside_mask_penalty(&self.thk_n, &self.obs.icemaskobs);
            costs.icemask = c;
            g_thk_n += &g;
        }

        if cfg.has_control(ControlField::Thk) {
            let (c, g) = negativity_penalty(&self.thk_n);
            costs.positivity = c;
            g_thk_n += &g;

            let (c, g) = self.smoothing.evaluate(&self.thk_n);
            costs.regu_thk = c;
            g_thk_n += &g;
        }

        if cfg.has_control(ControlField::Strflowctrl) {
            let (c, g) = nominal_penalty(&sf, thr, cfg.strflowctrl_std);
            costs.strflowctrl = c;
            g_sf += &g;

            let (c, g) = flow_control_smoothing(
                &self.sf_n,
                &self.obs.icemaskobs,
                cfg.regu_param_strflowctrl,
            );
            costs.regu_strflowctrl = c;
            g_sf_n += &g;
        }

        // 经速度模型反向传播
        let velocity_terms = [
            (FieldName::Ubar, &g_ubar),
            (FieldName::Vbar, &g_vbar),
            (FieldName::Uvelsurf, &g_uvelsurf),
            (FieldName::Vvelsurf, &g_vvelsurf),
        ];
        if velocity_terms.iter().any(|(_, g)| g.iter().any(|&v| v != 0.0)) {
            let outputs = self.velocity.output_fields();
            let mut gy = Array3::<f32>::zeros(y.raw_dim());
            for (name, g) in velocity_terms {
                let k = channel_of(outputs, name)?;
                let scale = self.velocity.scale(name)?;
                Zip::from(gy.index_axis_mut(Axis(0), k))
                    .and(g)
                    .for_each(|o, &v| *o = v * scale);
            }

            let gx = self.velocity.backward_padded(&x, &gy)?;
            let mut g_sx = Field::zeros(shape);
            let mut g_sy = Field::zeros(shape);
            for (k, &name) in fields.iter().enumerate() {
                let scale = self.velocity.scale(name)?;
                let g = gx.index_axis(Axis(0), k).mapv(|v| v / scale);
                match name {
                    FieldName::Thk => g_thk += &g,
                    FieldName::Slopsurfx => g_sx = g,
                    FieldName::Slopsurfy => g_sy = g,
                    FieldName::Strflowctrl => g_sf += &g,
                    FieldName::Arrhenius => Zip::from(&mut g_sf).and(&g).and(&sf).for_each(
                        |o, &g, &s| {
                            if s as f64 <= thr {
                                *o += g;
                            }
                        },
                    ),
                    FieldName::Slidingco => Zip::from(&mut g_sf).and(&g).and(&sf).for_each(
                        |o, &g, &s| {
                            if s as f64 > thr {
                                *o += g / REMAINDER_DIVISOR as f32;
                            }
                        },
                    ),
                    _ => {}
                }
            }
            g_usurf += &compute_gradient_adjoint(g_sx.view(), g_sy.view(), dx, dx);
        }

        let s = self.scales;
        Ok(Evaluation {
            costs,
            grad_thk: g_thk * s.thk + g_thk_n,
            grad_usurf: g_usurf * s.usurf,
            grad_sf: g_sf * s.strflowctrl + g_sf_n,
        })
    }

    /// 写回物理值
    fn write_back(&mut self) {
        let s = self.scales;
        if self.has_control(ControlField::Thk) {
            let zero = self.config.thk_zero_threshold as f32;
            self.state.thk = self.thk_n.mapv(|v| {
                let h = v * s.thk;
                if h < zero {
                    0.0
                } else {
                    h
                }
            });
        }
        if self.has_control(ControlField::Strflowctrl) {
            self.state.strflowctrl = self.sf_n.mapv(|v| v * s.strflowctrl);
        }
        if self.has_control(ControlField::Usurf) {
            self.state.usurf = self.usurf_n.mapv(|v| v * s.usurf);
            self.state.recompute_slopes();
        }
    }

    /// 在观测掩膜（`== 1`）内统计模型与观测之差
    fn compute_stats(&self) -> IterationStats {
        let state = &self.state;
        let obs = &self.obs;
        let glaciated: Vec<bool> = obs.icemaskobs.iter().map(|&m| m == GLACIATED).collect();

        let thk = match (&self.profiles, &obs.thkobs) {
            (Some((profiles, sampler)), _) => RmsStd::from_diffs(
                sampler
                    .sample(&state.thk)
                    .iter()
                    .zip(profiles.points())
                    .map(|(&m, p)| m as f64 - p.thk as f64),
            ),
            (None, Some(thkobs)) => RmsStd::from_diffs(
                state
                    .thk
                    .iter()
                    .zip(thkobs.iter())
                    .map(|(&m, &o)| m as f64 - o as f64),
            ),
            (None, None) => RmsStd::default(),
        };

        let velsurf = match (&obs.uvelsurfobs, &obs.vvelsurfobs) {
            (Some(uo), Some(vo)) => {
                let model = state.velsurf_mag();
                let observed = magnitude(uo.view(), vo.view());
                RmsStd::from_diffs(
                    model
                        .iter()
                        .zip(observed.iter())
                        .zip(&glaciated)
                        .filter(|(_, &g)| g)
                        .map(|((&m, &o), _)| m as f64 - o as f64),
                )
            }
            _ => RmsStd::default(),
        };

        let divflux = self
            .divfluxobs
            .as_ref()
            .map(|target| {
                RmsStd::from_diffs(
                    target
                        .iter()
                        .zip(state.divflux.iter())
                        .zip(&glaciated)
                        .filter(|(_, &g)| g)
                        .map(|((&t, &d), _)| t as f64 - d as f64),
                )
            })
            .unwrap_or_default();

        let usurf = RmsStd::from_diffs(
            state
                .usurf
                .iter()
                .zip(obs.usurfobs.iter())
                .zip(&glaciated)
                .filter(|(_, &g)| g)
                .map(|((&m, &o), _)| m as f64 - o as f64),
        );

        IterationStats {
            thk,
            velsurf,
            divflux,
            usurf,
        }
    }
}
