// crates/gl_inversion/src/lib.rs

//! GlacioSim Inversion Layer (Layer 3)
//!
//! 由冰面观测反演冰厚、综合流动控制场与（可选）冰面高程。
//! 梯度经 [`gl_physics::DifferentiableFieldMap`] 的反向接口解析求得，Adam 更新。
//!
//! # 模块概览
//!
//! - [`observations`]: 栅格观测、冰厚剖面、人工数据空洞
//! - [`interp`]: 剖面测点的双线性插值及其伴随
//! - [`flowdir`]: 各向异性平滑所用的观测流向
//! - [`cost`]: 失配项、罚项与代价分解
//! - [`regularization`]: 冰厚与流动控制场的平滑正则化
//! - [`regression`]: 散度对高程的线性回归
//! - [`optimizer`]: Adam
//! - [`stats`]: rms/std 诊断
//! - [`engine`]: [`InversionEngine`] 状态机
//! - [`report`]: 诊断表与摘要输出
//!
//! # 示例
//!
//! ```no_run
//! use gl_config::ModelConfig;
//! use gl_foundation::Grid;
//! use gl_inversion::{InversionEngine, Observations};
//! use gl_physics::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ModelConfig::default();
//! let grid = Grid::regular(40, 30, 100.0, 0.0, 0.0)?;
//! let inputs = InputFields::new()
//!     .with("usurfobs", grid.constant(3000.0))
//!     .with("uvelsurfobs", grid.constant(5.0))
//!     .with("vvelsurfobs", grid.zeros())
//!     .with("thkobs", grid.constant(100.0));
//!
//! let state = SimulationState::initialize(grid.clone(), &inputs, &config.init)?;
//! let obs = Observations::from_inputs(&inputs, &grid)?;
//! let velocity = VelocityModel::new(
//!     Box::new(ShallowIceEmulator::combined(78.0)),
//!     &config.iceflow,
//! )?;
//!
//! let mut engine = InversionEngine::new(&config.inversion, state, obs, velocity)?;
//! let summary = engine.run()?;
//! println!("冰量 {:.3} km³", summary.volume_km3);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cost;
pub mod engine;
pub mod error;
pub mod flowdir;
pub mod interp;
pub mod observations;
pub mod optimizer;
pub mod regression;
pub mod regularization;
pub mod report;
pub mod stats;

/// 层级标识
pub const LAYER: u8 = 3;

pub use cost::CostBreakdown;
pub use engine::{
    check_signature, InversionEngine, InversionHistory, InversionPhase, InversionSummary,
};
pub use error::{InversionError, InversionResult};
pub use observations::{Observations, ProfilePoint, ThicknessProfiles};
pub use report::write_reports;
pub use stats::{IterationStats, RmsStd};
