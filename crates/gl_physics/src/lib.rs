// crates/gl_physics/src/lib.rs

//! GlacioSim Physics Layer (Layer 2)
//!
//! 冰川正演物理层：模拟状态、CFL 时间推进、迎风有限体积冰厚输运、
//! 可微冰流模型接口、表面物质平衡与基岩侵蚀。
//!
//! # 模块概览
//!
//! - [`state`]: 显式模拟状态 [`SimulationState`]
//! - [`inputs`]: 外部输入字段集合
//! - [`operators`]: 中心差分梯度及其伴随
//! - [`transport`]: 通量散度、伴随与输运求解器
//! - [`timestep`]: CFL 时间步长与保存时刻
//! - [`iceflow`]: [`DifferentiableFieldMap`] 接口、签名校验、速度模型包装、解析代理模型
//! - [`forcing`]: 物质平衡策略与时间序列
//! - [`erosion`]: 基岩侵蚀
//! - [`simulation`]: 正演驱动与检查点
//!
//! # 示例
//!
//! ```no_run
//! use gl_config::ModelConfig;
//! use gl_foundation::Grid;
//! use gl_physics::prelude::*;
//!
//! # fn main() -> gl_foundation::GlResult<()> {
//! let config = ModelConfig::default();
//! let grid = Grid::regular(50, 40, 100.0, 0.0, 0.0)?;
//! let inputs = InputFields::new().with("usurf", grid.constant(3000.0));
//! let state = SimulationState::initialize(grid, &inputs, &config.init)?;
//! let velocity = VelocityModel::new(
//!     Box::new(ShallowIceEmulator::combined(78.0)),
//!     &config.iceflow,
//! )?;
//! let mut sim = Simulation::new(&config, state, velocity)?;
//! sim.run()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod erosion;
pub mod forcing;
pub mod iceflow;
pub mod inputs;
pub mod operators;
pub mod simulation;
pub mod state;
pub mod timestep;
pub mod transport;

/// 层级标识
pub const LAYER: u8 = 2;

pub use iceflow::{DifferentiableFieldMap, ModelSignature, ShallowIceEmulator, VelocityModel};
pub use inputs::InputFields;
pub use simulation::{Checkpoint, Simulation, TsRow};
pub use state::SimulationState;
pub use timestep::{StepOutcome, TimeController};

/// 常用类型
pub mod prelude {
    pub use crate::iceflow::{DifferentiableFieldMap, ShallowIceEmulator, VelocityModel};
    pub use crate::inputs::InputFields;
    pub use crate::simulation::{Checkpoint, Simulation};
    pub use crate::state::SimulationState;
}
