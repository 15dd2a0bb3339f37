// crates/gl_physics/src/forcing/mod.rs

//! 外部强迫
//!
//! - [`timeseries`]: 截断外推的分段线性时间序列
//! - [`smb`]: 表面物质平衡策略与更新节流

pub mod smb;
pub mod timeseries;

pub use smb::{MassBalanceUpdater, SmbModel};
pub use timeseries::TimeSeries;
