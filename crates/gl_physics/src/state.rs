// crates/gl_physics/src/state.rs

//! 模拟状态
//!
//! [`SimulationState`] 显式持有网格与全部二维字段，以引用传给各组件。
//!
//! # 字段归属
//!
//! | 字段 | 写入者 |
//! |------|--------|
//! | `thk`, `usurf`, `slopsurfx`, `slopsurfy`, `divflux` | 输运求解器 |
//! | `topg`, `dtopgdt` | 侵蚀更新器 |
//! | `smb` | 物质平衡 |
//! | 速度场 | 速度模型接口 |
//!
//! 不变量：每次修改 `thk` 或 `topg` 后 `usurf = topg + thk`，且 `thk >= 0`。

use serde::{Deserialize, Serialize};

use gl_config::InitConfig;
use gl_foundation::{Field, FieldName, GlError, GlResult, Grid};

use crate::inputs::InputFields;
use crate::operators::{compute_gradient, magnitude};

/// 冰体存在的厚度阈值 [m]
pub const THK_PRESENCE: f32 = 1.0;

/// 模拟状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    /// 网格
    pub grid: Grid,
    /// 冰厚
    pub thk: Field,
    /// 冰面高程
    pub usurf: Field,
    /// 基岩高程
    pub topg: Field,
    /// 冰面坡度 x
    pub slopsurfx: Field,
    /// 冰面坡度 y
    pub slopsurfy: Field,
    /// 垂向平均速度 x
    pub ubar: Field,
    /// 垂向平均速度 y
    pub vbar: Field,
    /// 冰面速度 x
    pub uvelsurf: Field,
    /// 冰面速度 y
    pub vvelsurf: Field,
    /// 冰底速度 x
    pub uvelbase: Field,
    /// 冰底速度 y
    pub vvelbase: Field,
    /// 表面物质平衡
    pub smb: Field,
    /// 综合流动控制场
    pub strflowctrl: Field,
    /// 流动律系数
    pub arrhenius: Field,
    /// 滑动系数
    pub slidingco: Field,
    /// 冰川掩膜
    pub icemask: Field,
    /// 通量散度
    pub divflux: Field,
    /// 冰厚变化率（观测）
    pub dhdt: Field,
    /// 侵蚀速率
    pub dtopgdt: Field,
}

impl SimulationState {
    /// 由输入字段初始化，缺失字段取缺省值
    ///
    /// - `usurf` 取 `usurfobs`，否则 `usurf`；两者都缺失时报错
    /// - `thk` 缺省为 0（缺测值也视为无冰），`topg = usurf - thk`
    /// - `icemask` 依次取 `icemask`、`mask`，否则全 1
    /// - `smb` 依次取 `smb`、`mb`，否则全 0
    /// - 流动参数缺失时取 [`InitConfig`] 常值
    pub fn initialize(grid: Grid, inputs: &InputFields, init: &InitConfig) -> GlResult<Self> {
        inputs.validate_shapes(&grid)?;

        let usurf = inputs
            .first_of(&["usurfobs", "usurf"])
            .cloned()
            .ok_or_else(|| GlError::missing_field("usurf"))?;

        let thk = inputs
            .get("thk")
            .map(|t| t.mapv(|v| if v.is_nan() { 0.0 } else { v.max(0.0) }))
            .unwrap_or_else(|| grid.zeros());

        let topg = &usurf - &thk;

        let icemask = inputs
            .first_of(&["icemask", "mask"])
            .cloned()
            .unwrap_or_else(|| grid.constant(1.0));

        let smb = inputs
            .first_of(&["smb", "mb"])
            .cloned()
            .unwrap_or_else(|| grid.zeros());

        let or_const = |name: &str, value: f64| {
            inputs
                .get(name)
                .cloned()
                .unwrap_or_else(|| grid.constant(value as f32))
        };
        let or_zeros = |name: &str| inputs.get(name).cloned().unwrap_or_else(|| grid.zeros());

        let (slopsurfx, slopsurfy) = compute_gradient(usurf.view(), grid.dx(), grid.dx());

        let state = Self {
            thk,
            topg,
            slopsurfx,
            slopsurfy,
            ubar: grid.zeros(),
            vbar: grid.zeros(),
            uvelsurf: or_zeros("uvelsurf"),
            vvelsurf: or_zeros("vvelsurf"),
            uvelbase: grid.zeros(),
            vvelbase: grid.zeros(),
            smb,
            strflowctrl: or_const("strflowctrl", init.strflowctrl),
            arrhenius: or_const("arrhenius", init.arrhenius),
            slidingco: or_const("slidingco", init.slidingco),
            icemask,
            divflux: grid.zeros(),
            dhdt: or_zeros("dhdt"),
            dtopgdt: grid.zeros(),
            usurf,
            grid,
        };

        log::debug!(
            "状态初始化完成: {}×{} 网格, dx={}, 初始冰量 {:.4} km³",
            state.grid.ny(),
            state.grid.nx(),
            state.grid.dx(),
            state.volume_km3()
        );
        Ok(state)
    }

    /// 按字段名只读访问
    pub fn field(&self, name: FieldName) -> &Field {
        match name {
            FieldName::Thk => &self.thk,
            FieldName::Usurf => &self.usurf,
            FieldName::Topg => &self.topg,
            FieldName::Slopsurfx => &self.slopsurfx,
            FieldName::Slopsurfy => &self.slopsurfy,
            FieldName::Ubar => &self.ubar,
            FieldName::Vbar => &self.vbar,
            FieldName::Uvelsurf => &self.uvelsurf,
            FieldName::Vvelsurf => &self.vvelsurf,
            FieldName::Uvelbase => &self.uvelbase,
            FieldName::Vvelbase => &self.vvelbase,
            FieldName::Smb => &self.smb,
            FieldName::Strflowctrl => &self.strflowctrl,
            FieldName::Arrhenius => &self.arrhenius,
            FieldName::Slidingco => &self.slidingco,
            FieldName::Icemask => &self.icemask,
            FieldName::Divflux => &self.divflux,
            FieldName::Dhdt => &self.dhdt,
            FieldName::Dtopgdt => &self.dtopgdt,
        }
    }

    /// 按字段名可写访问
    pub fn field_mut(&mut self, name: FieldName) -> &mut Field {
        match name {
            FieldName::Thk => &mut self.thk,
            FieldName::Usurf => &mut self.usurf,
            FieldName::Topg => &mut self.topg,
            FieldName::Slopsurfx => &mut self.slopsurfx,
            FieldName::Slopsurfy => &mut self.slopsurfy,
            FieldName::Ubar => &mut self.ubar,
            FieldName::Vbar => &mut self.vbar,
            FieldName::Uvelsurf => &mut self.uvelsurf,
            FieldName::Vvelsurf => &mut self.vvelsurf,
            FieldName::Uvelbase => &mut self.uvelbase,
            FieldName::Vvelbase => &mut self.vvelbase,
            FieldName::Smb => &mut self.smb,
            FieldName::Strflowctrl => &mut self.strflowctrl,
            FieldName::Arrhenius => &mut self.arrhenius,
            FieldName::Slidingco => &mut self.slidingco,
            FieldName::Icemask => &mut self.icemask,
            FieldName::Divflux => &mut self.divflux,
            FieldName::Dhdt => &mut self.dhdt,
            FieldName::Dtopgdt => &mut self.dtopgdt,
        }
    }

    /// 由 `usurf` 重算冰面坡度
    pub fn recompute_slopes(&mut self) {
        let dx = self.grid.dx();
        let (sx, sy) = compute_gradient(self.usurf.view(), dx, dx);
        self.slopsurfx = sx;
        self.slopsurfy = sy;
    }

    /// `usurf = topg + thk` 并重算坡度
    pub fn rebuild_surface(&mut self) {
        self.usurf = &self.topg + &self.thk;
        self.recompute_slopes();
    }

    /// 冰量 [km³]
    pub fn volume_km3(&self) -> f64 {
        let sum: f64 = self.thk.iter().map(|&h| h as f64).sum();
        sum * self.grid.cell_area() / 1e9
    }

    /// 冰川面积 [km²]（`thk > 1` 的单元）
    pub fn glaciated_area_km2(&self) -> f64 {
        let n = self.thk.iter().filter(|&&h| h > THK_PRESENCE).count();
        n as f64 * self.grid.cell_area() / 1e6
    }

    /// 垂向平均速度模
    pub fn velbar_mag(&self) -> Field {
        magnitude(self.ubar.view(), self.vbar.view())
    }

    /// 冰面速度模
    pub fn velsurf_mag(&self) -> Field {
        magnitude(self.uvelsurf.view(), self.vvelsurf.view())
    }

    /// 冰底速度模
    pub fn velbase_mag(&self) -> Field {
        magnitude(self.uvelbase.view(), self.vvelbase.view())
    }

    /// `usurf - topg - thk` 的最大绝对偏差
    pub fn surface_residual(&self) -> f32 {
        self.usurf
            .iter()
            .zip(self.topg.iter())
            .zip(self.thk.iter())
            .map(|((&s, &b), &h)| (s - b - h).abs())
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::regular(6, 4, 100.0, 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_usurf_is_required() {
        let err = SimulationState::initialize(grid(), &InputFields::new(), &InitConfig::default())
            .unwrap_err();
        assert!(matches!(err, GlError::MissingField { .. }));
    }

    #[test]
    fn test_defaults() {
        let g = grid();
        let inputs = InputFields::new().with("usurfobs", g.constant(2500.0));
        let state = SimulationState::initialize(g, &inputs, &InitConfig::default()).unwrap();

        assert!(state.thk.iter().all(|&h| h == 0.0));
        assert!(state.topg.iter().all(|&b| b == 2500.0));
        assert!(state.icemask.iter().all(|&m| m == 1.0));
        assert!(state.strflowctrl.iter().all(|&a| a == 78.0));
        assert!(state.slidingco.iter().all(|&c| c == 0.0));
        assert_eq!(state.surface_residual(), 0.0);
    }

    #[test]
    fn test_fallback_names() {
        let g = grid();
        let inputs = InputFields::new()
            .with("usurf", g.constant(100.0))
            .with("thk", g.constant(40.0))
            .with("mask", g.constant(0.0))
            .with("mb", g.constant(-2.0));
        let state = SimulationState::initialize(g, &inputs, &InitConfig::default()).unwrap();

        assert_eq!(state.topg[[0, 0]], 60.0);
        assert_eq!(state.icemask[[1, 1]], 0.0);
        assert_eq!(state.smb[[2, 2]], -2.0);
    }

    #[test]
    fn test_missing_thickness_cells_are_ice_free() {
        let g = grid();
        let mut thk = g.constant(10.0);
        thk[[0, 0]] = 1e36;
        let inputs = InputFields::new()
            .with("usurf", g.constant(100.0))
            .with("thk", thk);
        let state = SimulationState::initialize(g, &inputs, &InitConfig::default()).unwrap();
        assert_eq!(state.thk[[0, 0]], 0.0);
        assert_eq!(state.topg[[0, 0]], 100.0);
    }

    #[test]
    fn test_volume_and_area() {
        let g = grid();
        let mut thk = g.zeros();
        thk[[1, 1]] = 100.0;
        thk[[1, 2]] = 0.5;
        let inputs = InputFields::new()
            .with("usurf", g.constant(1000.0))
            .with("thk", thk);
        let state = SimulationState::initialize(g, &inputs, &InitConfig::default()).unwrap();

        // (100 + 0.5) m × 1e4 m² = 1.005e6 m³
        assert!((state.volume_km3() - 1.005e-3).abs() < 1e-9);
        // 仅一个单元超过 1 m
        assert!((state.glaciated_area_km2() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_field_accessors_agree() {
        let g = grid();
        let inputs = InputFields::new().with("usurf", g.constant(1.0));
        let mut state = SimulationState::initialize(g, &inputs, &InitConfig::default()).unwrap();
        state.field_mut(FieldName::Ubar).fill(3.0);
        assert_eq!(state.ubar[[0, 0]], 3.0);
        for name in FieldName::ALL {
            assert_eq!(state.field(name).dim(), (4, 6));
        }
    }
}
