// crates/gl_inversion/src/observations.rs

//! 反演观测数据
//!
//! - 栅格观测：冰面高程、冰面速度、冰川掩膜、可选冰厚
//! - 冰厚剖面：空白分隔文本 `id x y thk std`，按整数 id 分组
//! - 人工数据空洞：检验反演对缺测的稳健性

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use gl_foundation::{Field, GlError, GlResult, Grid};
use gl_physics::inputs::InputFields;

use crate::cost::GLACIATED;
use crate::error::{InversionError, InversionResult};

/// 数据空洞随机种子
const HOLES_SEED: u64 = 123;

/// 栅格观测
#[derive(Debug, Clone)]
pub struct Observations {
    /// 冰面高程
    pub usurfobs: Field,
    /// 冰面速度 x
    pub uvelsurfobs: Option<Field>,
    /// 冰面速度 y
    pub vvelsurfobs: Option<Field>,
    /// 观测冰川掩膜
    pub icemaskobs: Field,
    /// 冰厚观测（NaN 为缺测）
    pub thkobs: Option<Field>,
    /// 冰厚初值
    pub thkinit: Option<Field>,
}

impl Observations {
    /// 从输入字段提取观测
    ///
    /// `usurfobs` 缺失时退回 `usurf`；掩膜依次取 `icemaskobs`、`icemask`、`mask`，否则全 1。
    pub fn from_inputs(inputs: &InputFields, grid: &Grid) -> GlResult<Self> {
        inputs.validate_shapes(grid)?;
        let usurfobs = inputs
            .first_of(&["usurfobs", "usurf"])
            .cloned()
            .ok_or_else(|| GlError::missing_field("usurfobs"))?;
        let icemaskobs = inputs
            .first_of(&["icemaskobs", "icemask", "mask"])
            .cloned()
            .unwrap_or_else(|| grid.constant(1.0));

        Ok(Self {
            usurfobs,
            uvelsurfobs: inputs.get("uvelsurfobs").cloned(),
            vvelsurfobs: inputs.get("vvelsurfobs").cloned(),
            icemaskobs,
            thkobs: inputs.get("thkobs").cloned(),
            thkinit: inputs.get("thkinit").cloned(),
        })
    }

    /// 是否同时有两个速度分量
    pub fn has_velocity(&self) -> bool {
        self.uvelsurfobs.is_some() && self.vvelsurfobs.is_some()
    }

    /// 掩膜内单元数
    pub fn glaciated_cells(&self) -> usize {
        self.icemaskobs.iter().filter(|&&m| m > 0.5).count()
    }

    /// 在速度观测中制造人工空洞
    ///
    /// - `1..=98`：随机空洞覆盖掩膜内该百分比的单元
    /// - `100`：去掉全部速度观测
    /// - `200`：去掉 `y` 大于平均值的上半区
    ///
    /// 同时去掉掩膜（`== 1`）之外的速度观测。
    pub fn make_holes(&mut self, mode: u32, grid: &Grid) {
        if mode == 0 {
            return;
        }
        let (ny, nx) = grid.shape();
        let mut holes = ndarray::Array2::<bool>::from_elem((ny, nx), false);

        match mode {
            1..=98 => {
                let target = mode as f64 * 0.01;
                let glaciated = self.glaciated_cells();
                if glaciated > 0 {
                    let mut rng = StdRng::seed_from_u64(HOLES_SEED);
                    let mut count = 0usize;
                    while (count as f64) / (glaciated as f64) < target {
                        let j = rng.gen_range(0..ny);
                        let i = rng.gen_range(0..nx);
                        if self.icemaskobs[[j, i]] > 0.5 && !holes[[j, i]] {
                            holes[[j, i]] = true;
                            count += 1;
                        }
                    }
                }
            }
            100 => holes.fill(true),
            200 => {
                let y = grid.y();
                let mean = y.iter().map(|&v| v as f64).sum::<f64>() / y.len() as f64;
                for ((j, _), h) in holes.indexed_iter_mut() {
                    *h = y[j] as f64 > mean;
                }
            }
            _ => {}
        }

        let mask = &self.icemaskobs;
        for obs in [self.uvelsurfobs.as_mut(), self.vvelsurfobs.as_mut()]
            .into_iter()
            .flatten()
        {
            ndarray::Zip::from(obs)
                .and(mask)
                .and(&holes)
                .for_each(|v, &m, &hole| {
                    if m != GLACIATED || hole {
                        *v = f32::NAN;
                    }
                });
        }

        let n_holes = holes.iter().filter(|&&h| h).count();
        log::info!("人工数据空洞: 模式 {mode}, {n_holes} 个单元");
    }
}

// ============================================================================
// 冰厚剖面
// ============================================================================

/// 剖面测点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfilePoint {
    /// 剖面编号
    pub id: u32,
    /// 沿剖面累积距离
    pub distance: f64,
    /// x 坐标
    pub x: f64,
    /// y 坐标
    pub y: f64,
    /// 冰厚
    pub thk: f32,
    /// 冰厚标准差
    pub std: f32,
}

/// 剖面文件的一行
#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: f64,
    x: f64,
    y: f64,
    thk: f64,
    std: f64,
}

/// 冰厚剖面集合
#[derive(Debug, Clone, Default)]
pub struct ThicknessProfiles {
    profiles: Vec<Vec<ProfilePoint>>,
}

impl ThicknessProfiles {
    /// 读取剖面文件
    pub fn load<P: AsRef<Path>>(path: P) -> InversionResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InversionError::ProfileFileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// 解析空格分隔的 `id x y thk std` 文本，`#` 开头为注释
    pub fn parse(text: &str, path: &Path) -> InversionResult<Self> {
        let format_error = |line: usize, message: String| InversionError::ProfileFormat {
            path: path.to_path_buf(),
            line,
            message,
        };

        let normalized = text.replace('\t', " ");
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .comment(Some(b'#'))
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(normalized.as_bytes());

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| {
                let line = e.position().map_or(0, |p| p.line() as usize);
                format_error(line, e.to_string())
            })?;
            let line = record.position().map_or(0, |p| p.line() as usize);

            // 连续空格产生空字段
            let fields: csv::StringRecord = record.iter().filter(|f| !f.is_empty()).collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 5 {
                return Err(format_error(
                    line,
                    format!("需要 5 列，实际 {} 列", fields.len()),
                ));
            }
            let row: ProfileRow = fields
                .deserialize(None)
                .map_err(|e| format_error(line, e.to_string()))?;
            rows.push((row.id, row.x, row.y, row.thk, row.std));
        }
        Ok(Self::from_rows(&rows))
    }

    /// 由 `(id, x, y, thk, std)` 行构造，按 `floor(id)` 分组并计算累积距离
    pub fn from_rows(rows: &[(f64, f64, f64, f64, f64)]) -> Self {
        let max_id = rows.iter().map(|r| r.0.floor()).fold(0.0, f64::max) as u32;
        let mut profiles = Vec::new();
        for id in 1..=max_id {
            let mut points: Vec<ProfilePoint> = rows
                .iter()
                .filter(|r| r.0.floor() as u32 == id && r.0 >= 1.0)
                .map(|&(_, x, y, thk, std)| ProfilePoint {
                    id,
                    distance: 0.0,
                    x,
                    y,
                    thk: thk as f32,
                    std: std as f32,
                })
                .collect();
            if points.is_empty() {
                continue;
            }
            for k in 1..points.len() {
                let (dx, dy) = (points[k].x - points[k - 1].x, points[k].y - points[k - 1].y);
                points[k].distance = points[k - 1].distance + (dx * dx + dy * dy).sqrt();
            }
            profiles.push(points);
        }
        Self { profiles }
    }

    /// 剖面列表
    pub fn profiles(&self) -> &[Vec<ProfilePoint>] {
        &self.profiles
    }

    /// 全部测点（按剖面顺序展开）
    pub fn points(&self) -> impl Iterator<Item = &ProfilePoint> {
        self.profiles.iter().flatten()
    }

    /// 测点总数
    pub fn len(&self) -> usize {
        self.profiles.iter().map(Vec::len).sum()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
