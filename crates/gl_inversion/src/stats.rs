// crates/gl_inversion/src/stats.rs

//! 反演诊断统计：模型与观测之差的均方根与标准差

use serde::{Deserialize, Serialize};

/// 一组差值的 `(rms, std)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RmsStd {
    /// 均方根
    pub rms: f64,
    /// 标准差（总体）
    pub std: f64,
}

impl RmsStd {
    /// 由差值序列计算，NaN 被忽略，空序列为 0
    pub fn from_diffs<I>(diffs: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (mut n, mut sum, mut sum2) = (0usize, 0.0, 0.0);
        for d in diffs.into_iter().filter(|d| !d.is_nan()) {
            n += 1;
            sum += d;
            sum2 += d * d;
        }
        if n == 0 {
            return Self::default();
        }
        let n = n as f64;
        let mean = sum / n;
        Self {
            rms: (sum2 / n).sqrt(),
            std: (sum2 / n - mean * mean).max(0.0).sqrt(),
        }
    }
}

/// 单次迭代的诊断统计行
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// 冰厚
    pub thk: RmsStd,
    /// 冰面速度模
    pub velsurf: RmsStd,
    /// 通量散度
    pub divflux: RmsStd,
    /// 冰面高程
    pub usurf: RmsStd,
}

impl IterationStats {
    /// `rms_std.dat` 中的一行
    pub fn report_row(&self) -> [f64; 8] {
        [
            self.thk.rms,
            self.thk.std,
            self.velsurf.rms,
            self.velsurf.std,
            self.divflux.rms,
            self.divflux.std,
            self.usurf.rms,
            self.usurf.std,
        ]
    }
}
