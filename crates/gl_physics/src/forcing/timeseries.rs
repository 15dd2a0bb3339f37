// crates/gl_physics/src/forcing/timeseries.rs

//! 时间序列数据结构和插值
//!
//! 分段线性插值，超出数据范围时取端点值（截断外推）。
//! 用于物质平衡参数表和古气候温度信号。
//!
//! # 使用示例
//!
//! ```
//! use gl_physics::forcing::timeseries::TimeSeries;
//!
//! let series = TimeSeries::new(vec![0.0, 10.0], vec![2800.0, 2900.0]).unwrap();
//! assert_eq!(series.get_value(5.0), 2850.0);
//! assert_eq!(series.get_value(-100.0), 2800.0);
//! ```

use serde::{Deserialize, Serialize};

use gl_foundation::{GlError, GlResult};

/// 时间序列数据
///
/// # 约束
///
/// - 时间数组必须严格单调递增
/// - 时间和值数组长度必须相等且非空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// 从时间和值数组创建时间序列
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> GlResult<Self> {
        if times.len() != values.len() {
            return Err(GlError::invalid_input(format!(
                "时间与值长度不一致: {} vs {}",
                times.len(),
                values.len()
            )));
        }
        if times.is_empty() {
            return Err(GlError::invalid_input("时间序列不能为空"));
        }
        for i in 1..times.len() {
            if times[i] <= times[i - 1] {
                return Err(GlError::invalid_input(format!(
                    "时间必须严格递增: times[{}]={} <= times[{}]={}",
                    i,
                    times[i],
                    i - 1,
                    times[i - 1]
                )));
            }
        }
        Ok(Self { times, values })
    }

    /// 从 (时间, 值) 点对列表创建时间序列
    pub fn from_points(points: &[(f64, f64)]) -> GlResult<Self> {
        let (times, values): (Vec<_>, Vec<_>) = points.iter().copied().unzip();
        Self::new(times, values)
    }

    /// 获取时间范围
    pub fn time_range(&self) -> (f64, f64) {
        (self.times[0], self.times[self.times.len() - 1])
    }

    /// 获取数据点数量
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// 插值
    pub fn get_value(&self, t: f64) -> f64 {
        let n = self.times.len();
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }

        // 二分查找区间 [times[i], times[i+1])
        let i = match self
            .times
            .binary_search_by(|x| x.total_cmp(&t))
        {
            Ok(idx) => return self.values[idx],
            Err(idx) => idx - 1,
        };

        let (t0, t1) = (self.times[i], self.times[i + 1]);
        let (v0, v1) = (self.values[i], self.values[i + 1]);
        let w = (t - t0) / (t1 - t0);
        v0 + w * (v1 - v0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_interpolation() {
        let s = TimeSeries::new(vec![0.0, 1.0, 3.0], vec![0.0, 10.0, 30.0]).unwrap();
        assert!((s.get_value(0.5) - 5.0).abs() < 1e-12);
        assert!((s.get_value(2.0) - 20.0).abs() < 1e-12);
        assert_eq!(s.get_value(1.0), 10.0);
    }

    #[test]
    fn test_clamp_outside_range() {
        let s = TimeSeries::from_points(&[(-30000.0, -9.0), (0.0, 0.0)]).unwrap();
        assert_eq!(s.get_value(-50000.0), -9.0);
        assert_eq!(s.get_value(100.0), 0.0);
        assert_eq!(s.time_range(), (-30000.0, 0.0));
    }

    #[test]
    fn test_single_point_is_constant() {
        let s = TimeSeries::new(vec![1900.0], vec![2.0]).unwrap();
        assert_eq!(s.get_value(0.0), 2.0);
        assert_eq!(s.get_value(5000.0), 2.0);
    }

    #[test]
    fn test_rejects_non_monotonic() {
        assert!(TimeSeries::new(vec![0.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(TimeSeries::new(vec![], vec![]).is_err());
        assert!(TimeSeries::new(vec![0.0], vec![1.0, 2.0]).is_err());
    }
}
