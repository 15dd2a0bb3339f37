// crates/gl_inversion/src/regression.rs

//! 通量散度对高程的最小二乘直线拟合

/// 直线拟合结果 `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// 斜率
    pub slope: f64,
    /// 截距
    pub intercept: f64,
}

impl LinearFit {
    /// 求值
    #[inline]
    pub fn eval(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// 普通最小二乘直线拟合
///
/// 空样本返回 `None`；`x` 无方差时斜率取 0、截距取 `y` 的均值。
pub fn linregress<I>(samples: I) -> Option<LinearFit>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (mut n, mut sx, mut sy) = (0usize, 0.0, 0.0);
    let pts: Vec<(f64, f64)> = samples.into_iter().collect();
    for &(x, y) in &pts {
        n += 1;
        sx += x;
        sy += y;
    }
    if n == 0 {
        return None;
    }
    let (mx, my) = (sx / n as f64, sy / n as f64);

    let (mut sxx, mut sxy) = (0.0, 0.0);
    for &(x, y) in &pts {
        sxx += (x - mx) * (x - mx);
        sxy += (x - mx) * (y - my);
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    Some(LinearFit {
        slope,
        intercept: my - slope * mx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let fit = linregress((0..10).map(|i| (i as f64, 2.0 - 0.5 * i as f64))).unwrap();
        assert!((fit.slope + 0.5).abs() < 1e-12);
        assert!((fit.intercept - 2.0).abs() < 1e-12);
        assert!((fit.eval(4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate() {
        assert!(linregress(std::iter::empty()).is_none());
        let fit = linregress([(1.0, 3.0), (1.0, 5.0)]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 4.0);
    }
}
