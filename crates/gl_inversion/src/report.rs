// crates/gl_inversion/src/report.rs

//! 反演诊断报告
//!
//! | 文件 | 内容 |
//! |------|------|
//! | `costs.dat` | 每次迭代 `COST_U COST_H COST_D COST_S REGU_H REGU_A` |
//! | `rms_std.dat` | 每次迭代冰厚、速度、散度、高程差值的 rms 与 std |
//! | `strflowctrl.dat` | 掩膜内流动控制场均值与标准差 |
//! | `volume.dat` | 冰量 [km³] |
//! | `summary.json` | [`InversionSummary`] |
//!
//! 数值表以 `#` 开头的表头行起始，空格分隔。

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use gl_foundation::{GlError, GlResult};

use crate::engine::{InversionHistory, InversionSummary};

/// `costs.dat` 表头
const COSTS_HEADER: &str = "COST_U COST_H COST_D COST_S REGU_H REGU_A";
/// `rms_std.dat` 表头
const RMS_STD_HEADER: &str = "rmsthk stdthk rmsvel stdvel rmsdiv stddiv rmsusurf stdusurf";

/// 格式化数值表
fn format_table<const N: usize>(
    header: Option<&str>,
    rows: &[[f64; N]],
    precision: usize,
) -> String {
    let mut out = String::new();
    if let Some(header) = header {
        let _ = writeln!(out, "# {header}");
    }
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.precision$}")).collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    out
}

fn write_file(path: &Path, content: &str) -> GlResult<()> {
    fs::write(path, content)
        .map_err(|e| GlError::io_with_source(format!("写入 {} 失败", path.display()), e))
}

/// 写出 `costs.dat`
pub fn write_costs(path: &Path, history: &InversionHistory) -> GlResult<()> {
    let rows: Vec<[f64; 6]> = history.costs.iter().map(|c| c.report_row()).collect();
    write_file(path, &format_table(Some(COSTS_HEADER), &rows, 10))
}

/// 写出 `rms_std.dat`
pub fn write_rms_std(path: &Path, history: &InversionHistory) -> GlResult<()> {
    let rows: Vec<[f64; 8]> = history.stats.iter().map(|s| s.report_row()).collect();
    write_file(path, &format_table(Some(RMS_STD_HEADER), &rows, 10))
}

/// 写出全部报告，返回写出的文件
pub fn write_reports(
    dir: &Path,
    history: &InversionHistory,
    summary: &InversionSummary,
) -> GlResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .map_err(|e| GlError::io_with_source(format!("创建目录 {} 失败", dir.display()), e))?;

    let costs = dir.join("costs.dat");
    write_costs(&costs, history)?;

    let rms_std = dir.join("rms_std.dat");
    write_rms_std(&rms_std, history)?;

    let strflowctrl = dir.join("strflowctrl.dat");
    write_file(
        &strflowctrl,
        &format!("{:.3}\n{:.3}\n", summary.strflowctrl_mean, summary.strflowctrl_std),
    )?;

    let volume = dir.join("volume.dat");
    write_file(&volume, &format!("{:.3}\n", summary.volume_km3))?;

    let json = dir.join("summary.json");
    let text = serde_json::to_string_pretty(summary)
        .map_err(|e| GlError::serialization(e.to_string()))?;
    write_file(&json, &text)?;

    log::info!("反演报告已写入 {}", dir.display());
    Ok(vec![costs, rms_std, strflowctrl, volume, json])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostBreakdown;
    use crate::stats::{IterationStats, RmsStd};

    fn history() -> InversionHistory {
        InversionHistory {
            costs: vec![
                CostBreakdown {
                    velsurf: 12.5,
                    regu_thk: 0.25,
                    ..Default::default()
                },
                CostBreakdown {
                    velsurf: 3.0,
                    ..Default::default()
                },
            ],
            stats: vec![
                IterationStats {
                    velsurf: RmsStd { rms: 2.0, std: 1.0 },
                    ..Default::default()
                };
                2
            ],
        }
    }

    #[test]
    fn test_table_format() {
        let text = format_table(Some("a b"), &[[1.0, 0.5], [2.0, -3.25]], 3);
        assert_eq!(text, "# a b\n1.000 0.500\n2.000 -3.250\n");
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let summary = InversionSummary {
            iterations: 2,
            stopped_early: false,
            final_cost: 3.0,
            volume_km3: 1.23456,
            strflowctrl_mean: 78.0,
            strflowctrl_std: 0.5,
        };
        let files = write_reports(dir.path(), &history(), &summary).unwrap();
        assert_eq!(files.len(), 5);

        let costs = fs::read_to_string(dir.path().join("costs.dat")).unwrap();
        let lines: Vec<&str> = costs.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("# COST_U"));
        assert!(lines[1].starts_with("12.5000000000 0.0000000000"));
        assert!(lines[1].ends_with("0.2500000000 0.0000000000"));

        let rms = fs::read_to_string(dir.path().join("rms_std.dat")).unwrap();
        assert_eq!(rms.lines().nth(1).unwrap().split_whitespace().count(), 8);

        let volume = fs::read_to_string(dir.path().join("volume.dat")).unwrap();
        assert_eq!(volume.trim(), "1.235");

        let json = fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let back: InversionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
