// apps/gl_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 加载并验证配置文件，打印各节摘要。

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use gl_config::{ModelConfig, SmbKind};
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== GlacioSim 配置验证 ===");
    let path = &args.config;

    if !path.exists() {
        bail!("配置文件不存在: {}", path.display());
    }

    let config = match ModelConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            error!("✗ {}", e);
            return Err(e).with_context(|| format!("配置文件 {} 无效", path.display()));
        }
    };

    print_summary(&config);

    let warnings = collect_warnings(&config);
    for w in &warnings {
        warn!("⚠ {}", w);
        println!("  ⚠ {}", w);
    }

    if args.strict && !warnings.is_empty() {
        bail!("严格模式下验证失败：{} 个警告", warnings.len());
    }
    println!("\n✓ 验证通过");
    Ok(())
}

fn print_summary(config: &ModelConfig) {
    println!("\n=== 时间 ===");
    println!(
        "区间 [{}, {}] a, 保存间隔 {} a, CFL {}, dtmax {} a",
        config.time.tstart, config.time.tend, config.time.tsave, config.time.cfl, config.time.dtmax
    );

    println!("\n=== 冰流 ===");
    println!(
        "块大小 {}, 速度上限 {}",
        config.iceflow.multiple_window_size, config.iceflow.force_max_velbar
    );

    println!("\n=== 物质平衡 ===");
    println!(
        "策略 {:?}, 更新间隔 {} a, 缩放 {}",
        config.smb.kind, config.smb.update_freq, config.smb.scaling
    );

    println!("\n=== 侵蚀 ===");
    if config.erosion.enabled {
        println!(
            "系数 {}, 指数 {}, 更新间隔 {} a",
            config.erosion.cst, config.erosion.exp, config.erosion.update_freq
        );
    } else {
        println!("关闭");
    }

    let inv = &config.inversion;
    println!("\n=== 反演 ===");
    println!("控制变量 {:?}", inv.control);
    println!("代价项 {:?}", inv.cost);
    println!(
        "迭代 {}..{}, 学习率 {}, 各向异性 {}, 提前停止 {}",
        inv.nbitmin, inv.nbitmax, inv.step_size, inv.smooth_anisotropy_factor, inv.early_stop
    );
    if let Some(file) = &inv.thk_profiles_file {
        println!("冰厚剖面 {}", file.display());
    }

    println!("\n输出目录 {}", config.output.directory.display());
}

/// 合法但可疑的设置
fn collect_warnings(config: &ModelConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.smb.kind == SmbKind::Simple && config.smb.simple.is_empty() {
        warnings.push("simple 物质平衡参数表为空".to_string());
    }
    if config.time.tsave > config.time.tend - config.time.tstart {
        warnings.push(format!(
            "保存间隔 {} a 大于模拟时长，只会记录起止时刻",
            config.time.tsave
        ));
    }
    if let Some(file) = &config.inversion.thk_profiles_file {
        if !file.exists() {
            warnings.push(format!("冰厚剖面文件不存在: {}", file.display()));
        }
    }
    if config.inversion.nbitmin > config.inversion.nbitmax {
        warnings.push("nbitmin 大于 nbitmax，提前停止不会生效".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_warnings() {
        assert!(collect_warnings(&ModelConfig::default()).is_empty());
    }

    #[test]
    fn test_suspicious_settings() {
        let mut config = ModelConfig::default();
        config.inversion.nbitmin = 2000;
        config.time.tsave = 1000.0;
        assert_eq!(collect_warnings(&config).len(), 2);
    }
}
