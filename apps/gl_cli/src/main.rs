// apps/gl_cli/src/main.rs

//! GlacioSim 命令行界面
//!
//! 冰川正演模拟与数据同化反演的命令行工具。
//!
//! # 架构层级
//!
//! 本模块属于 **Layer 4: Application**：
//! - 加载 `ModelConfig`，构造内置的浅冰近似速度模型
//! - 安装日志订阅器，库中的 `log` 记录一并输出
//!
//! # 日志过滤
//!
//! `--log-level` 作用于本工作区的各个 crate，其余依赖只输出警告。
//! 设置环境变量 `GLACIOSIM_LOG`（`EnvFilter` 语法）时以其为准，例如
//! `GLACIOSIM_LOG=gl_inversion::engine=debug`。

mod commands;
mod synthetic;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// 覆盖 `--log-level` 的环境变量
const LOG_ENV: &str = "GLACIOSIM_LOG";

/// 受 `--log-level` 控制的 crate
const WORKSPACE_CRATES: [&str; 5] = [
    "gl_cli",
    "gl_foundation",
    "gl_config",
    "gl_physics",
    "gl_inversion",
];

/// GlacioSim 冰川模拟与反演命令行工具
#[derive(Parser)]
#[command(name = "gl_cli")]
#[command(author = "GlacioSim Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "GlacioSim glacier evolution and inversion engine", long_about = None)]
struct Cli {
    /// 工作区 crate 的日志级别
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// 日志带运行时长时间戳
    #[arg(long)]
    timestamps: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// 依赖输出警告，工作区 crate 取本级别
    fn filter(self) -> EnvFilter {
        WORKSPACE_CRATES
            .iter()
            .fold(EnvFilter::new("warn"), |filter, krate| {
                match format!("{krate}={}", self.directive()).parse() {
                    Ok(directive) => filter.add_directive(directive),
                    Err(_) => filter,
                }
            })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 运行正演模拟
    Run(commands::run::RunArgs),
    /// 孪生反演实验
    Invert(commands::invert::InvertArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

impl Commands {
    fn execute(self) -> Result<()> {
        match self {
            Commands::Run(args) => commands::run::execute(args),
            Commands::Invert(args) => commands::invert::execute(args),
            Commands::Validate(args) => commands::validate::execute(args),
        }
    }
}

/// 安装订阅器，同时接管 `log` 记录
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| cli.log_level.filter());
    let builder = fmt().with_env_filter(filter).with_target(false);
    if cli.timestamps {
        builder.with_timer(fmt::time::uptime()).finish().try_init()?;
    } else {
        builder.without_time().finish().try_init()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    cli.command.execute()
}
