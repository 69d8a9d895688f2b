use anyhow::{Context, Result};
use bart_logger::config::{Config, DEFAULT_CONFIG_FILE};
use bart_logger::logging::{LogConfig, init_logging, parse_level};
use clap::Parser;
use std::path::PathBuf;

/// 把批处理系统的记帐日志转换为 SGAS Usage Record
#[derive(Debug, Parser)]
#[command(name = "bart-logger", version, about)]
struct Cli {
    /// 配置文件
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// 日志文件（覆盖配置中的 logfile）
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<PathBuf>,

    /// 日志级别（覆盖配置中的 log_level）
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("加载配置文件失败: {}", cli.config.display()))?;

    let level = parse_level(cli.log_level.as_deref().unwrap_or(config.common.log_level.as_str()))?;
    let mut log_config = LogConfig::new().level(level);
    if let Some(path) = cli.log_file.or_else(|| config.common.logfile.clone()) {
        log_config = log_config.log_file(path);
    }
    let _guard = init_logging(log_config)?;

    let summary = bart_logger::run(&config).context("UR 生成失败")?;
    tracing::debug!(records = summary.records_written, "运行结束");
    Ok(())
}
