//! Service Prober 主程序入口
//!
//! 黑盒探测与告警引擎

use anyhow::{Context, Result};
use clap::Parser;
use service_prober::cli::args::{Args, Commands};
use service_prober::cli::commands::{
    CheckCommand, Command, RunCommand, TestNotificationCommand, ValidateCommand, VersionCommand,
};
use service_prober::config::{ConfigLoader, TomlConfigLoader};
use service_prober::logging::{self, LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 命令行未指定日志级别时尝试读取配置文件中的值
    let level = match args.log_level {
        Some(level) => level.into(),
        None => config_log_level(&args).await,
    };
    let log_config = LogConfig {
        level,
        console: true,
        json_format: false,
        ..Default::default()
    };
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Service Prober v{} 启动", service_prober::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 读取配置文件中的日志级别，失败时使用 info
async fn config_log_level(args: &Args) -> log::LevelFilter {
    let loader = TomlConfigLoader::new(true);
    match loader.load_from_file(&args.get_config_path()).await {
        Ok(config) => logging::parse_level(&config.global.log_level).unwrap_or(log::LevelFilter::Info),
        Err(_) => log::LevelFilter::Info,
    }
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Run => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
        Commands::TestNotification { .. } => Box::new(TestNotificationCommand),
    };
    command.execute(args).await.map_err(|e| anyhow::anyhow!(e))
}
