use dht_core::cli::{self, Args, CommandContext};
use dht_core::utils::{self, parse_log_level, setup_logger, Config};

use clap::Parser;
use colored::*;
use log::{debug, LevelFilter};
use std::path::PathBuf;
use std::process;

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    // 加载配置文件
    let config_path = args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dht-core")
            .join("config.json")
    });
    let config = Config::load(&config_path)?;
    // 首次运行时保存默认配置
    if !config_path.exists() {
        config.save(&config_path)?;
    }

    // 初始化日志
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        let level = args.log_level.as_deref().unwrap_or(&config.log_level);
        parse_log_level(level).map_err(anyhow::Error::msg)?
    };
    setup_logger(Some(level));

    debug!("{} v{} using {}", utils::name(), utils::version(), config_path.display());

    let ctx = CommandContext::new(config);
    let result = cli::run(&args.command, &ctx)?;
    cli::print_result(&result);

    Ok(())
}
