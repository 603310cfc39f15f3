pub mod commands;
pub mod helpers;

pub use commands::{CommandContext, CommandResult};

use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

/// 命令行参数
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// 日志级别（覆盖配置）
    #[clap(long)]
    pub log_level: Option<String>,

    /// 启用详细日志
    #[clap(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 生成节点私钥
    Keygen {
        #[clap(long, action = ArgAction::SetTrue)]
        force: bool,
    },

    /// 生成并签名HELLO
    Hello {
        /// 公布的地址，例如 ip+udp://1.2.3.4:2086
        #[clap(long = "addr", action = ArgAction::Append)]
        addrs: Vec<String>,

        /// 有效期（秒）
        #[clap(long)]
        ttl: Option<u64>,
    },

    /// 解析HELLO URL
    ParseHello {
        url: String,

        /// 拒绝已过期的HELLO
        #[clap(long, action = ArgAction::SetTrue)]
        strict: bool,
    },

    /// 生成区域私钥
    ZoneKeygen {
        #[clap(long)]
        out: PathBuf,
    },

    /// 发布GNS文本记录
    GnsPublish {
        #[clap(long)]
        zone: PathBuf,

        #[clap(long)]
        label: String,

        #[clap(long)]
        value: String,

        #[clap(long, default_value = "3600")]
        ttl: u64,
    },

    /// 查找GNS记录
    GnsLookup {
        /// 区域公钥（base32）
        #[clap(long)]
        zone_key: String,

        #[clap(long)]
        label: String,
    },

    /// 列出本地存储的块
    StoreList,
}

/// 执行命令
pub fn run(command: &Command, ctx: &CommandContext) -> anyhow::Result<CommandResult> {
    match command {
        Command::Keygen { force } => commands::keygen(ctx, *force),
        Command::Hello { addrs, ttl } => commands::hello(ctx, addrs, *ttl),
        Command::ParseHello { url, strict } => commands::parse_hello(url, *strict),
        Command::ZoneKeygen { out } => commands::zone_keygen(out),
        Command::GnsPublish { zone, label, value, ttl } => {
            commands::gns_publish(ctx, zone, label, value, *ttl)
        }
        Command::GnsLookup { zone_key, label } => commands::gns_lookup(ctx, zone_key, label),
        Command::StoreList => commands::store_list(ctx),
    }
}

/// 打印命令结果
pub fn print_result(result: &CommandResult) {
    match result {
        CommandResult::Success(message) => {
            println!("{} {}", "Success:".green().bold(), message);
        }
        CommandResult::Info(message) => {
            println!("{}", message);
        }
        CommandResult::Warning(message) => {
            println!("{} {}", "Warning:".yellow().bold(), message);
        }
    }
}
