pub mod base32;
pub mod config;
mod logger;
mod time;
mod address;
pub mod percent;

pub use logger::{setup_logger, parse_log_level};
pub use config::{Config, ConfigError, StoreBackend};
pub use time::AbsoluteTime;
pub use address::{Address, AddressError};
pub use self::base32::Base32Error;

/// 获取应用程序版本
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 获取应用程序名称
pub fn name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

/// 格式化字节大小为可读字符串
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes = bytes as f64;
    let base = 1024_f64;

    let exponent = (bytes.ln() / base.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes / base.powi(exponent as i32);

    format!("{:.2} {}", value, UNITS[exponent])
}
