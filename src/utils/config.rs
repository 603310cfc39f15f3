use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// 块存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 进程内存储，重启后丢失
    Memory,
    /// sled持久化存储
    Sled,
}

/// 节点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据目录
    pub data_dir: PathBuf,

    /// 节点私钥文件路径（相对路径基于数据目录）
    pub key_file: PathBuf,

    /// 日志级别
    pub log_level: String,

    /// 块存储后端
    pub store: StoreBackend,

    /// HELLO块的有效期（秒）
    pub hello_ttl_secs: u64,

    /// 在HELLO中公布的地址（URI形式）
    pub addresses: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            key_file: PathBuf::from("peer.json"),
            log_level: "info".to_string(),
            store: StoreBackend::Sled,
            hello_ttl_secs: 12 * 3600,
            addresses: vec![],
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // 文件不存在时使用默认配置
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut file = File::open(path)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;

        Ok(())
    }

    /// 检查配置值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hello_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue("hello_ttl_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// 确保数据目录存在
    pub fn ensure_data_dir(&self) -> Result<(), ConfigError> {
        create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// 获取私钥文件路径
    pub fn key_file_path(&self) -> PathBuf {
        if self.key_file.is_absolute() {
            self.key_file.clone()
        } else {
            self.data_dir.join(&self.key_file)
        }
    }

    /// sled数据库目录
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }
}
