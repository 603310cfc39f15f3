use crate::blocks::{
    Block, BlockHandlers, BlockType, GenericQuery, GnsBlock, GnsQuery, GnsVerification,
    HelloBlock, Query, RouteFlags,
};
use crate::cli::helpers::{abbreviate, format_hello, format_record, format_table};
use crate::crypto::{PeerPrivateKey, ZoneKey, ZonePrivate};
use crate::dht::{open_store, BlockStore, DhtEntry, StoreError};
use crate::gns::{RecordSet, ResourceRecord};
use crate::utils::{format_bytes, Address, AbsoluteTime, Config};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 命令结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Success(String),
    Info(String),
    Warning(String),
}

/// 命令上下文
///
/// 块存储在第一次使用时打开，之后的命令共用同一个句柄。
pub struct CommandContext {
    pub config: Config,
    pub handlers: BlockHandlers,
    store: OnceCell<Box<dyn BlockStore>>,
}

impl CommandContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handlers: BlockHandlers::new(),
            store: OnceCell::new(),
        }
    }

    fn store(&self) -> Result<&dyn BlockStore> {
        if let Some(store) = self.store.get() {
            return Ok(store.as_ref());
        }
        self.config.ensure_data_dir()?;
        let opened = open_store(&self.config)?;
        debug!("Opened {:?} block store in {}", self.config.store, self.config.data_dir.display());
        Ok(self.store.get_or_init(|| opened).as_ref())
    }

    /// 把存储中的改动写入磁盘
    pub fn flush(&self) -> Result<()> {
        if let Some(store) = self.store.get() {
            store.close()?;
        }
        Ok(())
    }
}

/// 节点私钥文件
#[derive(Serialize, Deserialize)]
struct PeerKeyFile {
    peer_id: String,
    private_key: PeerPrivateKey,
}

/// 区域私钥文件
#[derive(Serialize, Deserialize)]
struct ZoneKeyFile {
    zone: String,
    private_key: ZonePrivate,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn load_peer_key(config: &Config) -> Result<PeerPrivateKey> {
    let path = config.key_file_path();
    let content = fs::read_to_string(&path)
        .with_context(|| format!("No peer key at {} (run `keygen` first)", path.display()))?;
    let file: PeerKeyFile = serde_json::from_str(&content)?;
    Ok(file.private_key)
}

fn load_zone_key(path: &Path) -> Result<ZonePrivate> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read zone key {}", path.display()))?;
    let file: ZoneKeyFile = serde_json::from_str(&content)?;
    Ok(file.private_key)
}

/// 生成节点私钥
pub fn keygen(ctx: &CommandContext, force: bool) -> Result<CommandResult> {
    let path = ctx.config.key_file_path();
    if path.exists() && !force {
        return Ok(CommandResult::Warning(format!(
            "Key file {} already exists (use --force to overwrite)", path.display()
        )));
    }

    let key = PeerPrivateKey::generate();
    let peer_id = key.peer_id()?;
    write_json(&path, &PeerKeyFile { peer_id: peer_id.to_string(), private_key: key })?;
    info!("Wrote peer key to {}", path.display());

    Ok(CommandResult::Success(format!("Peer ID: {}", peer_id)))
}

/// 生成并签名本节点的HELLO，同时存入本地存储
pub fn hello(ctx: &CommandContext, addrs: &[String], ttl: Option<u64>) -> Result<CommandResult> {
    let key = load_peer_key(&ctx.config)?;

    let uris = if addrs.is_empty() { &ctx.config.addresses[..] } else { addrs };
    let addresses = uris.iter()
        .map(|uri| Address::parse(uri).with_context(|| format!("Bad address {}", uri)))
        .collect::<Result<Vec<_>>>()?;
    if addresses.is_empty() {
        return Ok(CommandResult::Warning("No addresses to advertise".to_string()));
    }

    let ttl = Duration::from_secs(ttl.unwrap_or(ctx.config.hello_ttl_secs));
    let mut block = HelloBlock::new(key.peer_id()?, addresses, ttl);
    block.sign(&key)?;

    let handler = ctx.handlers.get(BlockType::DHT_HELLO)
        .ok_or_else(|| anyhow!("No HELLO handler registered"))?;
    if !handler.validate_block_store_request(&block) {
        bail!("Generated HELLO failed validation");
    }

    let query = GenericQuery::new(block.query_key(), BlockType::DHT_HELLO, RouteFlags::NONE);
    let store = ctx.store()?;
    store.put(&query, DhtEntry::from_block(&block))?;
    ctx.flush()?;

    Ok(CommandResult::Success(format!(
        "{}\n{}",
        block.url(),
        hex::encode(block.to_bytes())
    )))
}

/// 解析HELLO URL并检查签名
pub fn parse_hello(url: &str, strict: bool) -> Result<CommandResult> {
    let block = HelloBlock::parse_url(url, strict)?;
    let valid = block.verify()?;
    debug!("Parsed HELLO for {} ({} addresses)", block.peer_id(), block.addresses().len());

    let text = format_hello(&block, valid);
    if valid {
        Ok(CommandResult::Info(text))
    } else {
        Ok(CommandResult::Warning(text))
    }
}

/// 生成区域私钥
pub fn zone_keygen(out: &Path) -> Result<CommandResult> {
    if out.exists() {
        return Ok(CommandResult::Warning(format!("{} already exists", out.display())));
    }

    let zone = ZonePrivate::generate();
    let public = zone.public()?;
    write_json(out, &ZoneKeyFile { zone: public.to_string(), private_key: zone })?;

    Ok(CommandResult::Success(format!("Zone: {}", public)))
}

/// 在区域标签下发布一条文本记录
pub fn gns_publish(
    ctx: &CommandContext,
    zone_file: &Path,
    label: &str,
    value: &str,
    ttl: u64,
) -> Result<CommandResult> {
    let zone = load_zone_key(zone_file)?;
    let expiration = AbsoluteTime::now().add(Duration::from_secs(ttl));
    let records = RecordSet::new(vec![ResourceRecord::txt(value, expiration)]);

    let block = GnsBlock::publish_records(&zone, label, &records)?;
    let handler = ctx.handlers.get(BlockType::GNS_NAMERECORD)
        .ok_or_else(|| anyhow!("No GNS handler registered"))?;
    if !handler.validate_block_store_request(&block) {
        bail!("Published block failed validation");
    }

    let query = GnsQuery::new(zone.public()?, label)?;
    let store = ctx.store()?;
    store.put(&query, DhtEntry::from_block(&block))?;
    ctx.flush()?;

    Ok(CommandResult::Success(format!(
        "Published {} record(s) under '{}' at key {}",
        records.len(), label, query.key()
    )))
}

/// 查找区域标签下的记录
pub fn gns_lookup(ctx: &CommandContext, zone_key: &str, label: &str) -> Result<CommandResult> {
    let zone = ZoneKey::from_str(zone_key)?;
    let query = GnsQuery::new(zone, label)?;

    let store = ctx.store()?;
    let entry = match store.get(&query) {
        Ok(entry) => entry,
        Err(StoreError::NotFound) => {
            return Ok(CommandResult::Warning(format!("No records for '{}'", label)));
        }
        Err(StoreError::Expired) => {
            return Ok(CommandResult::Warning(format!("Records for '{}' have expired", label)));
        }
        Err(e) => return Err(e.into()),
    };

    let parsed = ctx.handlers.parse_block(entry.block_type(), &entry.data)?;
    let block = parsed.as_any()
        .downcast_ref::<GnsBlock>()
        .ok_or_else(|| anyhow!("Stored block is not a GNS block"))?;

    let mut state = GnsVerification::new();
    let plaintext = state.decrypt(&query, block)?;
    let records = RecordSet::from_bytes(plaintext)?;

    let lines = records.records.iter()
        .map(format_record)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(CommandResult::Info(lines))
}

/// 列出本地存储中的块
pub fn store_list(ctx: &CommandContext) -> Result<CommandResult> {
    let store = ctx.store()?;
    let keys = store.list()?;
    if keys.is_empty() {
        return Ok(CommandResult::Info("Store is empty".to_string()));
    }

    let mut rows = Vec::with_capacity(keys.len());
    for key in keys {
        let query = GenericQuery::new(key, BlockType::ANY, RouteFlags::NONE);
        let row = match store.get(&query) {
            Ok(entry) => vec![
                abbreviate(&key.to_string(), 24),
                entry.block_type().to_string(),
                format_bytes(entry.data.len()),
                entry.expiration.to_string(),
            ],
            Err(StoreError::Expired) => vec![
                abbreviate(&key.to_string(), 24),
                "-".to_string(),
                "-".to_string(),
                "expired".to_string(),
            ],
            Err(e) => return Err(e.into()),
        };
        rows.push(row);
    }

    Ok(CommandResult::Info(format_table(
        &["Key", "Type", "Size", "Expires"],
        &rows,
        &[24, 16, 10, 24],
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::StoreBackend;

    fn test_context(dir: &Path) -> CommandContext {
        CommandContext::new(Config {
            data_dir: dir.to_path_buf(),
            store: StoreBackend::Sled,
            addresses: vec!["ip+udp://127.0.0.1:2086".to_string()],
            ..Config::default()
        })
    }

    #[test]
    fn test_keygen_and_hello() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        assert!(matches!(keygen(&ctx, false).unwrap(), CommandResult::Success(_)));
        assert!(matches!(keygen(&ctx, false).unwrap(), CommandResult::Warning(_)));

        let out = match hello(&ctx, &[], Some(600)).unwrap() {
            CommandResult::Success(out) => out,
            other => panic!("unexpected {:?}", other),
        };
        let url = out.lines().next().unwrap();
        assert!(matches!(parse_hello(url, true).unwrap(), CommandResult::Info(_)));

        match store_list(&ctx).unwrap() {
            CommandResult::Info(table) => assert!(table.contains("DHT_HELLO")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hello_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        assert!(hello(&ctx, &[], None).is_err());
    }

    #[test]
    fn test_gns_publish_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let zone_file = dir.path().join("zone.json");

        let zone = match zone_keygen(&zone_file).unwrap() {
            CommandResult::Success(out) => out.trim_start_matches("Zone: ").to_string(),
            other => panic!("unexpected {:?}", other),
        };

        gns_publish(&ctx, &zone_file, "www", "hello gns", 600).unwrap();

        match gns_lookup(&ctx, &zone, "www").unwrap() {
            CommandResult::Info(out) => assert!(out.contains("hello gns")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(gns_lookup(&ctx, &zone, "ftp").unwrap(), CommandResult::Warning(_)));
    }

    #[test]
    fn test_commands_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let zone_file = dir.path().join("zone.json");
        let zone = match zone_keygen(&zone_file).unwrap() {
            CommandResult::Success(out) => out.trim_start_matches("Zone: ").to_string(),
            other => panic!("unexpected {:?}", other),
        };
        keygen(&ctx, false).unwrap();

        // 同一上下文中连续写、读、列出，不会重复打开sled
        gns_publish(&ctx, &zone_file, "www", "first", 600).unwrap();
        gns_publish(&ctx, &zone_file, "mail", "second", 600).unwrap();
        hello(&ctx, &[], Some(600)).unwrap();
        match gns_lookup(&ctx, &zone, "mail").unwrap() {
            CommandResult::Info(out) => assert!(out.contains("second")),
            other => panic!("unexpected {:?}", other),
        }

        assert!(ctx.store.get().is_some());
        assert_eq!(ctx.store().unwrap().list().unwrap().len(), 3);

        match store_list(&ctx).unwrap() {
            CommandResult::Info(table) => {
                assert!(table.contains("GNS_NAMERECORD"));
                assert!(table.contains("DHT_HELLO"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
