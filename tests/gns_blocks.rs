use dht_core::blocks::{Block, BlockError, GnsBlock, GnsQuery, Query, GNS_CONTEXT};
use dht_core::crypto::{HashCode, ZoneKey, ZonePrivate};
use dht_core::gns::{RecordSet, ResourceRecord};
use dht_core::utils::AbsoluteTime;
use std::str::FromStr;
use std::time::Duration;

#[test]
fn test_query_key_is_derived_key_hash() {
    let zone = ZonePrivate::from_seed([3u8; 32]).public().unwrap();

    let q1 = GnsQuery::new(zone, "www").unwrap();
    let q2 = GnsQuery::new(zone, "www").unwrap();
    assert_eq!(q1.key(), q2.key());

    let derived = zone.derive("www", GNS_CONTEXT).unwrap();
    assert_eq!(q1.key(), &HashCode::of(&derived.to_bytes()));
    assert_eq!(q1.derived_key(), &derived);

    let other = GnsQuery::new(zone, "mail").unwrap();
    assert_ne!(q1.key(), other.key());
}

#[test]
fn test_publish_then_lookup() {
    let zone = ZonePrivate::generate();
    let expiration = AbsoluteTime::now().add(Duration::from_secs(3600));
    let records = RecordSet::new(vec![ResourceRecord::txt("v=1", expiration)]);
    let record_bytes = records.to_bytes().unwrap();

    let block = GnsBlock::publish(&zone, "www", expiration, &record_bytes).unwrap();

    // 通过线上格式传输
    let received = GnsBlock::from_bytes(&block.to_bytes()).unwrap();

    let zone_key = ZoneKey::from_str(&zone.public().unwrap().to_string()).unwrap();
    let query = GnsQuery::new(zone_key, "www").unwrap();
    query.verify(&received).unwrap();
    assert_eq!(query.decrypt(&received).unwrap(), record_bytes);
    assert_eq!(query.records(&received).unwrap(), records);
}

#[test]
fn test_other_zone_cannot_use_block() {
    let zone = ZonePrivate::generate();
    let stranger = ZonePrivate::generate();
    let expiration = AbsoluteTime::now().add(Duration::from_secs(60));
    let block = GnsBlock::publish(&zone, "www", expiration, b"secret").unwrap();

    let query = GnsQuery::new(stranger.public().unwrap(), "www").unwrap();
    assert!(matches!(query.verify(&block), Err(BlockError::InvalidSignature)));
    assert!(query.decrypt(&block).is_err());
}

#[test]
fn test_changed_expiration_breaks_block() {
    let zone = ZonePrivate::generate();
    let expiration = AbsoluteTime::now().add(Duration::from_secs(60));
    let block = GnsBlock::publish(&zone, "www", expiration, b"data").unwrap();

    let mut bytes = block.to_bytes();
    // 过期时间字段位于派生签名(100)和用途头(8)之后
    bytes[115] ^= 0x01;
    let altered = GnsBlock::from_bytes(&bytes).unwrap();
    assert!(!altered.verify().unwrap());

    let query = GnsQuery::new(zone.public().unwrap(), "www").unwrap();
    assert!(query.verify(&altered).is_err());
    assert!(query.decrypt(&altered).is_err());
}
