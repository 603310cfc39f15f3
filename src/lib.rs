pub mod blocks;
pub mod cli;
pub mod crypto;
pub mod dht;
pub mod filter;
pub mod gns;
pub mod utils;
