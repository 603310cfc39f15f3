mod storage;

pub use storage::{open_store, BlockStore, DhtEntry, MemoryStore, SledStore, StoreError};

/*
 * Local block storage
 *
 * Blocks are stored under the routing key of the query that produced them.
 * Entries keep the block's wire bytes together with its type, expiration and
 * result-filter hash, so a lookup can be answered (and filtered) without
 * re-parsing the block. Expiration is a property of the data: `get` reports it,
 * `get_approx` skips it and `prune_expired` removes it.
 */
