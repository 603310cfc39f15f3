mod bloom;
mod result;

pub use bloom::{
    filter_size, BloomFilter, FilterCompare, PeerFilter,
    INDICES_PER_ENTRY, MAX_RESULT_FILTER_SIZE, PEER_FILTER_SIZE,
};
pub use result::{GenericResultFilter, PassResultFilter, ResultFilter};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid filter size: {0} bytes")]
    InvalidSize(usize),

    #[error("Malformed filter: {0}")]
    Malformed(String),
}

/*
 * Probabilistic filters for DHT lookups
 *
 * The bloom filter is the shared building block. Peer filters record which
 * peers a request has already visited; result filters record which replies
 * have already been delivered for one GET, so that forwarding hops can drop
 * duplicates without sending them back.
 */
