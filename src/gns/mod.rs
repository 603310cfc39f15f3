mod records;

pub use records::{RecordFlags, RecordSet, RecordType, ResourceRecord};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GnsError {
    #[error("Malformed record set: {0}")]
    Malformed(String),

    #[error("Record data too large: {0} bytes")]
    RecordTooLarge(usize),
}

/*
 * GNS record sets
 *
 * A label in a zone maps to a set of resource records. The set is serialized,
 * encrypted under (zone, label, expiration) and published in a GNS block whose
 * signature is made with the label-derived zone key.
 */
