//! Value codecs between the relational and document models
//!
//! - Literal coercion into store-native scalars
//! - decimal128 encoding for exact decimals
//! - local wall-clock time against UTC store dates
//! - the time-literal pattern used to recognise stored times of day

mod decimal;
mod literal;
mod temporal;

pub use decimal::{from_decimal128, to_decimal128};
pub use literal::literal_to_bson;
pub use temporal::{
    bson_to_local, date_to_bson, local_to_bson, parse_time_literal, time_to_string,
    timestamp_to_local,
};
