//! DNS wire format for the veildns gateway
//!
//! Implements the RFC 1035 message codec (parser with compression-pointer
//! support, deterministic marshaller), dotted-name handling with glob
//! pattern matching for the deny-list, and the RFC 8467 padding policy
//! applied to DNS-over-HTTPS queries.
//!
//! The parser is meant for hostile input: compression pointers must resolve
//! strictly backward, pointer chains are depth-bounded, and label/name
//! length limits are enforced. The marshaller never emits compression.

mod denylist;
mod error;
mod marshal;
mod message;
mod name;
mod padding;
mod parse;
pub mod types;

pub use denylist::DenyList;
pub use error::{Error, Result};
pub use message::{Message, Question, Rdata, Record};
pub use name::Labels;
pub use padding::{pad_message, PAD_BLOCK};
pub use parse::{parse, parse_with_trailing};
pub use types::{Opcode, Rcode};

/// DNS message header length in octets
pub const HEADER_LEN: usize = 12;

/// Maximum serialized name length, including the terminating zero label
pub const MAX_NAME_LEN: usize = 255;

/// Maximum label length in octets
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum compression-pointer hops followed while decoding one name
pub const MAX_POINTER_HOPS: usize = 128;
