//! Binary DNS message codec: names, the UPDATE header and the resource
//! records the registration protocol cares about.

pub mod header;
pub mod name;
pub mod record;

pub use header::{be_header, Flags, Header, Opcode, ResponseCode, WriteHeader, HEADER_SIZE};
pub use name::{be_name, Name, WriteName};
pub use record::{be_raw_record, RawRecord, RrClass, RrType, WriteRecord};
