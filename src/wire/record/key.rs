use bytes::BufMut;
use nom::{bytes::streaming::take, number::streaming::be_u16, number::streaming::be_u8};

use crate::errors::Error;
use crate::wire::record::RawRecord;

/// DNSKEY/KEY algorithm number for ECDSA P-256 with SHA-256, the only one
/// the server accepts.
pub const ALGORITHM_ECDSA_P256_SHA256: u8 = 13;

/// KEY protocol octet for DNSSEC.
pub const PROTOCOL_DNSSEC: u8 = 3;

/// Uncompressed P-256 point without the leading 0x04 octet.
pub const PUBLIC_KEY_SIZE: usize = 64;

pub const KEY_RDATA_SIZE: usize = 4 + PUBLIC_KEY_SIZE;

/// KEY RDATA (RFC 2535 §3) carrying the client's ECDSA P-256 public key.
/// Two keys are the same only when the whole RDATA is byte-equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
}

impl KeyRecord {
    pub fn is_valid(&self) -> bool {
        self.protocol == PROTOCOL_DNSSEC && self.algorithm == ALGORITHM_ECDSA_P256_SHA256
    }
}

pub fn be_key(input: &[u8]) -> nom::IResult<&[u8], KeyRecord> {
    let (remain, flags) = be_u16(input)?;
    let (remain, protocol) = be_u8(remain)?;
    let (remain, algorithm) = be_u8(remain)?;
    let (remain, key) = take(PUBLIC_KEY_SIZE)(remain)?;
    let mut public_key = [0u8; PUBLIC_KEY_SIZE];
    public_key.copy_from_slice(key);
    Ok((
        remain,
        KeyRecord {
            flags,
            protocol,
            algorithm,
            public_key,
        },
    ))
}

pub fn read_key(record: &RawRecord, msg: &[u8]) -> Result<KeyRecord, Error> {
    if record.rdata_len != KEY_RDATA_SIZE {
        return Err(Error::Parse);
    }
    let (_, key) = be_key(record.rdata(msg)).map_err(|_| Error::Parse)?;
    Ok(key)
}

pub trait WriteKey {
    fn put_key(&mut self, key: &KeyRecord);
}

impl<T: BufMut> WriteKey for T {
    fn put_key(&mut self, key: &KeyRecord) {
        self.put_u16(key.flags);
        self.put_u8(key.protocol);
        self.put_u8(key.algorithm);
        self.put_slice(&key.public_key);
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn round_trip() {
        let key = KeyRecord {
            flags: 0x0200,
            protocol: PROTOCOL_DNSSEC,
            algorithm: ALGORITHM_ECDSA_P256_SHA256,
            public_key: [0xAB; PUBLIC_KEY_SIZE],
        };
        assert!(key.is_valid());

        let mut buf = BytesMut::new();
        buf.put_key(&key);
        assert_eq!(buf.len(), KEY_RDATA_SIZE);
        let (remain, reparsed) = be_key(&buf).unwrap();
        assert!(remain.is_empty());
        assert_eq!(reparsed, key);
    }

    #[test]
    fn other_algorithms_are_invalid() {
        let key = KeyRecord {
            flags: 0,
            protocol: PROTOCOL_DNSSEC,
            algorithm: 8, // RSA/SHA-256
            public_key: [0; PUBLIC_KEY_SIZE],
        };
        assert!(!key.is_valid());
    }
}
