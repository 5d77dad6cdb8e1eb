use std::net::Ipv6Addr;

use bytes::BufMut;
use nom::{
    bytes::streaming::take,
    number::streaming::{be_u16, be_u32},
    IResult,
};

use super::name::{be_name, Name, WriteName};
use crate::errors::Error;

pub mod key;
pub mod lease;
pub mod ptr;
pub mod sig;
pub mod srv;
pub mod txt;

/// The record TYPEs the registration protocol deals with.
/// See https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RrType {
    /// 6 start of authority, expected in the zone section
    Soa,
    /// 12 domain name pointer
    Ptr,
    /// 16 text strings
    Txt,
    /// 24 transaction signature, SIG(0)
    Sig,
    /// 25 public key
    Key,
    /// 28 IPv6 host address
    Aaaa,
    /// 33 service record
    Srv,
    /// 41 EDNS(0) pseudo record
    Opt,
    /// 255 any type
    Any,
    Unknown(u16),
}

impl RrType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            6 => Self::Soa,
            12 => Self::Ptr,
            16 => Self::Txt,
            24 => Self::Sig,
            25 => Self::Key,
            28 => Self::Aaaa,
            33 => Self::Srv,
            41 => Self::Opt,
            255 => Self::Any,
            _ => Self::Unknown(value),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::Soa => 6,
            Self::Ptr => 12,
            Self::Txt => 16,
            Self::Sig => 24,
            Self::Key => 25,
            Self::Aaaa => 28,
            Self::Srv => 33,
            Self::Opt => 41,
            Self::Any => 255,
            Self::Unknown(value) => value,
        }
    }
}

/// The record CLASS. UPDATE overloads it: NONE deletes an RR from an RRset,
/// ANY deletes whole RRsets.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RrClass {
    In,
    None,
    Any,
    Unknown(u16),
}

impl RrClass {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::In,
            254 => Self::None,
            255 => Self::Any,
            _ => Self::Unknown(value),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            Self::In => 1,
            Self::None => 254,
            Self::Any => 255,
            Self::Unknown(value) => value,
        }
    }
}

/// One resource record of the update message. RDATA stays in the message
/// buffer; the absolute offsets let the parsing passes re-read it and let
/// SIG(0) verification reconstruct the signed stream.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub name: Name,
    pub rtype: RrType,
    pub class: RrClass,
    pub ttl: u32,
    /// Offset of the record (its owner name) in the message.
    pub offset: usize,
    pub rdata_offset: usize,
    pub rdata_len: usize,
}

impl RawRecord {
    pub fn rdata<'a>(&self, msg: &'a [u8]) -> &'a [u8] {
        &msg[self.rdata_offset..self.rdata_offset + self.rdata_len]
    }

    /// The "Delete All RRsets from a name" shape of RFC 2136 §2.5.3:
    /// class ANY, type ANY, zero TTL, empty RDATA.
    pub fn is_delete_all(&self) -> bool {
        self.class == RrClass::Any
            && self.rtype == RrType::Any
            && self.ttl == 0
            && self.rdata_len == 0
    }
}

pub fn be_raw_record<'a>(input: &'a [u8], origin: &'a [u8]) -> IResult<&'a [u8], RawRecord> {
    let offset = origin.len() - input.len();
    let (remain, name) = be_name(input, origin)?;
    let (remain, rtype) = be_u16(remain)?;
    let (remain, class) = be_u16(remain)?;
    let (remain, ttl) = be_u32(remain)?;
    let (remain, rdata_len) = be_u16(remain)?;
    let rdata_offset = origin.len() - remain.len();
    let (remain, _) = take(rdata_len)(remain)?;
    Ok((
        remain,
        RawRecord {
            name,
            rtype: RrType::from_u16(rtype),
            class: RrClass::from_u16(class),
            ttl,
            offset,
            rdata_offset,
            rdata_len: rdata_len as usize,
        },
    ))
}

/// AAAA RDATA: exactly one IPv6 address.
pub fn read_aaaa(record: &RawRecord, msg: &[u8]) -> Result<Ipv6Addr, Error> {
    let octets: [u8; 16] = record.rdata(msg).try_into().map_err(|_| Error::Parse)?;
    Ok(Ipv6Addr::from(octets))
}

pub trait WriteRecord {
    fn put_record(&mut self, name: &str, rtype: RrType, class: RrClass, ttl: u32, rdata: &[u8]);
}

impl<T: BufMut> WriteRecord for T {
    fn put_record(&mut self, name: &str, rtype: RrType, class: RrClass, ttl: u32, rdata: &[u8]) {
        self.put_name(name);
        self.put_u16(rtype.to_u16());
        self.put_u16(class.to_u16());
        self.put_u32(ttl);
        self.put_u16(rdata.len() as u16);
        self.put_slice(rdata);
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn parse_aaaa_record_with_offsets() {
        let mut msg = BytesMut::new();
        msg.put_slice(b"prefix--");
        let start = msg.len();
        msg.put_record(
            "host.example.",
            RrType::Aaaa,
            RrClass::In,
            120,
            &std::net::Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1).octets(),
        );

        let (remain, record) = be_raw_record(&msg[start..], &msg).unwrap();
        assert!(remain.is_empty());
        assert_eq!(record.name, "host.example.");
        assert_eq!(record.rtype, RrType::Aaaa);
        assert_eq!(record.class, RrClass::In);
        assert_eq!(record.ttl, 120);
        assert_eq!(record.offset, start);
        assert_eq!(record.rdata_len, 16);
        assert_eq!(
            read_aaaa(&record, &msg).unwrap(),
            std::net::Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1)
        );
    }

    #[test]
    fn delete_all_shape() {
        let mut msg = BytesMut::new();
        msg.put_record("host.example.", RrType::Any, RrClass::Any, 0, &[]);
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        assert!(record.is_delete_all());

        let mut msg = BytesMut::new();
        msg.put_record("host.example.", RrType::Any, RrClass::Any, 1, &[]);
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        assert!(!record.is_delete_all());
    }

    #[test]
    fn truncated_rdata_is_an_error() {
        let mut msg = BytesMut::new();
        msg.put_name("a.");
        msg.put_u16(28);
        msg.put_u16(1);
        msg.put_u32(0);
        msg.put_u16(16); // claims 16 bytes, none follow
        assert!(be_raw_record(&msg, &msg).is_err());
    }
}
