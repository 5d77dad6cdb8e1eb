use bytes::BufMut;
use nom::number::streaming::{be_u16, be_u32};

use crate::errors::Error;
use crate::wire::record::{RawRecord, RrType};
use crate::UDP_PAYLOAD_SIZE;

/// EDNS(0) option code of the Update Lease option.
pub const UPDATE_LEASE_OPTION: u16 = 2;

/// Two u32 second counts: lease and key lease.
pub const UPDATE_LEASE_OPTION_LEN: u16 = 8;

/// DO bit in the OPT TTL field.
const DNSSEC_OK: u32 = 0x0000_8000;

/// The Update Lease option carried in the OPT of requests and of responses
/// that grant values different from the requested ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseOption {
    pub lease: u32,
    pub key_lease: u32,
}

fn be_lease_option(input: &[u8]) -> nom::IResult<&[u8], (u16, u16, u32, u32)> {
    let (remain, code) = be_u16(input)?;
    let (remain, len) = be_u16(remain)?;
    let (remain, lease) = be_u32(remain)?;
    let (remain, key_lease) = be_u32(remain)?;
    Ok((remain, (code, len, lease, key_lease)))
}

/// Decodes the OPT record of the additional section. The owner must be the
/// root and the RDATA exactly one Update Lease option.
pub fn read_lease_option(record: &RawRecord, msg: &[u8]) -> Result<LeaseOption, Error> {
    if record.rtype != RrType::Opt || record.name != "." {
        return Err(Error::Parse);
    }
    if record.rdata_len != usize::from(UPDATE_LEASE_OPTION_LEN) + 4 {
        return Err(Error::Parse);
    }
    let (_, (code, len, lease, key_lease)) =
        be_lease_option(record.rdata(msg)).map_err(|_| Error::Parse)?;
    if code != UPDATE_LEASE_OPTION || len != UPDATE_LEASE_OPTION_LEN {
        return Err(Error::Failed);
    }
    Ok(LeaseOption { lease, key_lease })
}

pub trait WriteLeaseOption {
    /// Appends a whole root-owned OPT record carrying one Update Lease
    /// option.
    fn put_lease_opt(&mut self, lease: u32, key_lease: u32);
}

impl<T: BufMut> WriteLeaseOption for T {
    fn put_lease_opt(&mut self, lease: u32, key_lease: u32) {
        self.put_u8(0); // root owner
        self.put_u16(RrType::Opt.to_u16());
        self.put_u16(UDP_PAYLOAD_SIZE); // CLASS carries the payload size
        self.put_u32(DNSSEC_OK);
        self.put_u16(UPDATE_LEASE_OPTION_LEN + 4);
        self.put_u16(UPDATE_LEASE_OPTION);
        self.put_u16(UPDATE_LEASE_OPTION_LEN);
        self.put_u32(lease);
        self.put_u32(key_lease);
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use crate::wire::record::be_raw_record;

    use super::*;

    #[test]
    fn round_trip() {
        let mut msg = BytesMut::new();
        msg.put_lease_opt(3600, 7200);
        let (remain, record) = be_raw_record(&msg, &msg).unwrap();
        assert!(remain.is_empty());
        assert_eq!(record.rtype, RrType::Opt);
        assert_eq!(record.name, ".");
        assert_eq!(
            read_lease_option(&record, &msg).unwrap(),
            LeaseOption {
                lease: 3600,
                key_lease: 7200
            }
        );
    }

    #[test]
    fn rejects_unknown_option_code() {
        let mut msg = BytesMut::new();
        msg.put_lease_opt(3600, 7200);
        // Patch the option code inside the RDATA.
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        let code_at = record.rdata_offset;
        msg[code_at] = 0;
        msg[code_at + 1] = 9;
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        assert_eq!(read_lease_option(&record, &msg), Err(Error::Failed));
    }

    #[test]
    fn rejects_extra_options() {
        let mut msg = BytesMut::new();
        msg.put_lease_opt(1, 2);
        // Grow the RDATA length so a second (empty) option would fit.
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        let len_at = record.rdata_offset - 2;
        msg[len_at + 1] += 4;
        msg.extend_from_slice(&[0, 0, 0, 0]);
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        assert_eq!(read_lease_option(&record, &msg), Err(Error::Parse));
    }
}
