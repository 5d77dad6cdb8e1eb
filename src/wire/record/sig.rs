use nom::number::streaming::{be_u16, be_u32, be_u8};

use crate::errors::Error;
use crate::wire::name::{be_name, Name};
use crate::wire::record::RawRecord;

/// Fixed-layout part of the SIG RDATA ahead of the signer name.
pub const SIG_FIXED_RDATA_SIZE: usize = 18;

/// ECDSA P-256 signatures are a raw 64-byte r‖s pair.
pub const SIGNATURE_SIZE: usize = 64;

/// SIG(0) RDATA (RFC 2931). The signature bytes stay in the message; their
/// offset is recorded so verification can slice them out.
///
/// Expiration and inception are parsed but never enforced: the devices
/// sending these updates may have no wall-clock time.
#[derive(Debug, Clone)]
pub struct Sig {
    pub type_covered: u16,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer_name: Name,
    pub signature_offset: usize,
    pub signature_len: usize,
}

fn be_sig_fields<'a>(
    input: &'a [u8],
    origin: &'a [u8],
) -> nom::IResult<&'a [u8], (u16, u8, u8, u32, u32, u32, u16, Name)> {
    let (remain, type_covered) = be_u16(input)?;
    let (remain, algorithm) = be_u8(remain)?;
    let (remain, labels) = be_u8(remain)?;
    let (remain, original_ttl) = be_u32(remain)?;
    let (remain, expiration) = be_u32(remain)?;
    let (remain, inception) = be_u32(remain)?;
    let (remain, key_tag) = be_u16(remain)?;
    let (remain, signer_name) = be_name(remain, origin)?;
    Ok((
        remain,
        (
            type_covered,
            algorithm,
            labels,
            original_ttl,
            expiration,
            inception,
            key_tag,
            signer_name,
        ),
    ))
}

pub fn read_sig(record: &RawRecord, msg: &[u8]) -> Result<Sig, Error> {
    let rdata = record.rdata(msg);
    let (remain, fields) = be_sig_fields(rdata, msg).map_err(|_| Error::Parse)?;
    let (type_covered, algorithm, labels, original_ttl, expiration, inception, key_tag, signer_name) =
        fields;

    let signature_len = remain.len();
    let signature_offset = record.rdata_offset + (rdata.len() - signature_len);

    Ok(Sig {
        type_covered,
        algorithm,
        labels,
        original_ttl,
        expiration,
        inception,
        key_tag,
        signer_name,
        signature_offset,
        signature_len,
    })
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use crate::wire::name::WriteName;
    use crate::wire::record::{be_raw_record, RrClass, RrType, WriteRecord};

    use super::*;

    #[test]
    fn splits_fixed_fields_signer_and_signature() {
        let mut rdata = BytesMut::new();
        rdata.put_u16(0); // type covered
        rdata.put_u8(13); // algorithm
        rdata.put_u8(3); // labels
        rdata.put_u32(0); // original ttl
        rdata.put_u32(0xAAAA_0001); // expiration
        rdata.put_u32(0x5555_0001); // inception
        rdata.put_u16(0x1234); // key tag
        rdata.put_name("h1.example.");
        rdata.put_slice(&[7u8; SIGNATURE_SIZE]);

        let mut msg = BytesMut::new();
        msg.put_record(".", RrType::Sig, RrClass::Any, 0, &rdata);
        let (_, record) = be_raw_record(&msg, &msg).unwrap();

        let sig = read_sig(&record, &msg).unwrap();
        assert_eq!(sig.type_covered, 0);
        assert_eq!(sig.algorithm, 13);
        assert_eq!(sig.key_tag, 0x1234);
        assert_eq!(sig.signer_name, "h1.example.");
        assert_eq!(sig.signature_len, SIGNATURE_SIZE);
        assert_eq!(
            &msg[sig.signature_offset..sig.signature_offset + sig.signature_len],
            &[7u8; SIGNATURE_SIZE]
        );
    }
}
