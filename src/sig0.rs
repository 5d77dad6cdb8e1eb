//! SIG(0) verification of update messages.

use bytes::{BufMut, BytesMut};
use ring::signature;

use crate::errors::Error;
use crate::wire::header::{Header, WriteHeader, HEADER_SIZE};
use crate::wire::name::{name_encoding_size, WriteName};
use crate::wire::record::key::KeyRecord;
use crate::wire::record::sig::{Sig, SIGNATURE_SIZE, SIG_FIXED_RDATA_SIZE};
use crate::wire::record::RawRecord;

/// Verifies the SIG(0) of an update message against the client-supplied
/// KEY record.
///
/// Per RFC 2931 §3.1 the signed content is, in order:
/// 1. the SIG RDATA up to but excluding the signature bytes, with the
///    signer name replaced by its canonical (uncompressed) encoding,
/// 2. the message header with ARCOUNT decremented by one (the SIG itself
///    does not cover its own record), and
/// 3. the message body from right after the header up to the start of the
///    SIG record.
pub fn verify_signature(
    key: &KeyRecord,
    msg: &[u8],
    header: &Header,
    sig_record: &RawRecord,
    sig: &Sig,
) -> Result<(), Error> {
    if sig.signature_len != SIGNATURE_SIZE {
        return Err(Error::Parse);
    }
    if sig_record.offset < HEADER_SIZE || sig_record.rdata_len < SIG_FIXED_RDATA_SIZE {
        return Err(Error::Parse);
    }

    let mut signed =
        BytesMut::with_capacity(msg.len() + name_encoding_size(&sig.signer_name) + HEADER_SIZE);

    signed.put_slice(&msg[sig_record.rdata_offset..sig_record.rdata_offset + SIG_FIXED_RDATA_SIZE]);
    signed.put_name(&sig.signer_name);

    let mut canonical_header = *header;
    canonical_header.additional_count -= 1;
    signed.put_header(&canonical_header);
    signed.put_slice(&msg[HEADER_SIZE..sig_record.offset]);

    // ring wants the full uncompressed point.
    let mut point = [0u8; 1 + 64];
    point[0] = 0x04;
    point[1..].copy_from_slice(&key.public_key);

    let signature = &msg[sig.signature_offset..sig.signature_offset + sig.signature_len];
    signature::UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_FIXED, point.as_ref())
        .verify(&signed, signature)
        .map_err(|_| Error::Security)
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

    use crate::wire::header::{be_header, Flags, Opcode};
    use crate::wire::record::key::{ALGORITHM_ECDSA_P256_SHA256, PROTOCOL_DNSSEC};
    use crate::wire::record::sig::read_sig;
    use crate::wire::record::{be_raw_record, RrClass, RrType, WriteRecord};

    use super::*;

    fn signed_message() -> (Vec<u8>, KeyRecord, usize) {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        let mut public_key = [0u8; 64];
        public_key.copy_from_slice(&key_pair.public_key().as_ref()[1..]);
        let key = KeyRecord {
            flags: 0x0200,
            protocol: PROTOCOL_DNSSEC,
            algorithm: ALGORITHM_ECDSA_P256_SHA256,
            public_key,
        };

        let header = Header {
            id: 0x0102,
            flags: Flags::new().with_opcode(Opcode::Update),
            zone_count: 0,
            prerequisite_count: 0,
            update_count: 0,
            additional_count: 2,
        };
        let mut msg = BytesMut::new();
        msg.put_header(&header);
        msg.put_slice(b"some update body standing in for real records");
        let sig_offset = msg.len();

        let signer = "h1.default.service.arpa.";
        let mut fixed = BytesMut::new();
        fixed.put_u16(0);
        fixed.put_u8(ALGORITHM_ECDSA_P256_SHA256);
        fixed.put_u8(4);
        fixed.put_u32(0);
        fixed.put_u32(0);
        fixed.put_u32(0);
        fixed.put_u16(0);

        let mut signed = BytesMut::new();
        signed.put_slice(&fixed);
        signed.put_name(signer);
        let mut canonical = header;
        canonical.additional_count -= 1;
        signed.put_header(&canonical);
        signed.put_slice(&msg[HEADER_SIZE..sig_offset]);

        let signature = key_pair.sign(&rng, &signed).unwrap();

        let mut rdata = BytesMut::new();
        rdata.put_slice(&fixed);
        rdata.put_name(signer);
        rdata.put_slice(signature.as_ref());
        msg.put_record(".", RrType::Sig, RrClass::Any, 0, &rdata);

        (msg.to_vec(), key, sig_offset)
    }

    #[test]
    fn accepts_valid_signature() {
        let (msg, key, sig_offset) = signed_message();
        let (_, header) = be_header(&msg).unwrap();
        let (_, sig_record) = be_raw_record(&msg[sig_offset..], &msg).unwrap();
        let sig = read_sig(&sig_record, &msg).unwrap();
        verify_signature(&key, &msg, &header, &sig_record, &sig).unwrap();
    }

    #[test]
    fn rejects_tampered_body() {
        let (mut msg, key, sig_offset) = signed_message();
        msg[20] ^= 0xFF;
        let (_, header) = be_header(&msg).unwrap();
        let (_, sig_record) = be_raw_record(&msg[sig_offset..], &msg).unwrap();
        let sig = read_sig(&sig_record, &msg).unwrap();
        assert_eq!(
            verify_signature(&key, &msg, &header, &sig_record, &sig),
            Err(Error::Security)
        );
    }

    #[test]
    fn rejects_wrong_key() {
        let (msg, _, sig_offset) = signed_message();
        let (_, other_key, _) = signed_message();
        let (_, header) = be_header(&msg).unwrap();
        let (_, sig_record) = be_raw_record(&msg[sig_offset..], &msg).unwrap();
        let sig = read_sig(&sig_record, &msg).unwrap();
        assert_eq!(
            verify_signature(&other_key, &msg, &header, &sig_record, &sig),
            Err(Error::Security)
        );
    }
}
