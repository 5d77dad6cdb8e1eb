use crate::errors::Error;
use crate::wire::name::{be_name, Name};
use crate::wire::record::RawRecord;

/// PTR RDATA: the pointed-to name. For service discovery instructions the
/// owner is the service type and the target the instance name.
pub fn read_ptr(record: &RawRecord, msg: &[u8]) -> Result<Name, Error> {
    let (_, name) = be_name(record.rdata(msg), msg).map_err(|_| Error::Parse)?;
    Ok(name)
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use crate::wire::record::{be_raw_record, RrClass, RrType, WriteRecord};
    use crate::wire::name::WriteName;

    use super::*;

    #[test]
    fn reads_instance_name() {
        let mut rdata = BytesMut::new();
        rdata.put_name("i1._t._tcp.example.");
        let mut msg = BytesMut::new();
        msg.put_record("_t._tcp.example.", RrType::Ptr, RrClass::In, 0, &rdata);
        let (_, record) = be_raw_record(&msg, &msg).unwrap();
        assert_eq!(read_ptr(&record, &msg).unwrap(), "i1._t._tcp.example.");
    }
}
