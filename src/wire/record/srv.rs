use bytes::BufMut;
use nom::number::streaming::be_u16;

use crate::errors::Error;
use crate::wire::name::{be_name, Name, WriteName};
use crate::wire::record::RawRecord;

/// SRV RDATA (RFC 2782). The target carries the host name the instance
/// runs on.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Name,
}

pub fn be_srv<'a>(input: &'a [u8], origin: &'a [u8]) -> nom::IResult<&'a [u8], Srv> {
    let (remain, priority) = be_u16(input)?;
    let (remain, weight) = be_u16(remain)?;
    let (remain, port) = be_u16(remain)?;
    let (remain, target) = be_name(remain, origin)?;
    Ok((
        remain,
        Srv {
            priority,
            weight,
            port,
            target,
        },
    ))
}

pub fn read_srv(record: &RawRecord, msg: &[u8]) -> Result<Srv, Error> {
    let (_, srv) = be_srv(record.rdata(msg), msg).map_err(|_| Error::Parse)?;
    Ok(srv)
}

pub trait WriteSrv {
    fn put_srv(&mut self, srv: &Srv);
}

impl<T: BufMut> WriteSrv for T {
    fn put_srv(&mut self, srv: &Srv) {
        self.put_u16(srv.priority);
        self.put_u16(srv.weight);
        self.put_u16(srv.port);
        self.put_name(&srv.target);
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn round_trip() {
        let srv = Srv {
            priority: 0,
            weight: 5,
            port: 1234,
            target: "h1.default.service.arpa.".to_string(),
        };
        let mut buf = BytesMut::new();
        buf.put_srv(&srv);
        let (remain, reparsed) = be_srv(&buf, &buf).unwrap();
        assert!(remain.is_empty());
        assert_eq!(reparsed, srv);
    }

    #[test]
    fn parse_known_bytes() {
        let rdata = b"\x00\x00\x00\x00\x04\xd2\x02h1\x07example\x00";
        let (_, srv) = be_srv(rdata, rdata).unwrap();
        assert_eq!(srv.priority, 0);
        assert_eq!(srv.weight, 0);
        assert_eq!(srv.port, 1234);
        assert_eq!(srv.target, "h1.example.");
    }
}
