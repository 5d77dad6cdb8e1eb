use bitfield_struct::bitfield;
use bytes::BufMut;
use nom::number::streaming::be_u16;

/// See https://datatracker.ietf.org/doc/html/rfc2136#section-2
/// ```text
/// 0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                      ID                       |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |QR|   Opcode  |          Z         |   RCODE   |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                    ZOCOUNT                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                    PRCOUNT                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                    UPCOUNT                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |                    ADCOUNT                    |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// Count fields are named for the UPDATE layout; a response reuses the same
/// wire positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub zone_count: u16,
    pub prerequisite_count: u16,
    pub update_count: u16,
    pub additional_count: u16,
}

pub const HEADER_SIZE: usize = 12;

impl Default for Header {
    fn default() -> Self {
        Self {
            id: 0,
            flags: Flags::new(),
            zone_count: 0,
            prerequisite_count: 0,
            update_count: 0,
            additional_count: 0,
        }
    }
}

/// The flag word, QR bit first. The Z bits double as AA/TC/RD/RA/AD/CD in
/// query messages; none of them matter to an UPDATE server.
#[bitfield(u16, order = Msb)]
#[derive(PartialEq, Eq)]
pub struct Flags {
    pub response: bool,
    #[bits(4)]
    pub opcode: Opcode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub zero: bool,
    pub authenticated_data: bool,
    pub checking_disabled: bool,
    #[bits(4)]
    pub response_code: ResponseCode,
}

/// The OPCODE value according to RFC 1035 / RFC 2136.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Opcode {
    Query,
    InverseQuery,
    Status,
    Notify,
    Update,
    Reserved(u8),
}

impl Opcode {
    const fn into_bits(self) -> u8 {
        match self {
            Self::Query => 0,
            Self::InverseQuery => 1,
            Self::Status => 2,
            Self::Notify => 4,
            Self::Update => 5,
            Self::Reserved(value) => value,
        }
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Query,
            1 => Self::InverseQuery,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            _ => Self::Reserved(value),
        }
    }
}

/// The RCODE value according to RFC 1035, extended with the UPDATE codes of
/// RFC 2136.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResponseCode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    /// YXDomain: a name exists when it should not.
    NameExists,
    RrSetExists,
    RrSetNotFound,
    NotAuth,
    NotZone,
    Reserved(u8),
}

impl ResponseCode {
    const fn into_bits(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormatError => 1,
            Self::ServerFailure => 2,
            Self::NameError => 3,
            Self::NotImplemented => 4,
            Self::Refused => 5,
            Self::NameExists => 6,
            Self::RrSetExists => 7,
            Self::RrSetNotFound => 8,
            Self::NotAuth => 9,
            Self::NotZone => 10,
            Self::Reserved(value) => value,
        }
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::FormatError,
            2 => Self::ServerFailure,
            3 => Self::NameError,
            4 => Self::NotImplemented,
            5 => Self::Refused,
            6 => Self::NameExists,
            7 => Self::RrSetExists,
            8 => Self::RrSetNotFound,
            9 => Self::NotAuth,
            10 => Self::NotZone,
            _ => Self::Reserved(value),
        }
    }
}

pub fn be_header(input: &[u8]) -> nom::IResult<&[u8], Header> {
    let (remain, id) = be_u16(input)?;
    let (remain, flags) = be_u16(remain)?;
    let (remain, zone_count) = be_u16(remain)?;
    let (remain, prerequisite_count) = be_u16(remain)?;
    let (remain, update_count) = be_u16(remain)?;
    let (remain, additional_count) = be_u16(remain)?;
    Ok((
        remain,
        Header {
            id,
            flags: Flags::from(flags),
            zone_count,
            prerequisite_count,
            update_count,
            additional_count,
        },
    ))
}

pub trait WriteHeader {
    fn put_header(&mut self, header: &Header);
}

impl<T: BufMut> WriteHeader for T {
    fn put_header(&mut self, header: &Header) {
        self.put_u16(header.id);
        self.put_u16(header.flags.into());
        self.put_u16(header.zone_count);
        self.put_u16(header.prerequisite_count);
        self.put_u16(header.update_count);
        self.put_u16(header.additional_count);
    }
}
