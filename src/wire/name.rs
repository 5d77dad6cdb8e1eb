use bytes::BufMut;
use nom::{
    bytes::streaming::take,
    error::{Error, ErrorKind},
    number::streaming::be_u8,
    Err, IResult,
};

pub type Name = String;

/// Maximum encoded name size, per RFC 1035.
pub const MAX_NAME_SIZE: usize = 255;
pub const MAX_LABEL_SIZE: usize = 63;

/// Reads a domain name in RFC 1035 wire form, chasing compression pointers
/// through `origin` (the whole message). Returned names always carry the
/// terminating dot; the root is `"."`.
///
/// Pointers must target strictly decreasing offsets, which bounds the chase
/// on hostile input.
pub fn be_name<'a>(input: &'a [u8], origin: &'a [u8]) -> IResult<&'a [u8], Name> {
    let mut ret = String::new();
    let mut remain = input;
    // The remainder handed back to the caller is fixed at the first pointer.
    let mut after: Option<&'a [u8]> = None;
    let mut limit = origin.len();

    loop {
        let (left, len) = be_u8(remain)?;

        if len == 0 {
            if ret.is_empty() {
                ret.push('.');
            }
            return Ok((after.unwrap_or(left), ret));
        }

        if len & 0xC0 == 0xC0 {
            let (left, low) = be_u8(left)?;
            let target = usize::from(len & 0x3F) << 8 | usize::from(low);
            if target >= limit {
                return Err(Err::Error(Error::new(input, ErrorKind::Verify)));
            }
            if after.is_none() {
                after = Some(left);
            }
            limit = target;
            remain = &origin[target..];
            continue;
        }

        if len > MAX_LABEL_SIZE as u8 {
            return Err(Err::Error(Error::new(input, ErrorKind::Verify)));
        }

        let (left, label) = take(len)(left)?;
        if ret.len() + label.len() + 1 > MAX_NAME_SIZE {
            return Err(Err::Error(Error::new(input, ErrorKind::Verify)));
        }
        for &c in label {
            if !(32..=126).contains(&c) {
                return Err(Err::Error(Error::new(input, ErrorKind::Verify)));
            }
            ret.push(c as char);
        }
        ret.push('.');
        remain = left;
    }
}

pub trait WriteName {
    fn put_name(&mut self, name: &str);
}

impl<T: BufMut> WriteName for T {
    fn put_name(&mut self, name: &str) {
        for label in name.split('.').filter(|label| !label.is_empty()) {
            debug_assert!(label.len() <= MAX_LABEL_SIZE);
            self.put_u8(label.len() as u8);
            self.put_slice(label.as_bytes());
        }
        self.put_u8(0);
    }
}

/// Size of the uncompressed encoding of `name`.
pub fn name_encoding_size(name: &str) -> usize {
    if name == "." {
        return 1;
    }
    name.len() + if name.ends_with('.') { 1 } else { 2 }
}

/// Case-insensitive full-name equality.
pub fn name_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// True when `name` equals `domain` or sits below it on a label boundary.
pub fn is_sub_domain_of(name: &str, domain: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if name.len() == domain.len() {
        return name.eq_ignore_ascii_case(domain);
    }
    name.len() > domain.len()
        && name.as_bytes()[name.len() - domain.len() - 1] == b'.'
        && name[name.len() - domain.len()..].eq_ignore_ascii_case(domain)
}

/// Case-insensitive suffix check without label alignment. Instance names are
/// validated against their service type name this way.
pub fn name_ends_with(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
