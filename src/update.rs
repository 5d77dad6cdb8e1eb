//! Decoding of SRP update messages: one structural parse that keeps record
//! offsets, then three ordered passes over the same record range building
//! the transient host.
//!
//! The pass order is load-bearing: service discovery instructions come
//! first so that a later "Delete All RRsets from a name" can be told apart
//! from a host-name deletion, then the host description, then the service
//! descriptions.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::time::Instant;

use crate::errors::Error;
use crate::lease::LeaseConfig;
use crate::registry::Host;
use crate::wire::header::{be_header, Header};
use crate::wire::name::{self, be_name, Name};
use crate::wire::record::key::{self, ALGORITHM_ECDSA_P256_SHA256};
use crate::wire::record::lease::read_lease_option;
use crate::wire::record::sig::{read_sig, Sig, SIGNATURE_SIZE};
use crate::wire::record::srv::read_srv;
use crate::wire::record::txt::verify_txt_data;
use crate::wire::record::{be_raw_record, ptr, read_aaaa, RawRecord, RrClass, RrType};

/// Everything known about an inbound update besides the message bytes.
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    pub dns_header: Header,
    pub rx_time: Instant,
    pub lease_config: LeaseConfig,
    /// Source address for messages received straight from the client;
    /// `None` for replicated messages, which never get a response.
    pub peer: Option<SocketAddr>,
}

impl MessageMetadata {
    pub fn is_direct_rx_from_client(&self) -> bool {
        self.peer.is_some()
    }
}

/// The structurally decoded update message.
#[derive(Debug)]
pub struct UpdateMessage {
    pub header: Header,
    pub zone_name: Name,
    pub zone_class: RrClass,
    pub update: Vec<RawRecord>,
    pub additional: Vec<RawRecord>,
}

impl UpdateMessage {
    pub fn parse(msg: &[u8]) -> Result<UpdateMessage, Error> {
        let (remain, header) = be_header(msg).map_err(|_| Error::Parse)?;

        if header.zone_count != 1 {
            return Err(Error::Parse);
        }
        let (remain, zone_name) = be_name(remain, msg).map_err(|_| Error::Parse)?;
        let (remain, zone_type) = nom::number::streaming::be_u16::<_, nom::error::Error<_>>(remain)
            .map_err(|_| Error::Parse)?;
        let (mut remain, zone_class) =
            nom::number::streaming::be_u16::<_, nom::error::Error<_>>(remain)
                .map_err(|_| Error::Parse)?;
        if RrType::from_u16(zone_type) != RrType::Soa {
            return Err(Error::Parse);
        }

        // Prerequisites are decoded for framing only; the server refuses
        // any update that carries them.
        for _ in 0..header.prerequisite_count {
            let (rest, _) = be_raw_record(remain, msg).map_err(|_| Error::Parse)?;
            remain = rest;
        }

        let mut update = Vec::with_capacity(usize::from(header.update_count));
        for _ in 0..header.update_count {
            let (rest, record) = be_raw_record(remain, msg).map_err(|_| Error::Parse)?;
            update.push(record);
            remain = rest;
        }

        let mut additional = Vec::with_capacity(usize::from(header.additional_count));
        for _ in 0..header.additional_count {
            let (rest, record) = be_raw_record(remain, msg).map_err(|_| Error::Parse)?;
            additional.push(record);
            remain = rest;
        }

        Ok(UpdateMessage {
            header,
            zone_name,
            zone_class: RrClass::from_u16(zone_class),
            update,
            additional,
        })
    }
}

/// Pass 1 — service discovery instructions. Every update RR owner must sit
/// inside the server's domain. PTR records append a transient service;
/// class NONE marks it deleted ("delete an RR from an RRset").
pub fn process_service_discovery(
    host: &mut Host,
    msg: &[u8],
    message: &UpdateMessage,
    domain: &str,
    rx_time: Instant,
) -> Result<(), Error> {
    for record in &message.update {
        if !name::is_sub_domain_of(&record.name, domain) {
            return Err(Error::Security);
        }
        if record.rtype != RrType::Ptr {
            continue;
        }

        let instance_name = ptr::read_ptr(record, msg)?;
        if record.class != RrClass::None && record.class != message.zone_class {
            return Err(Error::Failed);
        }

        // A service name of the form "<sub>._sub.<base>.<domain>." names a
        // subtype of <base>.
        let (base_name, is_sub_type) = match record.name.find(crate::SUB_TYPE_LABEL) {
            Some(at) => (&record.name[at + crate::SUB_TYPE_LABEL.len()..], true),
            None => (record.name.as_str(), false),
        };

        if !name::name_ends_with(&instance_name, base_name) {
            return Err(Error::Failed);
        }
        if host.find_service(&record.name, &instance_name).is_some() {
            return Err(Error::Failed);
        }

        let index = host.add_service(&record.name, &instance_name, is_sub_type, rx_time);
        host.services[index].is_deleted = record.class == RrClass::None;
    }
    Ok(())
}

/// Pass 2 — host description. Delete-all records whose owner is not a known
/// service instance name the host; AAAA records collect addresses; KEY
/// records pin the key.
pub fn process_host_description(
    host: &mut Host,
    msg: &[u8],
    message: &UpdateMessage,
) -> Result<(), Error> {
    debug_assert!(host.full_name().is_none());

    for record in &message.update {
        if record.class == RrClass::Any {
            if !record.is_delete_all() {
                return Err(Error::Failed);
            }
            // Applies to the host unless the owner is a known service
            // instance (pass 1 already ran).
            if host.find_description(&record.name).is_none() {
                host.set_full_name(&record.name)?;
                host.clear_resources();
            }
        } else if record.rtype == RrType::Aaaa {
            if record.class != message.zone_class {
                return Err(Error::Failed);
            }
            host.set_full_name(&record.name)?;
            let address = read_aaaa(record, msg)?;
            // Unusable addresses are dropped, not fatal.
            if let Err(error) = host.add_address(address) {
                if error != Error::Drop {
                    return Err(error);
                }
            }
        } else if record.rtype == RrType::Key {
            if record.class != message.zone_class {
                return Err(Error::Failed);
            }
            let key = key::read_key(record, msg)?;
            if !key.is_valid() {
                return Err(Error::Parse);
            }
            if host.key().is_some_and(|existing| *existing != key) {
                return Err(Error::Security);
            }
            host.set_key(key);
        }
    }

    if host.full_name().is_none() || host.key().is_none() {
        return Err(Error::Failed);
    }

    // The address count is checked after the lease option is known: a
    // removal legitimately carries none.
    Ok(())
}

/// Pass 3 — service descriptions. Delete-all resets a description; SRV
/// fills priority/weight/port (first SRV only, target must be the host);
/// TXT attaches validated data.
pub fn process_service_description(
    host: &mut Host,
    msg: &[u8],
    message: &UpdateMessage,
    domain: &str,
    rx_time: Instant,
) -> Result<(), Error> {
    for record in &message.update {
        if record.class == RrClass::Any {
            if !record.is_delete_all() {
                return Err(Error::Failed);
            }
            if let Some(description) = host.find_description_mut(&record.name) {
                description.clear_resources();
                description.update_time = Some(rx_time);
            }
            continue;
        }

        match record.rtype {
            RrType::Srv => {
                if record.class != message.zone_class {
                    return Err(Error::Failed);
                }
                let srv = read_srv(record, msg)?;
                if !name::is_sub_domain_of(&record.name, domain) {
                    return Err(Error::Security);
                }
                if !host.matches(&srv.target) {
                    return Err(Error::Failed);
                }
                let description = host
                    .find_description_mut(&record.name)
                    .ok_or(Error::Failed)?;
                // Only the first SRV record may populate a description.
                if description.port != 0 {
                    return Err(Error::Failed);
                }
                description.priority = srv.priority;
                description.weight = srv.weight;
                description.port = srv.port;
                description.update_time = Some(rx_time);
            }
            RrType::Txt => {
                if record.class != message.zone_class {
                    return Err(Error::Failed);
                }
                let data = record.rdata(msg);
                if !verify_txt_data(data) {
                    return Err(Error::Parse);
                }
                let description = host
                    .find_description_mut(&record.name)
                    .ok_or(Error::Failed)?;
                description.txt_data = Some(Bytes::copy_from_slice(data));
            }
            _ => {}
        }
    }

    // Every description must have been touched by this very message, and
    // SRV and TXT only ever arrive as a pair.
    for description in host.descriptions() {
        if description.update_time != Some(rx_time) {
            return Err(Error::Failed);
        }
        if (description.port == 0) != description.txt_data.is_none() {
            return Err(Error::Failed);
        }
    }

    Ok(())
}

/// Additional section: exactly one OPT with the Update Lease option
/// followed by one SIG(0). Stores the requested leases on the host and
/// returns the SIG record for verification.
pub fn process_additional(
    host: &mut Host,
    msg: &[u8],
    message: &UpdateMessage,
) -> Result<(RawRecord, Sig), Error> {
    if message.additional.len() != 2 {
        return Err(Error::Failed);
    }

    let lease_option = read_lease_option(&message.additional[0], msg)?;
    host.lease = lease_option.lease;
    host.key_lease = lease_option.key_lease;

    // A registration (nonzero lease) must come with at least one usable
    // address.
    if host.lease > 0 && host.addresses().is_empty() {
        return Err(Error::Failed);
    }

    let sig_record = message.additional[1].clone();
    if sig_record.rtype != RrType::Sig || sig_record.name != "." {
        return Err(Error::Parse);
    }
    let sig = read_sig(&sig_record, msg)?;
    if sig.algorithm != ALGORITHM_ECDSA_P256_SHA256 || sig.type_covered != 0 {
        return Err(Error::Failed);
    }
    if sig.signature_len != SIGNATURE_SIZE {
        return Err(Error::Parse);
    }

    Ok((sig_record, sig))
}
