//! In-memory registration state: hosts, their services and the shared
//! service descriptions.
//!
//! A `Host` owns its services and descriptions. Services reference their
//! description by instance name; a base-type service and every subtype of
//! the same instance share one description. Unreferenced descriptions are
//! reaped eagerly.

use std::net::Ipv6Addr;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::Error;
use crate::wire::name::{name_eq, Name};
use crate::wire::record::key::KeyRecord;
use crate::{MAX_HOST_ADDRESSES, SUB_TYPE_LABEL};

/// Whether a removal keeps the entity's name (and key lease) registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    RetainName,
    DeleteName,
}

/// A (service type, instance) pair attached to one host.
#[derive(Debug, Clone)]
pub struct Service {
    pub(crate) service_name: Name,
    pub(crate) instance_name: Name,
    pub(crate) is_sub_type: bool,
    pub(crate) is_deleted: bool,
    pub(crate) is_committed: bool,
    pub(crate) update_time: Instant,
}

impl Service {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn is_sub_type(&self) -> bool {
        self.is_sub_type
    }

    /// Deleted services keep their instance name claimed until the key
    /// lease runs out.
    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn update_time(&self) -> Instant {
        self.update_time
    }

    /// The label ahead of the `._sub.` marker, for subtype services.
    pub fn sub_type_label(&self) -> Option<&str> {
        self.service_name
            .find(SUB_TYPE_LABEL)
            .map(|at| &self.service_name[..at])
    }

    pub(crate) fn matches(&self, service_name: &str, instance_name: &str) -> bool {
        name_eq(&self.service_name, service_name) && name_eq(&self.instance_name, instance_name)
    }

    /// Only committed services show up in the log; transient ones from a
    /// half-processed update do not.
    pub(crate) fn log(&self, action: &str) {
        if self.is_committed {
            info!(
                target: "srp",
                instance = %self.instance_name,
                sub_type = self.sub_type_label().unwrap_or_default(),
                "{action} service",
            );
        }
    }
}

/// SRV/TXT state shared by a base-type service and its subtypes.
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    pub(crate) instance_name: Name,
    pub(crate) priority: u16,
    pub(crate) weight: u16,
    pub(crate) port: u16,
    pub(crate) txt_data: Option<Bytes>,
    pub(crate) lease: u32,
    pub(crate) key_lease: u32,
    pub(crate) update_time: Option<Instant>,
}

impl ServiceDescription {
    fn new(instance_name: &str) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            priority: 0,
            weight: 0,
            port: 0,
            txt_data: None,
            lease: 0,
            key_lease: 0,
            update_time: None,
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn weight(&self) -> u16 {
        self.weight
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn txt_data(&self) -> Option<&[u8]> {
        self.txt_data.as_deref()
    }

    pub fn lease(&self) -> u32 {
        self.lease
    }

    pub fn key_lease(&self) -> u32 {
        self.key_lease
    }

    pub(crate) fn clear_resources(&mut self) {
        self.port = 0;
        self.txt_data = None;
    }

    pub(crate) fn take_resources_from(&mut self, other: &mut ServiceDescription, now: Instant) {
        self.txt_data = other.txt_data.take();
        self.priority = other.priority;
        self.weight = other.weight;
        self.port = other.port;
        self.lease = other.lease;
        self.key_lease = other.key_lease;
        self.update_time = Some(now);
    }
}

/// One registered host, unique by full name. Also used as the transient
/// aggregate while an update message is parsed, which is why name and key
/// are optional: both must be present before the host reaches the registry.
#[derive(Debug, Clone)]
pub struct Host {
    pub(crate) full_name: Option<Name>,
    pub(crate) key: Option<KeyRecord>,
    pub(crate) addresses: Vec<Ipv6Addr>,
    pub(crate) lease: u32,
    pub(crate) key_lease: u32,
    pub(crate) update_time: Instant,
    pub(crate) services: Vec<Service>,
    pub(crate) descriptions: Vec<ServiceDescription>,
}

impl Host {
    pub fn new(update_time: Instant) -> Self {
        Self {
            full_name: None,
            key: None,
            addresses: Vec::new(),
            lease: 0,
            key_lease: 0,
            update_time,
            services: Vec::new(),
            descriptions: Vec::new(),
        }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    pub fn key(&self) -> Option<&KeyRecord> {
        self.key.as_ref()
    }

    pub fn addresses(&self) -> &[Ipv6Addr] {
        &self.addresses
    }

    pub fn lease(&self) -> u32 {
        self.lease
    }

    pub fn key_lease(&self) -> u32 {
        self.key_lease
    }

    /// A host with zero lease is deleted; its name stays claimed while the
    /// key lease lasts.
    pub fn is_deleted(&self) -> bool {
        self.lease == 0
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn descriptions(&self) -> &[ServiceDescription] {
        &self.descriptions
    }

    pub fn update_time(&self) -> Instant {
        self.update_time
    }

    pub fn expire_time(&self) -> Instant {
        self.update_time + Duration::from_secs(u64::from(self.lease))
    }

    pub fn key_expire_time(&self) -> Instant {
        self.update_time + Duration::from_secs(u64::from(self.key_lease))
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        self.full_name.as_deref().is_some_and(|n| name_eq(n, name))
    }

    /// The name is immutable once set; a second owner name may only repeat
    /// it.
    pub(crate) fn set_full_name(&mut self, name: &str) -> Result<(), Error> {
        match self.full_name.as_deref() {
            None => {
                self.full_name = Some(name.to_string());
                Ok(())
            }
            Some(existing) if name_eq(existing, name) => Ok(()),
            Some(_) => Err(Error::Failed),
        }
    }

    pub(crate) fn set_key(&mut self, key: KeyRecord) {
        debug_assert!(key.is_valid());
        self.key = Some(key);
    }

    /// Appends a unicast address. Multicast, loopback, unspecified and
    /// duplicate addresses are dropped, as is anything past the capacity.
    pub(crate) fn add_address(&mut self, address: Ipv6Addr) -> Result<(), Error> {
        if address.is_multicast() || address.is_loopback() || address.is_unspecified() {
            return Err(Error::Drop);
        }
        if self.addresses.contains(&address) {
            return Err(Error::Drop);
        }
        if self.addresses.len() >= MAX_HOST_ADDRESSES {
            warn!(
                target: "srp",
                host = self.full_name().unwrap_or_default(),
                "too many addresses for host",
            );
            return Err(Error::Drop);
        }
        self.addresses.push(address);
        Ok(())
    }

    pub(crate) fn clear_resources(&mut self) {
        self.addresses.clear();
    }

    pub fn find_service(&self, service_name: &str, instance_name: &str) -> Option<usize> {
        self.services
            .iter()
            .position(|service| service.matches(service_name, instance_name))
    }

    pub fn find_description(&self, instance_name: &str) -> Option<&ServiceDescription> {
        self.descriptions
            .iter()
            .find(|description| name_eq(&description.instance_name, instance_name))
    }

    pub(crate) fn find_description_mut(
        &mut self,
        instance_name: &str,
    ) -> Option<&mut ServiceDescription> {
        self.descriptions
            .iter_mut()
            .find(|description| name_eq(&description.instance_name, instance_name))
    }

    fn take_description(&mut self, instance_name: &str) -> Option<ServiceDescription> {
        let at = self
            .descriptions
            .iter()
            .position(|description| name_eq(&description.instance_name, instance_name))?;
        Some(self.descriptions.remove(at))
    }

    /// Appends a new service, creating the shared description when this is
    /// the first service of the instance. Returns the service index.
    pub(crate) fn add_service(
        &mut self,
        service_name: &str,
        instance_name: &str,
        is_sub_type: bool,
        update_time: Instant,
    ) -> usize {
        if self.find_description(instance_name).is_none() {
            self.descriptions.push(ServiceDescription::new(instance_name));
        }
        self.services.push(Service {
            service_name: service_name.to_string(),
            instance_name: instance_name.to_string(),
            is_sub_type,
            is_deleted: false,
            is_committed: false,
            update_time,
        });
        self.services.len() - 1
    }

    /// Marks the service deleted; with `DeleteName` it is dropped entirely
    /// along with a description nothing references anymore.
    pub(crate) fn remove_service(&mut self, index: usize, retention: Retention) {
        self.mark_service_deleted(index, retention);
        if retention == Retention::DeleteName {
            self.drop_service(index);
        }
    }

    pub(crate) fn mark_service_deleted(&mut self, index: usize, retention: Retention) {
        let service = &mut self.services[index];
        service.is_deleted = true;
        service.log(match retention {
            Retention::RetainName => "remove (retaining the name of)",
            Retention::DeleteName => "fully remove",
        });
    }

    pub(crate) fn drop_service(&mut self, index: usize) {
        let service = self.services.remove(index);
        if self
            .services
            .iter()
            .all(|other| !name_eq(&other.instance_name, &service.instance_name))
        {
            self.descriptions
                .retain(|description| !name_eq(&description.instance_name, &service.instance_name));
        }
    }

    pub(crate) fn service_expire_time(&self, index: usize) -> Instant {
        let service = &self.services[index];
        let lease = self
            .find_description(&service.instance_name)
            .map_or(0, |description| description.lease);
        service.update_time + Duration::from_secs(u64::from(lease))
    }

    pub(crate) fn service_key_expire_time(&self, index: usize) -> Instant {
        let service = &self.services[index];
        let key_lease = self
            .find_description(&service.instance_name)
            .map_or(0, |description| description.key_lease);
        service.update_time + Duration::from_secs(u64::from(key_lease))
    }

    /// Merges services and owned resources from a freshly parsed host into
    /// this registered one. Deleted incoming services remove their match
    /// retaining the name; the rest are added or refreshed, with SRV/TXT
    /// resources taken from the base-type service only (subtypes share the
    /// description).
    pub(crate) fn merge_from(&mut self, mut other: Host, now: Instant) {
        info!(
            target: "srp",
            host = self.full_name().unwrap_or_default(),
            "update host",
        );

        self.addresses = std::mem::take(&mut other.addresses);
        self.key = other.key.take();
        self.lease = other.lease;
        self.key_lease = other.key_lease;
        self.update_time = now;

        for incoming in std::mem::take(&mut other.services) {
            let existing = self.find_service(&incoming.service_name, &incoming.instance_name);

            if incoming.is_deleted {
                if let Some(index) = existing {
                    self.remove_service(index, Retention::RetainName);
                }
                continue;
            }

            let index = existing.unwrap_or_else(|| {
                self.add_service(
                    &incoming.service_name,
                    &incoming.instance_name,
                    incoming.is_sub_type,
                    incoming.update_time,
                )
            });
            let service = &mut self.services[index];
            service.is_deleted = false;
            service.is_committed = true;
            service.update_time = now;

            if !incoming.is_sub_type {
                if let Some(mut source) = other.take_description(&incoming.instance_name) {
                    if let Some(target) = self.find_description_mut(&incoming.instance_name) {
                        target.take_resources_from(&mut source, now);
                    }
                }
            }

            self.services[index].log(if existing.is_some() {
                "update existing"
            } else {
                "add new"
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn now() -> Instant {
        Instant::now()
    }

    fn key(fill: u8) -> KeyRecord {
        KeyRecord {
            flags: 0x0200,
            protocol: 3,
            algorithm: 13,
            public_key: [fill; 64],
        }
    }

    #[test]
    fn full_name_is_immutable() {
        let mut host = Host::new(now());
        host.set_full_name("h1.example.").unwrap();
        assert!(host.set_full_name("H1.example.").is_ok());
        assert_eq!(host.set_full_name("h2.example."), Err(Error::Failed));
        assert_eq!(host.full_name(), Some("h1.example."));
    }

    #[test]
    fn address_filtering() {
        let mut host = Host::new(now());
        assert_eq!(
            host.add_address("ff02::1".parse().unwrap()),
            Err(Error::Drop)
        );
        assert_eq!(host.add_address("::1".parse().unwrap()), Err(Error::Drop));
        assert_eq!(host.add_address("::".parse().unwrap()), Err(Error::Drop));
        host.add_address("fd00::1".parse().unwrap()).unwrap();
        assert_eq!(
            host.add_address("fd00::1".parse().unwrap()),
            Err(Error::Drop)
        );
        assert_eq!(host.addresses().len(), 1);
    }

    #[test]
    fn address_capacity_is_bounded() {
        let mut host = Host::new(now());
        for i in 0..MAX_HOST_ADDRESSES as u16 {
            host.add_address(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, i + 1))
                .unwrap();
        }
        assert_eq!(
            host.add_address("fd00::ffff".parse().unwrap()),
            Err(Error::Drop)
        );
        assert_eq!(host.addresses().len(), MAX_HOST_ADDRESSES);
    }

    #[test]
    fn subtypes_share_one_description() {
        let mut host = Host::new(now());
        host.add_service("_t._tcp.example.", "i1._t._tcp.example.", false, now());
        host.add_service(
            "_s._sub._t._tcp.example.",
            "i1._t._tcp.example.",
            true,
            now(),
        );
        assert_eq!(host.services().len(), 2);
        assert_eq!(host.descriptions().len(), 1);
        assert_eq!(
            host.services()[1].sub_type_label(),
            Some("_s")
        );
    }

    #[test]
    fn dropping_last_service_reaps_description() {
        let mut host = Host::new(now());
        host.add_service("_t._tcp.example.", "i1._t._tcp.example.", false, now());
        host.add_service(
            "_s._sub._t._tcp.example.",
            "i1._t._tcp.example.",
            true,
            now(),
        );
        host.remove_service(1, Retention::DeleteName);
        assert_eq!(host.descriptions().len(), 1);
        host.remove_service(0, Retention::DeleteName);
        assert!(host.descriptions().is_empty());
        assert!(host.services().is_empty());
    }

    #[test]
    fn retained_removal_keeps_name() {
        let mut host = Host::new(now());
        host.add_service("_t._tcp.example.", "i1._t._tcp.example.", false, now());
        host.remove_service(0, Retention::RetainName);
        assert!(host.services()[0].is_deleted());
        assert_eq!(host.descriptions().len(), 1);
    }

    #[test]
    fn merge_updates_and_removes_elementwise() {
        let t0 = now();
        let mut registered = Host::new(t0);
        registered.set_full_name("h1.example.").unwrap();
        registered.set_key(key(1));
        let a = registered.add_service("_a._udp.example.", "i1._a._udp.example.", false, t0);
        registered.services[a].is_committed = true;
        registered.find_description_mut("i1._a._udp.example.").unwrap().port = 1;
        registered.add_service("_b._udp.example.", "i2._b._udp.example.", false, t0);

        let mut incoming = Host::new(t0);
        incoming.set_full_name("h1.example.").unwrap();
        incoming.set_key(key(1));
        incoming.add_address("fd00::2".parse().unwrap()).unwrap();
        incoming.lease = 3600;
        incoming.key_lease = 7200;
        // refresh i1 with new SRV data, delete i2
        let s = incoming.add_service("_a._udp.example.", "i1._a._udp.example.", false, t0);
        incoming.services[s].update_time = t0;
        {
            let description = incoming.find_description_mut("i1._a._udp.example.").unwrap();
            description.port = 4242;
            description.txt_data = Some(Bytes::from_static(b"\x05key=v"));
            description.lease = 3600;
            description.key_lease = 7200;
        }
        let s = incoming.add_service("_b._udp.example.", "i2._b._udp.example.", false, t0);
        incoming.services[s].is_deleted = true;

        registered.merge_from(incoming, t0);

        assert_eq!(registered.lease(), 3600);
        assert_eq!(registered.addresses(), ["fd00::2".parse::<Ipv6Addr>().unwrap()]);
        let i1 = registered.find_service("_a._udp.example.", "i1._a._udp.example.").unwrap();
        assert!(!registered.services()[i1].is_deleted());
        assert_eq!(registered.find_description("i1._a._udp.example.").unwrap().port(), 4242);
        assert_eq!(
            registered.find_description("i1._a._udp.example.").unwrap().txt_data(),
            Some(b"\x05key=v".as_slice())
        );
        let i2 = registered.find_service("_b._udp.example.", "i2._b._udp.example.").unwrap();
        assert!(registered.services()[i2].is_deleted());
    }
}
