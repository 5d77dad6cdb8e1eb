//! The registration server core: lifecycle, message processing, commit,
//! lease expiry and the outstanding-update queue.
//!
//! All methods are synchronous and take explicit `now` timestamps; the
//! async driver in [`crate::runtime`] delivers socket datagrams, timer
//! fires and control commands one at a time, so every mutation here is
//! atomic from an outside observer's view.

use std::collections::VecDeque;
use std::fmt;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::Error;
use crate::handler::{ServiceUpdateHandler, UpdateId};
use crate::lease::LeaseConfig;
use crate::publisher::{Event, Publisher};
use crate::registry::{Host, Retention};
use crate::settings::{ServerInfo, Settings};
use crate::sig0;
use crate::update::{self, MessageMetadata, UpdateMessage};
use crate::wire::header::{Flags, Header, Opcode, ResponseCode, WriteHeader, HEADER_SIZE};
use crate::wire::name::{name_eq, Name, MAX_NAME_SIZE};
use crate::wire::record::lease::WriteLeaseOption;
use crate::{ANYCAST_PORT, DEFAULT_DOMAIN, EVENTS_HANDLER_TIMEOUT, UDP_PORT_MAX, UDP_PORT_MIN};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disabled,
    Stopped,
    Running,
}

/// How the server address is published in the mesh network data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// A mesh-local address plus a port from the configured window.
    Unicast,
    /// The well-known anycast address keyed by a sequence number; the
    /// port is fixed.
    Anycast,
}

impl fmt::Display for AddressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressMode::Unicast => "unicast",
            AddressMode::Anycast => "anycast",
        })
    }
}

/// Reply path for messages forwarded by a co-resident DNS-SD server bound
/// to the same port. Handed in at construction; neither side may close the
/// shared socket on its own.
pub trait SharedTransport: Send + Sync {
    fn port(&self) -> u16;
    fn send_to(&self, payload: &[u8], peer: SocketAddr);
}

enum SocketState {
    Closed,
    Owned(Arc<UdpSocket>),
    /// Inbound messages arrive via `handle_dnssd_receive`, replies leave
    /// through the shared transport.
    Shared,
}

/// One outstanding advertiser callback.
struct UpdateMetadata {
    id: UpdateId,
    dns_header: Header,
    peer: Option<SocketAddr>,
    lease_config: LeaseConfig,
    host: Host,
    expire_time: Instant,
}

pub struct Server {
    state: State,
    address_mode: AddressMode,
    anycast_sequence_number: u8,
    domain: Name,
    port: u16,
    lease_config: LeaseConfig,
    hosts: Vec<Host>,
    /// Newest at the front; the back entry expires first.
    outstanding: VecDeque<UpdateMetadata>,
    next_update_id: u32,
    has_registered_any_service: bool,
    socket: SocketState,
    dnssd: Option<Arc<dyn SharedTransport>>,
    publisher: Box<dyn Publisher>,
    settings: Box<dyn Settings>,
    handler: Option<Box<dyn ServiceUpdateHandler>>,
    lease_deadline: Option<Instant>,
    outstanding_deadline: Option<Instant>,
}

impl Server {
    pub fn new(publisher: Box<dyn Publisher>, settings: Box<dyn Settings>) -> Self {
        Self {
            state: State::Disabled,
            address_mode: AddressMode::Unicast,
            anycast_sequence_number: 0,
            domain: DEFAULT_DOMAIN.to_string(),
            port: UDP_PORT_MIN,
            lease_config: LeaseConfig::default(),
            hosts: Vec::new(),
            outstanding: VecDeque::new(),
            next_update_id: rand::random(),
            has_registered_any_service: false,
            socket: SocketState::Closed,
            dnssd: None,
            publisher,
            settings,
            handler: None,
            lease_deadline: None,
            outstanding_deadline: None,
        }
    }

    /// Wires up the co-resident DNS-SD server's socket capability.
    pub fn with_dnssd_transport(mut self, transport: Arc<dyn SharedTransport>) -> Self {
        self.dnssd = Some(transport);
        self
    }

    /// Installs the advertiser callback. Without one, updates commit
    /// immediately.
    pub fn set_service_handler(&mut self, handler: Box<dyn ServiceUpdateHandler>) {
        self.handler = Some(handler);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn lease_config(&self) -> &LeaseConfig {
        &self.lease_config
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn find_host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|host| host.matches(name))
    }

    pub fn lease_deadline(&self) -> Option<Instant> {
        self.lease_deadline
    }

    pub fn outstanding_deadline(&self) -> Option<Instant> {
        self.outstanding_deadline
    }

    pub(crate) fn socket_for_recv(&self) -> Option<Arc<UdpSocket>> {
        match &self.socket {
            SocketState::Owned(socket) => Some(socket.clone()),
            _ => None,
        }
    }

    // Configuration surface; everything below requires the Disabled state
    // except the lease config, which only needs to be self-consistent.

    pub fn set_address_mode(&mut self, mode: AddressMode) -> Result<(), Error> {
        if self.state != State::Disabled {
            return Err(Error::InvalidState);
        }
        if self.address_mode != mode {
            info!(target: "srp", "address mode: {} -> {}", self.address_mode, mode);
            self.address_mode = mode;
        }
        Ok(())
    }

    pub fn set_anycast_sequence_number(&mut self, sequence_number: u8) -> Result<(), Error> {
        if self.state != State::Disabled {
            return Err(Error::InvalidState);
        }
        self.anycast_sequence_number = sequence_number;
        info!(target: "srp", sequence_number, "set anycast sequence number");
        Ok(())
    }

    pub fn set_domain(&mut self, domain: &str) -> Result<(), Error> {
        if self.state != State::Disabled {
            return Err(Error::InvalidState);
        }
        if domain.is_empty() || domain.len() + 1 >= MAX_NAME_SIZE {
            return Err(Error::InvalidArgs);
        }
        self.domain = if domain.ends_with('.') {
            domain.to_string()
        } else {
            format!("{domain}.")
        };
        Ok(())
    }

    pub fn set_lease_config(&mut self, config: LeaseConfig) -> Result<(), Error> {
        if !config.is_valid() {
            return Err(Error::InvalidArgs);
        }
        self.lease_config = config;
        Ok(())
    }

    /// Enabling publishes the DNS/SRP address service entry and waits for
    /// the publisher to confirm it before listening; disabling unpublishes
    /// and drains everything.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            if self.state != State::Disabled {
                return;
            }
            self.state = State::Stopped;
            match self.address_mode {
                AddressMode::Unicast => {
                    self.select_port();
                    self.publisher.publish_unicast(self.port);
                }
                AddressMode::Anycast => {
                    self.port = ANYCAST_PORT;
                    self.publisher.publish_anycast(self.anycast_sequence_number);
                }
            }
        } else {
            if self.state == State::Disabled {
                return;
            }
            self.publisher.unpublish();
            self.stop();
            self.state = State::Disabled;
        }
    }

    /// Picks the port after the persisted one, wrapping back to the window
    /// start. Clients caching a stale server port across our reboots would
    /// otherwise keep talking to the wrong listener.
    fn select_port(&mut self) {
        self.port = UDP_PORT_MIN;
        if let Some(info) = self.settings.read_server_info() {
            self.port = info.port.wrapping_add(1);
            if !(UDP_PORT_MIN..=UDP_PORT_MAX).contains(&self.port) {
                self.port = UDP_PORT_MIN;
            }
        }
        info!(target: "srp", port = self.port, "selected port");
    }

    pub fn handle_publisher_event(&mut self, event: Event) {
        match event {
            Event::EntryAdded => self.start(),
            Event::EntryRemoved => self.stop(),
        }
    }

    fn start(&mut self) {
        if self.state != State::Stopped {
            return;
        }
        self.state = State::Running;
        self.prepare_socket();
        info!(target: "srp", port = self.port, "start listening");
    }

    fn stop(&mut self) {
        if self.state != State::Running {
            return;
        }
        self.state = State::Stopped;

        while !self.hosts.is_empty() {
            self.remove_host(0, Retention::DeleteName, true);
        }
        // Outstanding updates are dropped without completion; the
        // advertiser cannot cancel them yet.
        self.outstanding.clear();
        self.lease_deadline = None;
        self.outstanding_deadline = None;

        info!(target: "srp", port = self.port, "stop listening");
        self.socket = SocketState::Closed;
        self.has_registered_any_service = false;
    }

    fn prepare_socket(&mut self) {
        if let Some(dnssd) = &self.dnssd {
            if dnssd.port() == self.port {
                // Same port as the DNS-SD server: use its socket and drop
                // any of our own.
                self.socket = SocketState::Shared;
                return;
            }
        }
        if matches!(self.socket, SocketState::Owned(_)) {
            return;
        }
        match Self::open_socket(self.port) {
            Ok(socket) => self.socket = SocketState::Owned(Arc::new(socket)),
            Err(err) => {
                error!(target: "srp", port = self.port, %err, "failed to prepare socket");
                self.stop();
            }
        }
    }

    fn open_socket(port: u16) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        let address: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
        socket.bind(&address.into())?;
        UdpSocket::from_std(socket.into())
    }

    /// Called by the DNS-SD server when it starts or stops, so socket
    /// ownership can be re-evaluated.
    pub fn handle_dnssd_state_change(&mut self) {
        if self.state == State::Running {
            self.prepare_socket();
        }
    }

    /// Entry point for messages the co-resident DNS-SD server received on
    /// the shared socket. `Error::Drop` tells it the message is not ours.
    pub fn handle_dnssd_receive(
        &mut self,
        msg: &[u8],
        peer: SocketAddr,
        now: Instant,
    ) -> Result<(), Error> {
        if self.state != State::Running || !matches!(self.socket, SocketState::Shared) {
            return Err(Error::Drop);
        }
        self.handle_message(msg, Some(peer), now)
    }

    /// Processes one inbound datagram. `peer` is `None` for replicated
    /// messages, which never get a response.
    pub fn handle_message(
        &mut self,
        msg: &[u8],
        peer: Option<SocketAddr>,
        now: Instant,
    ) -> Result<(), Error> {
        let (_, header) = crate::wire::header::be_header(msg).map_err(|_| Error::Parse)?;
        if header.flags.response() || header.flags.opcode() != Opcode::Update {
            return Err(Error::Drop);
        }

        let metadata = MessageMetadata {
            dns_header: header,
            rx_time: now,
            lease_config: self.lease_config,
            peer,
        };

        if let Err(err) = self.process_dns_update(msg, &metadata) {
            info!(target: "srp", %err, "failed to handle update message");
            if let Some(peer) = metadata.peer {
                self.send_error_response(&metadata.dns_header, err, peer);
            }
            return Err(err);
        }
        Ok(())
    }

    fn process_dns_update(&mut self, msg: &[u8], metadata: &MessageMetadata) -> Result<(), Error> {
        debug!(target: "srp", peer = ?metadata.peer, "received update");

        let message = UpdateMessage::parse(msg)?;
        if !name_eq(&message.zone_name, &self.domain) {
            return Err(Error::Security);
        }

        if self.find_outstanding(metadata).is_some() {
            // The client's retransmission interval outlives our callback
            // timeout, so a retransmission means the first copy is still
            // in flight. Drop it silently.
            info!(
                target: "srp",
                message_id = metadata.dns_header.id,
                "drop duplicated update request",
            );
            return Ok(());
        }

        // SRP updates carry no prerequisites.
        if metadata.dns_header.prerequisite_count != 0 {
            return Err(Error::Failed);
        }

        let mut host = Host::new(metadata.rx_time);
        update::process_service_discovery(&mut host, msg, &message, &self.domain, metadata.rx_time)?;
        update::process_host_description(&mut host, msg, &message)?;
        update::process_service_description(
            &mut host,
            msg,
            &message,
            &self.domain,
            metadata.rx_time,
        )?;

        if self.has_name_conflicts_with(&host) {
            return Err(Error::Duplicated);
        }

        let (sig_record, sig) = update::process_additional(&mut host, msg, &message)?;
        let key = host.key().ok_or(Error::Failed)?;
        sig0::verify_signature(key, msg, &message.header, &sig_record, &sig)?;

        self.handle_update(host, metadata);
        Ok(())
    }

    /// Direct client retransmissions are identified by message id and
    /// source address while the original is outstanding.
    fn find_outstanding(&self, metadata: &MessageMetadata) -> Option<usize> {
        let peer = metadata.peer?;
        self.outstanding.iter().position(|update| {
            update.dns_header.id == metadata.dns_header.id && update.peer == Some(peer)
        })
    }

    /// Registering an instance name that lives on another host requires
    /// presenting that host's key.
    fn has_name_conflicts_with(&self, host: &Host) -> bool {
        let Some(name) = host.full_name() else {
            return false;
        };
        if let Some(existing) = self.find_host(name) {
            if existing.key() != host.key() {
                return true;
            }
        }
        for description in host.descriptions() {
            for other in &self.hosts {
                if other.find_description(description.instance_name()).is_some()
                    && other.key() != host.key()
                {
                    return true;
                }
            }
        }
        false
    }

    fn handle_update(&mut self, mut host: Host, metadata: &MessageMetadata) {
        // A host removal need not enumerate the registered services; fold
        // the missing ones into the transient host marked deleted so the
        // advertiser sees the complete set.
        if host.lease() == 0 {
            host.clear_resources();
            let existing_services: Vec<(String, String, bool)> = host
                .full_name()
                .and_then(|name| self.find_host(name))
                .map(|existing| {
                    existing
                        .services()
                        .iter()
                        .filter(|service| !service.is_deleted())
                        .filter(|service| {
                            host.find_service(service.service_name(), service.instance_name())
                                .is_none()
                        })
                        .map(|service| {
                            (
                                service.service_name().to_string(),
                                service.instance_name().to_string(),
                                service.is_sub_type(),
                            )
                        })
                        .collect()
                })
                .unwrap_or_default();
            for (service_name, instance_name, is_sub_type) in existing_services {
                let index =
                    host.add_service(&service_name, &instance_name, is_sub_type, metadata.rx_time);
                host.services[index].is_deleted = true;
                if let Some(description) = host.find_description_mut(&instance_name) {
                    description.update_time = Some(metadata.rx_time);
                }
            }
        }

        if self.handler.is_some() {
            let update = UpdateMetadata {
                id: self.allocate_id(),
                dns_header: metadata.dns_header,
                peer: metadata.peer,
                lease_config: metadata.lease_config,
                host,
                expire_time: metadata.rx_time + EVENTS_HANDLER_TIMEOUT,
            };
            info!(target: "srp", id = update.id, "service update handler is notified");
            if let Some(handler) = self.handler.as_mut() {
                handler.handle_update(update.id, &update.host, EVENTS_HANDLER_TIMEOUT);
            }
            self.outstanding.push_front(update);
            self.rearm_outstanding_timer();
        } else {
            self.commit_update(
                Ok(()),
                host,
                &metadata.dns_header,
                metadata.peer,
                &metadata.lease_config,
                metadata.rx_time,
            );
        }
    }

    /// Completion reported by the advertiser. Unknown ids belong to
    /// updates that already timed out and committed; they are discarded.
    pub fn handle_service_update_result(
        &mut self,
        id: UpdateId,
        result: Result<(), Error>,
        now: Instant,
    ) {
        match self.outstanding.iter().position(|update| update.id == id) {
            Some(index) => {
                info!(target: "srp", id, ?result, "handler result of update received");
                if let Some(update) = self.outstanding.remove(index) {
                    self.complete_update(update, result, now);
                }
            }
            None => {
                info!(target: "srp", id, "delayed update result; the update has been committed");
            }
        }
    }

    pub fn handle_outstanding_updates_timer(&mut self, now: Instant) {
        while self
            .outstanding
            .back()
            .is_some_and(|update| update.expire_time <= now)
        {
            if let Some(update) = self.outstanding.pop_back() {
                info!(target: "srp", id = update.id, "outstanding service update timeout");
                self.complete_update(update, Err(Error::ResponseTimeout), now);
            }
        }
        self.rearm_outstanding_timer();
    }

    fn complete_update(&mut self, update: UpdateMetadata, result: Result<(), Error>, now: Instant) {
        let UpdateMetadata {
            dns_header,
            peer,
            lease_config,
            host,
            ..
        } = update;
        self.commit_update(result, host, &dns_header, peer, &lease_config, now);
        self.rearm_outstanding_timer();
    }

    fn rearm_outstanding_timer(&mut self) {
        self.outstanding_deadline = self.outstanding.back().map(|update| update.expire_time);
    }

    fn allocate_id(&mut self) -> UpdateId {
        let id = self.next_update_id;
        self.next_update_id = self.next_update_id.wrapping_add(1);
        id
    }

    /// Applies a finished update to the registry and answers the client.
    ///
    /// A handler timeout still installs the update; only the client-facing
    /// response code reflects it. Every other failure leaves the registry
    /// untouched.
    fn commit_update(
        &mut self,
        result: Result<(), Error>,
        mut host: Host,
        dns_header: &Header,
        peer: Option<SocketAddr>,
        lease_config: &LeaseConfig,
        now: Instant,
    ) {
        let error = result.err();
        let install = error.is_none() || error == Some(Error::ResponseTimeout);

        if !install {
            if let Some(peer) = peer {
                self.send_error_response(dns_header, error.unwrap_or(Error::Failed), peer);
            }
            return;
        }

        let requested_lease = host.lease();
        let requested_key_lease = host.key_lease();
        let granted_lease = lease_config.grant_lease(requested_lease);
        let granted_key_lease = lease_config.grant_key_lease(requested_key_lease);

        host.lease = granted_lease;
        host.key_lease = granted_key_lease;
        for description in &mut host.descriptions {
            description.lease = granted_lease;
            description.key_lease = granted_key_lease;
        }

        let name = host.full_name().unwrap_or_default().to_string();
        let existing = self.hosts.iter().position(|h| h.matches(&name));

        if granted_lease == 0 {
            if granted_key_lease == 0 {
                info!(target: "srp", host = %name, "remove key of host");
                if let Some(index) = existing {
                    self.remove_host(index, Retention::DeleteName, false);
                }
            } else if let Some(index) = existing {
                // The name/key binding is re-leased from this update on.
                self.hosts[index].key_lease = granted_key_lease;
                self.hosts[index].update_time = now;
                self.remove_host(index, Retention::RetainName, false);
                let existing_host = &mut self.hosts[index];
                for service in 0..existing_host.services.len() {
                    existing_host.remove_service(service, Retention::RetainName);
                }
            }
        } else if let Some(index) = existing {
            self.hosts[index].merge_from(host, now);
        } else {
            info!(target: "srp", host = %name, "add new host");
            for service in &mut host.services {
                service.is_committed = true;
                service.log("add new");
            }
            self.add_host(host);

            if !self.has_registered_any_service && self.address_mode == AddressMode::Unicast {
                self.has_registered_any_service = true;
                self.settings.save_server_info(ServerInfo { port: self.port });
            }
        }

        self.handle_lease_timer(now);

        if let Some(peer) = peer {
            match error {
                None if granted_lease != requested_lease
                    || granted_key_lease != requested_key_lease =>
                {
                    self.send_lease_response(dns_header, granted_lease, granted_key_lease, peer);
                }
                None => self.send_response(dns_header, ResponseCode::NoError, peer),
                Some(err) => self.send_error_response(dns_header, err, peer),
            }
        }
    }

    fn add_host(&mut self, host: Host) {
        debug_assert!(host
            .full_name()
            .is_some_and(|name| self.find_host(name).is_none()));
        self.hosts.push(host);
    }

    fn remove_host(&mut self, index: usize, retention: Retention, notify: bool) {
        match retention {
            Retention::RetainName => {
                let host = &mut self.hosts[index];
                host.lease = 0;
                host.clear_resources();
                info!(
                    target: "srp",
                    host = self.hosts[index].full_name().unwrap_or_default(),
                    "remove host (but retain its name)",
                );
                if notify {
                    self.notify_host_changed(index);
                }
            }
            Retention::DeleteName => {
                let mut host = self.hosts.remove(index);
                host.lease = 0;
                host.key_lease = 0;
                host.clear_resources();
                info!(
                    target: "srp",
                    host = host.full_name().unwrap_or_default(),
                    "fully remove host",
                );
                if notify {
                    self.notify_host_removed(&host);
                }
            }
        }
    }

    fn remove_service(
        &mut self,
        host_index: usize,
        service_index: usize,
        retention: Retention,
        notify: bool,
    ) {
        self.hosts[host_index].mark_service_deleted(service_index, retention);
        if notify {
            self.notify_host_changed(host_index);
        }
        if retention == Retention::DeleteName {
            self.hosts[host_index].drop_service(service_index);
        }
    }

    // Server-initiated removals notify the advertiser with a fresh id but
    // never wait for its reply: the entity is gone either way.

    fn notify_host_changed(&mut self, index: usize) {
        if self.handler.is_none() {
            return;
        }
        let id = self.allocate_id();
        info!(target: "srp", id, "service update handler is notified");
        let host = &self.hosts[index];
        if let Some(handler) = self.handler.as_mut() {
            handler.handle_update(id, host, EVENTS_HANDLER_TIMEOUT);
        }
    }

    fn notify_host_removed(&mut self, host: &Host) {
        if self.handler.is_none() {
            return;
        }
        let id = self.allocate_id();
        info!(target: "srp", id, "service update handler is notified");
        if let Some(handler) = self.handler.as_mut() {
            handler.handle_update(id, host, EVENTS_HANDLER_TIMEOUT);
        }
    }

    /// Walks every host and service, removes what expired and re-arms the
    /// single lease timer at the earliest remaining deadline.
    pub fn handle_lease_timer(&mut self, now: Instant) {
        let mut earliest: Option<Instant> = None;

        let mut i = 0;
        while i < self.hosts.len() {
            if self.hosts[i].key_expire_time() <= now {
                info!(
                    target: "srp",
                    host = self.hosts[i].full_name().unwrap_or_default(),
                    "KEY LEASE of host expired",
                );
                self.remove_host(i, Retention::DeleteName, true);
                continue;
            }

            if self.hosts[i].is_deleted() {
                // Deleted host: only the retained names are ticking.
                earliest = min_deadline(earliest, self.hosts[i].key_expire_time());
                let mut s = 0;
                while s < self.hosts[i].services.len() {
                    let key_expire = self.hosts[i].service_key_expire_time(s);
                    if key_expire <= now {
                        self.hosts[i].services[s].log("KEY LEASE expired for");
                        self.remove_service(i, s, Retention::DeleteName, true);
                        continue;
                    }
                    earliest = min_deadline(earliest, key_expire);
                    s += 1;
                }
                i += 1;
                continue;
            }

            if self.hosts[i].expire_time() <= now {
                info!(
                    target: "srp",
                    host = self.hosts[i].full_name().unwrap_or_default(),
                    "LEASE of host expired",
                );
                // The host-level notification below covers the services.
                for s in 0..self.hosts[i].services.len() {
                    self.hosts[i].remove_service(s, Retention::RetainName);
                }
                self.remove_host(i, Retention::RetainName, true);
                earliest = min_deadline(earliest, self.hosts[i].key_expire_time());
                i += 1;
                continue;
            }

            earliest = min_deadline(earliest, self.hosts[i].expire_time());
            let mut s = 0;
            while s < self.hosts[i].services.len() {
                let key_expire = self.hosts[i].service_key_expire_time(s);
                if key_expire <= now {
                    self.hosts[i].services[s].log("KEY LEASE expired for");
                    self.remove_service(i, s, Retention::DeleteName, true);
                    continue;
                }
                if self.hosts[i].services[s].is_deleted() {
                    earliest = min_deadline(earliest, key_expire);
                } else if self.hosts[i].service_expire_time(s) <= now {
                    self.hosts[i].services[s].log("LEASE expired for");
                    self.remove_service(i, s, Retention::RetainName, true);
                    earliest = min_deadline(earliest, key_expire);
                } else {
                    earliest = min_deadline(earliest, self.hosts[i].service_expire_time(s));
                }
                s += 1;
            }
            i += 1;
        }

        match earliest {
            Some(deadline) => {
                debug!(
                    target: "srp",
                    "lease timer scheduled in {:?}",
                    deadline.saturating_duration_since(now),
                );
                self.lease_deadline = Some(deadline);
            }
            None => {
                debug!(target: "srp", "lease timer stopped");
                self.lease_deadline = None;
            }
        }
    }

    fn send_response(&self, request: &Header, code: ResponseCode, peer: SocketAddr) {
        let header = Header {
            id: request.id,
            flags: Flags::new()
                .with_response(true)
                .with_opcode(request.flags.opcode())
                .with_response_code(code),
            ..Header::default()
        };
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_header(&header);
        self.send_to(&buf, peer);

        if code == ResponseCode::NoError {
            info!(target: "srp", "send success response");
        } else {
            info!(target: "srp", ?code, "send fail response");
        }
    }

    fn send_error_response(&self, request: &Header, err: Error, peer: SocketAddr) {
        self.send_response(request, response_code_for(err), peer);
    }

    /// Success response carrying the granted values when they differ from
    /// the requested ones.
    fn send_lease_response(&self, request: &Header, lease: u32, key_lease: u32, peer: SocketAddr) {
        let header = Header {
            id: request.id,
            flags: Flags::new()
                .with_response(true)
                .with_opcode(request.flags.opcode()),
            additional_count: 1,
            ..Header::default()
        };
        let mut buf = BytesMut::with_capacity(64);
        buf.put_header(&header);
        buf.put_lease_opt(lease, key_lease);
        self.send_to(&buf, peer);

        info!(target: "srp", lease, key_lease, "send response with granted lease");
    }

    fn send_to(&self, payload: &[u8], peer: SocketAddr) {
        match &self.socket {
            SocketState::Owned(socket) => {
                if let Err(err) = socket.try_send_to(payload, peer) {
                    warn!(target: "srp", %err, "failed to send response");
                }
            }
            SocketState::Shared => {
                if let Some(dnssd) = &self.dnssd {
                    dnssd.send_to(payload, peer);
                }
            }
            SocketState::Closed => {
                warn!(target: "srp", "no socket to send response");
            }
        }
    }
}

fn min_deadline(earliest: Option<Instant>, candidate: Instant) -> Option<Instant> {
    Some(earliest.map_or(candidate, |current| current.min(candidate)))
}

fn response_code_for(err: Error) -> ResponseCode {
    match err {
        Error::NoBufs => ResponseCode::ServerFailure,
        Error::Parse => ResponseCode::FormatError,
        Error::Duplicated => ResponseCode::NameExists,
        _ => ResponseCode::Refused,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn response_code_mapping() {
        assert_eq!(response_code_for(Error::NoBufs), ResponseCode::ServerFailure);
        assert_eq!(response_code_for(Error::Parse), ResponseCode::FormatError);
        assert_eq!(response_code_for(Error::Duplicated), ResponseCode::NameExists);
        assert_eq!(response_code_for(Error::Security), ResponseCode::Refused);
        assert_eq!(response_code_for(Error::ResponseTimeout), ResponseCode::Refused);
    }

    #[test]
    fn min_deadline_tracks_earliest() {
        let now = Instant::now();
        let later = now + std::time::Duration::from_secs(5);
        assert_eq!(min_deadline(None, later), Some(later));
        assert_eq!(min_deadline(Some(now), later), Some(now));
        assert_eq!(min_deadline(Some(later), now), Some(now));
    }
}
