//! Async driver: one task owns the whole server and handles socket
//! datagrams, timer fires, publisher notifications and advertiser results
//! strictly one at a time.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::errors::Error;
use crate::handler::UpdateId;
use crate::lease::LeaseConfig;
use crate::publisher::Event;
use crate::server::{AddressMode, Server};

pub enum Command {
    SetEnabled(bool),
    SetAddressMode(AddressMode, oneshot::Sender<Result<(), Error>>),
    SetAnycastSequenceNumber(u8, oneshot::Sender<Result<(), Error>>),
    SetDomain(String, oneshot::Sender<Result<(), Error>>),
    SetLeaseConfig(LeaseConfig, oneshot::Sender<Result<(), Error>>),
    PublisherEvent(Event),
    ServiceUpdateResult(UpdateId, Result<(), Error>),
    DnssdStateChange,
    DnssdReceive(Bytes, SocketAddr, oneshot::Sender<Result<(), Error>>),
}

/// Cloneable control handle. Commands are applied by the server task in
/// arrival order; acknowledged setters report the server's verdict.
#[derive(Clone)]
pub struct Handle {
    tx: mpsc::UnboundedSender<Command>,
}

impl Handle {
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.tx.send(Command::SetEnabled(enabled));
    }

    pub async fn set_address_mode(&self, mode: AddressMode) -> Result<(), Error> {
        self.request(|reply| Command::SetAddressMode(mode, reply))
            .await
    }

    pub async fn set_anycast_sequence_number(&self, sequence_number: u8) -> Result<(), Error> {
        self.request(|reply| Command::SetAnycastSequenceNumber(sequence_number, reply))
            .await
    }

    pub async fn set_domain(&self, domain: impl Into<String>) -> Result<(), Error> {
        let domain = domain.into();
        self.request(|reply| Command::SetDomain(domain, reply)).await
    }

    pub async fn set_lease_config(&self, config: LeaseConfig) -> Result<(), Error> {
        self.request(|reply| Command::SetLeaseConfig(config, reply))
            .await
    }

    /// Network-data publisher notification (entry added/removed).
    pub fn publisher_event(&self, event: Event) {
        let _ = self.tx.send(Command::PublisherEvent(event));
    }

    /// Advertiser completion for the update with the given id.
    pub fn service_update_result(&self, id: UpdateId, result: Result<(), Error>) {
        let _ = self.tx.send(Command::ServiceUpdateResult(id, result));
    }

    /// The co-resident DNS-SD server started or stopped.
    pub fn dnssd_state_change(&self) {
        let _ = self.tx.send(Command::DnssdStateChange);
    }

    /// Offers a datagram the DNS-SD server received on the shared socket.
    /// `Error::Drop` means the message is not ours.
    pub async fn dnssd_receive(&self, payload: Bytes, peer: SocketAddr) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::DnssdReceive(payload, peer, reply))
            .map_err(|_| Error::InvalidState)?;
        response.await.map_err(|_| Error::InvalidState)?
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<(), Error>>) -> Command,
    ) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| Error::InvalidState)?;
        response.await.map_err(|_| Error::InvalidState)?
    }
}

impl Server {
    /// Splits the server into a control handle and the future driving it.
    /// The future completes when every handle is gone.
    pub fn launch(self) -> (Handle, impl std::future::Future<Output = ()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Handle { tx }, self.run(rx))
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let socket = self.socket_for_recv();
            let lease_deadline = self.lease_deadline();
            let outstanding_deadline = self.outstanding_deadline();

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => break,
                    }
                }
                received = recv_datagram(socket.clone()), if socket.is_some() => {
                    if let Some((payload, peer)) = received {
                        let _ = self.handle_message(&payload, Some(peer), Instant::now());
                    }
                }
                _ = sleep_until(lease_deadline.unwrap_or_else(Instant::now)),
                    if lease_deadline.is_some() =>
                {
                    self.handle_lease_timer(Instant::now());
                }
                _ = sleep_until(outstanding_deadline.unwrap_or_else(Instant::now)),
                    if outstanding_deadline.is_some() =>
                {
                    self.handle_outstanding_updates_timer(Instant::now());
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::SetEnabled(enabled) => self.set_enabled(enabled),
            Command::SetAddressMode(mode, reply) => {
                let _ = reply.send(self.set_address_mode(mode));
            }
            Command::SetAnycastSequenceNumber(sequence_number, reply) => {
                let _ = reply.send(self.set_anycast_sequence_number(sequence_number));
            }
            Command::SetDomain(domain, reply) => {
                let _ = reply.send(self.set_domain(&domain));
            }
            Command::SetLeaseConfig(config, reply) => {
                let _ = reply.send(self.set_lease_config(config));
            }
            Command::PublisherEvent(event) => self.handle_publisher_event(event),
            Command::ServiceUpdateResult(id, result) => {
                self.handle_service_update_result(id, result, now);
            }
            Command::DnssdStateChange => self.handle_dnssd_state_change(),
            Command::DnssdReceive(payload, peer, reply) => {
                let _ = reply.send(self.handle_dnssd_receive(&payload, peer, now));
            }
        }
    }
}

async fn recv_datagram(socket: Option<Arc<UdpSocket>>) -> Option<(Bytes, SocketAddr)> {
    let socket = socket?;
    let mut buf = [0u8; 1232];
    match socket.recv_from(&mut buf).await {
        Ok((len, peer)) => Some((Bytes::copy_from_slice(&buf[..len]), peer)),
        Err(err) => {
            debug!(target: "srp", %err, "udp receive failed");
            None
        }
    }
}
