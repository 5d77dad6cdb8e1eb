//! SRP (Service Registration Protocol) server.
//!
//! Low-power mesh devices register a host (name, IPv6 addresses, ECDSA
//! P-256 key) and its services by sending signed DNS UPDATE messages
//! ([RFC 2136] + SIG(0) per [RFC 2931]). The server validates the update,
//! grants a bounded lease, stores the registration and forwards the
//! effective change to an external mDNS advertiser through the
//! [`handler::ServiceUpdateHandler`] callback.
//!
//! [RFC 2136]: https://datatracker.ietf.org/doc/html/rfc2136
//! [RFC 2931]: https://datatracker.ietf.org/doc/html/rfc2931

use std::time::Duration;

pub mod errors;
pub mod handler;
pub mod lease;
pub mod publisher;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod settings;
pub mod sig0;
pub mod update;
pub mod wire;

/// Domain served when none is configured.
pub const DEFAULT_DOMAIN: &str = "default.service.arpa.";

/// Marker label inside a service type name that makes it a subtype, as in
/// `_printer._sub._http._tcp.default.service.arpa.`.
pub const SUB_TYPE_LABEL: &str = "._sub.";

/// UDP port window used in unicast address mode.
pub const UDP_PORT_MIN: u16 = 53535;
pub const UDP_PORT_MAX: u16 = 53554;

/// Anycast address mode always listens on the DNS port.
pub const ANYCAST_PORT: u16 = 53;

/// How long the server waits for the service update handler to report the
/// outcome of a change before committing it with a timeout error.
pub const EVENTS_HANDLER_TIMEOUT: Duration = Duration::from_millis(500);

/// Unicast IPv6 addresses kept per host; further addresses are dropped.
pub const MAX_HOST_ADDRESSES: usize = 8;

/// Requestor payload size advertised in the EDNS(0) OPT of responses.
pub const UDP_PAYLOAD_SIZE: u16 = 512;

pub use errors::Error;
pub use handler::{ServiceUpdateHandler, UpdateId};
pub use lease::LeaseConfig;
pub use runtime::Handle;
pub use server::{AddressMode, Server, SharedTransport, State};
