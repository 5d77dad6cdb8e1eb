//! Contract between the server and the external mDNS advertiser.

use std::time::Duration;

use crate::registry::Host;

/// Correlates an advertiser callback with its eventual outcome. Ids are
/// monotonically increasing from a random seed; wrap-around is harmless
/// because only outstanding ids are ever compared.
pub type UpdateId = u32;

/// Receives every effective host/service change.
///
/// Implementations must not block. For client updates the outcome is
/// reported back within `timeout` through the runtime handle's
/// `service_update_result`, correlated by `id`; afterwards the update
/// commits with a timeout error instead. Server-initiated removals (lease
/// expiry, stop) also arrive here with a fresh id, but the server never
/// waits for their outcome.
pub trait ServiceUpdateHandler: Send {
    fn handle_update(&mut self, id: UpdateId, host: &Host, timeout: Duration);
}
