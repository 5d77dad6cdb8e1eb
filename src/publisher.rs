//! Contract with the network-data publisher advertising where the server
//! listens.

/// Publishes the DNS/SRP address service entry in the mesh network data.
/// Effects are asynchronous: the publisher confirms through [`Event`]s
/// delivered via the runtime handle, and the server only starts listening
/// once its entry is present.
pub trait Publisher: Send {
    fn publish_unicast(&mut self, port: u16);
    fn publish_anycast(&mut self, sequence_number: u8);
    fn unpublish(&mut self);
}

/// Network-data entry notifications driving the server lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    EntryAdded,
    EntryRemoved,
}
