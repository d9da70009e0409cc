//! Terrain replication for Doodle Empires.
//!
//! - [`messages`]: the packet codec shared by server and clients.
//! - [`replica`]: client-side state rebuilt from server packets.
//! - [`authority`]: the server's single writer thread that owns the map,
//!   applies edits and runs the periodic tile tick.
//!
//! Transport (sockets, reliability, discovery) is left to the caller: this
//! crate consumes and produces byte payloads.

pub mod authority;
pub mod messages;
pub mod replica;

pub use authority::{
    AuthorityCommand, AuthorityError, ClientId, Outbound, TerrainAuthority, TickSettings,
};
pub use messages::{MapSnapshot, Packet, PacketType, ProtocolError};
pub use replica::{ReplicaEvent, TerrainReplica};
