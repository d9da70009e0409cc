//! Client-side terrain rebuilt from server packets.
//!
//! A `MapChanged` packet regenerates the base terrain locally from the seed
//! and replays the server's changes through [`TerrainMap::set_tile`], so
//! adjacency and walkability are always derived on the client and never sent.

use std::sync::Arc;

use doodle_terrain::{DeltaChange, MapSettings, TerrainMap, TileCatalog, ZoneRecord};

use crate::messages::{MapSnapshot, Packet, ProtocolError};

/// What a successfully handled packet did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplicaEvent {
    MapReplaced { width: u32, height: u32 },
    TileChanged(DeltaChange),
    ZoneAdded(ZoneRecord),
    /// `removed` is `false` when no zone contained the point.
    ZoneRemoved { removed: bool },
}

/// Terrain as seen by one client.
pub struct TerrainReplica {
    catalog: Arc<TileCatalog>,
    /// Generator parameters shared with the server; size and seed come from
    /// the snapshot.
    settings: MapSettings,
    map: Option<TerrainMap>,
}

impl TerrainReplica {
    pub fn new(catalog: Arc<TileCatalog>, settings: MapSettings) -> Self {
        Self {
            catalog,
            settings,
            map: None,
        }
    }

    /// The replicated map, once a snapshot has arrived.
    pub fn map(&self) -> Option<&TerrainMap> {
        self.map.as_ref()
    }

    /// Decodes and applies one server packet.
    ///
    /// An error means the server sent something this client cannot accept;
    /// the caller should drop the connection.
    pub fn handle(&mut self, data: &[u8]) -> Result<ReplicaEvent, ProtocolError> {
        let packet = Packet::decode(data)?;
        self.apply(packet)
    }

    pub fn apply(&mut self, packet: Packet) -> Result<ReplicaEvent, ProtocolError> {
        let packet_type = packet.packet_type();
        if packet_type.is_request() {
            return Err(ProtocolError::UnexpectedPacket(packet_type));
        }

        match packet {
            Packet::MapChanged(snapshot) => self.replace_map(snapshot),
            Packet::BlockUpdate(change) => {
                self.check_tile(change)?;
                let map = self
                    .map
                    .as_mut()
                    .ok_or(ProtocolError::UnexpectedPacket(packet_type))?;
                map.set_tile(i32::from(change.x), i32::from(change.y), change.id);
                Ok(ReplicaEvent::TileChanged(change))
            }
            Packet::ZoneAdded(record) => {
                let map = self
                    .map
                    .as_mut()
                    .ok_or(ProtocolError::UnexpectedPacket(packet_type))?;
                map.zones_mut().insert(record.clone());
                Ok(ReplicaEvent::ZoneAdded(record))
            }
            Packet::ZoneRemoved { x, y } => {
                let map = self
                    .map
                    .as_mut()
                    .ok_or(ProtocolError::UnexpectedPacket(packet_type))?;
                let removed = map
                    .zones_mut()
                    .delete_at(f32::from(x), f32::from(y))
                    .is_some();
                Ok(ReplicaEvent::ZoneRemoved { removed })
            }
            Packet::RequestBlockChange(_)
            | Packet::RequestZoneAdd(_)
            | Packet::RequestZoneRemove { .. } => Err(ProtocolError::UnexpectedPacket(packet_type)),
        }
    }

    fn check_tile(&self, change: DeltaChange) -> Result<(), ProtocolError> {
        if self.catalog.contains(change.id) {
            Ok(())
        } else {
            Err(ProtocolError::UnknownTile(change.id.0))
        }
    }

    fn replace_map(&mut self, snapshot: MapSnapshot) -> Result<ReplicaEvent, ProtocolError> {
        for &change in &snapshot.changes {
            self.check_tile(change)?;
        }
        let settings = self.settings.resized(
            snapshot.width as u32,
            snapshot.height as u32,
            snapshot.seed,
        );
        let mut map = TerrainMap::generate(Arc::clone(&self.catalog), settings).map_err(|_| {
            ProtocolError::InvalidDimensions {
                width: snapshot.width,
                height: snapshot.height,
            }
        })?;
        map.apply_changes(&snapshot.changes);
        for record in snapshot.zones {
            map.zones_mut().insert(record);
        }

        tracing::info!(
            width = map.width(),
            height = map.height(),
            changes = snapshot.changes.len(),
            "received terrain snapshot"
        );
        let event = ReplicaEvent::MapReplaced {
            width: map.width(),
            height: map.height(),
        };
        self.map = Some(map);
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
