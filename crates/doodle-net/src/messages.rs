//! Terrain packets and their byte encoding.
//!
//! Every packet is one tag byte followed by a little-endian payload. Use
//! [`Packet::encode`] and [`Packet::decode`]; any decode failure means the
//! peer is misbehaving and should be disconnected.

use doodle_terrain::{
    BinaryError, BinaryReader, BinaryWriter, DeltaChange, DeltaLog, TerrainMap, ZoneRecord,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Packet type tag (first byte on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    RequestBlockChange = 1,
    BlockUpdate = 2,
    RequestZoneAdd = 3,
    ZoneAdded = 4,
    RequestZoneRemove = 5,
    ZoneRemoved = 6,
    MapChanged = 7,
}

impl PacketType {
    /// Packets only a client may send.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            PacketType::RequestBlockChange
                | PacketType::RequestZoneAdd
                | PacketType::RequestZoneRemove
        )
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => PacketType::RequestBlockChange,
            2 => PacketType::BlockUpdate,
            3 => PacketType::RequestZoneAdd,
            4 => PacketType::ZoneAdded,
            5 => PacketType::RequestZoneRemove,
            6 => PacketType::ZoneRemoved,
            7 => PacketType::MapChanged,
            other => return Err(ProtocolError::UnknownPacket(other)),
        })
    }
}

/// Full terrain state for a joining or re-synchronizing client: the base map
/// parameters plus every change made since generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapSnapshot {
    pub width: i16,
    pub height: i16,
    pub seed: i32,
    pub changes: Vec<DeltaChange>,
    pub zones: Vec<ZoneRecord>,
}

impl MapSnapshot {
    pub fn capture(map: &TerrainMap) -> Self {
        // Grid dimensions are capped at i16::MAX.
        Self {
            width: map.width() as i16,
            height: map.height() as i16,
            seed: map.seed(),
            changes: map.deltas().changes().to_vec(),
            zones: map.zones().records().cloned().collect(),
        }
    }

    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_i16(self.width);
        w.write_i16(self.height);
        w.write_i32(self.seed);
        DeltaLog::write_changes(w, &self.changes);
        w.write_i32(self.zones.len() as i32);
        for zone in &self.zones {
            zone.write(w);
        }
    }

    pub fn read(r: &mut BinaryReader<'_>) -> Result<Self, ProtocolError> {
        let width = r.read_i16()?;
        let height = r.read_i16()?;
        if width <= 0 || height <= 0 {
            return Err(ProtocolError::InvalidDimensions { width, height });
        }
        let seed = r.read_i32()?;
        let changes = DeltaLog::read_changes(r)?;
        let count = r.read_count()?;
        let mut zones = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            zones.push(ZoneRecord::read(r)?);
        }
        Ok(Self {
            width,
            height,
            seed,
            changes,
            zones,
        })
    }
}

/// A decoded terrain packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// Client asks to place a tile.
    RequestBlockChange(DeltaChange),
    /// Server announces an applied tile change.
    BlockUpdate(DeltaChange),
    /// Client asks to add a zone.
    RequestZoneAdd(ZoneRecord),
    /// Server announces an added zone.
    ZoneAdded(ZoneRecord),
    /// Client asks to remove the zone under a world-space point.
    RequestZoneRemove { x: i16, y: i16, player: u8 },
    /// Server announces removal of the zone under a world-space point.
    ZoneRemoved { x: i16, y: i16 },
    /// Server sends the whole map.
    MapChanged(MapSnapshot),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding or validating a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown packet type: {0}")]
    UnknownPacket(u8),
    #[error("empty packet")]
    Empty,
    #[error("malformed packet: {0}")]
    Malformed(#[from] BinaryError),
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
    #[error("unknown tile id {0}")]
    UnknownTile(u8),
    #[error("invalid map dimensions {width}x{height}")]
    InvalidDimensions { width: i16, height: i16 },
    #[error("unexpected {0:?} packet")]
    UnexpectedPacket(PacketType),
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::RequestBlockChange(_) => PacketType::RequestBlockChange,
            Packet::BlockUpdate(_) => PacketType::BlockUpdate,
            Packet::RequestZoneAdd(_) => PacketType::RequestZoneAdd,
            Packet::ZoneAdded(_) => PacketType::ZoneAdded,
            Packet::RequestZoneRemove { .. } => PacketType::RequestZoneRemove,
            Packet::ZoneRemoved { .. } => PacketType::ZoneRemoved,
            Packet::MapChanged(_) => PacketType::MapChanged,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = BinaryWriter::new();
        w.write_u8(self.packet_type() as u8);
        match self {
            Packet::RequestBlockChange(change) | Packet::BlockUpdate(change) => {
                change.write(&mut w)
            }
            Packet::RequestZoneAdd(zone) | Packet::ZoneAdded(zone) => zone.write(&mut w),
            Packet::RequestZoneRemove { x, y, player } => {
                w.write_i16(*x);
                w.write_i16(*y);
                w.write_u8(*player);
            }
            Packet::ZoneRemoved { x, y } => {
                w.write_i16(*x);
                w.write_i16(*y);
            }
            Packet::MapChanged(snapshot) => snapshot.write(&mut w),
        }
        w.into_inner()
    }

    /// Decodes exactly one packet; leftover bytes are an error.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(data);
        if r.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let packet = match PacketType::try_from(r.read_u8()?)? {
            PacketType::RequestBlockChange => {
                Packet::RequestBlockChange(DeltaChange::read(&mut r)?)
            }
            PacketType::BlockUpdate => Packet::BlockUpdate(DeltaChange::read(&mut r)?),
            PacketType::RequestZoneAdd => Packet::RequestZoneAdd(ZoneRecord::read(&mut r)?),
            PacketType::ZoneAdded => Packet::ZoneAdded(ZoneRecord::read(&mut r)?),
            PacketType::RequestZoneRemove => Packet::RequestZoneRemove {
                x: r.read_i16()?,
                y: r.read_i16()?,
                player: r.read_u8()?,
            },
            PacketType::ZoneRemoved => Packet::ZoneRemoved {
                x: r.read_i16()?,
                y: r.read_i16()?,
            },
            PacketType::MapChanged => Packet::MapChanged(MapSnapshot::read(&mut r)?),
        };
        if !r.is_empty() {
            return Err(ProtocolError::TrailingBytes(r.remaining()));
        }
        Ok(packet)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
