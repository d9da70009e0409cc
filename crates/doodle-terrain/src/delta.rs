//! Ordered log of authoritative tile changes.
//!
//! Replaying the log in order on top of the seed-generated base map
//! reproduces the current terrain, which is how late joiners are brought up
//! to date.

use crate::binary::{BinaryError, BinaryReader, BinaryWriter};
use crate::catalog::TileId;

/// One recorded edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeltaChange {
    pub x: i16,
    pub y: i16,
    pub id: TileId,
}

impl DeltaChange {
    pub const fn new(x: i16, y: i16, id: TileId) -> Self {
        Self { x, y, id }
    }

    /// `i16 x, i16 y, u8 id`.
    pub fn write(&self, w: &mut BinaryWriter) {
        w.write_i16(self.x);
        w.write_i16(self.y);
        w.write_u8(self.id.0);
    }

    pub fn read(r: &mut BinaryReader<'_>) -> Result<Self, BinaryError> {
        Ok(Self {
            x: r.read_i16()?,
            y: r.read_i16()?,
            id: TileId(r.read_u8()?),
        })
    }
}

/// Append-only change log. Entries are never modified once pushed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeltaLog {
    changes: Vec<DeltaChange>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: DeltaChange) {
        self.changes.push(change);
    }

    pub fn changes(&self) -> &[DeltaChange] {
        &self.changes
    }

    /// Entries appended after the first `cursor` entries.
    pub fn since(&self, cursor: usize) -> &[DeltaChange] {
        self.changes.get(cursor..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Writes an `i32` count followed by each change.
    pub fn write_changes(w: &mut BinaryWriter, changes: &[DeltaChange]) {
        w.write_i32(changes.len() as i32);
        for change in changes {
            change.write(w);
        }
    }

    pub fn read_changes(r: &mut BinaryReader<'_>) -> Result<Vec<DeltaChange>, BinaryError> {
        let count = r.read_count()?;
        // 5 bytes per entry.
        if count.saturating_mul(5) > r.remaining() {
            return Err(BinaryError::EndOfStream {
                needed: count.saturating_mul(5),
                remaining: r.remaining(),
            });
        }
        (0..count).map(|_| DeltaChange::read(r)).collect()
    }
}
