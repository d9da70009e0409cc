//! The server's terrain authority: one thread that owns the [`TerrainMap`].
//!
//! Local edits, client packets and the periodic tile tick all arrive on the
//! same thread through a `crossbeam_channel::select!` over the command queue
//! and a ticker, so no two writes to the grid ever overlap. Applied changes
//! are re-encoded as packets and pushed on the outbound channel for the
//! transport to broadcast.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use doodle_terrain::{DeltaChange, TerrainMap, TileId, ZoneError, ZoneRecord, encode_map};

use crate::messages::{MapSnapshot, Packet};

/// Transport-assigned connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub u32);

/// Tick scheduling for tile behaviors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickSettings {
    /// Ticks per second; 0 disables the timer (ticks then only run on
    /// [`AuthorityCommand::Tick`]).
    pub rate_hz: u32,
    /// Rows scanned per tick; 0 scans the whole map every tick.
    pub rows_per_tick: u32,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            rate_hz: 5,
            rows_per_tick: 0,
        }
    }
}

/// Work for the authority thread.
pub enum AuthorityCommand {
    /// Server-local tile edit.
    Edit { x: i32, y: i32, id: TileId },
    /// Server-local zone definition; the bounds are snapped to whole tiles.
    DefineZone(ZoneRecord),
    /// Server-local zone removal at a world-space point. The point is floored
    /// to the integer coordinates that go out in `ZoneRemoved`.
    RemoveZoneAt { x: f32, y: f32 },
    /// Raw packet received from a client.
    ClientPacket { client: ClientId, data: Vec<u8> },
    /// Runs one tick slice immediately.
    Tick,
    /// Replies with an encoded `MapChanged` packet for a joining client.
    Snapshot(Sender<Vec<u8>>),
    /// Replies with the map encoded in the current save format.
    Save(Sender<Vec<u8>>),
    Shutdown,
}

/// Messages for the transport layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded packet to send to every connected client.
    Broadcast(Vec<u8>),
    /// The client sent something invalid and must be dropped.
    Disconnect { client: ClientId, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("terrain authority has stopped")]
    Stopped,
    #[error("failed to spawn terrain authority thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("terrain authority thread panicked")]
    Panicked,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owner-side handle to the authority thread.
///
/// Dropping the handle stops the thread; [`shutdown`](Self::shutdown) does
/// the same and hands back the final map.
pub struct TerrainAuthority {
    commands: Option<Sender<AuthorityCommand>>,
    outbound: Receiver<Outbound>,
    handle: Option<JoinHandle<TerrainMap>>,
}

impl TerrainAuthority {
    /// Moves `map` onto a new authority thread.
    pub fn spawn(map: TerrainMap, tick: TickSettings) -> Result<Self, AuthorityError> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();

        let handle = std::thread::Builder::new()
            .name("terrain-authority".into())
            .spawn(move || {
                let mut worker = Worker {
                    map,
                    outbound: outbound_tx,
                    tick,
                    cursor: 0,
                };
                worker.run(&command_rx);
                worker.map
            })
            .map_err(AuthorityError::Spawn)?;

        tracing::info!(rate_hz = tick.rate_hz, "terrain authority started");
        Ok(Self {
            commands: Some(command_tx),
            outbound: outbound_rx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, command: AuthorityCommand) -> Result<(), AuthorityError> {
        self.commands
            .as_ref()
            .ok_or(AuthorityError::Stopped)?
            .send(command)
            .map_err(|_| AuthorityError::Stopped)
    }

    pub fn edit(&self, x: i32, y: i32, id: TileId) -> Result<(), AuthorityError> {
        self.send(AuthorityCommand::Edit { x, y, id })
    }

    pub fn client_packet(&self, client: ClientId, data: Vec<u8>) -> Result<(), AuthorityError> {
        self.send(AuthorityCommand::ClientPacket { client, data })
    }

    /// Encoded `MapChanged` packet reflecting every command queued before it.
    pub fn snapshot(&self) -> Result<Vec<u8>, AuthorityError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(AuthorityCommand::Snapshot(reply_tx))?;
        reply_rx.recv().map_err(|_| AuthorityError::Stopped)
    }

    /// Current map in the save format.
    pub fn save_bytes(&self) -> Result<Vec<u8>, AuthorityError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(AuthorityCommand::Save(reply_tx))?;
        reply_rx.recv().map_err(|_| AuthorityError::Stopped)
    }

    /// Everything produced since the last drain.
    pub fn drain_outbound(&self) -> Vec<Outbound> {
        self.outbound.try_iter().collect()
    }

    pub fn outbound(&self) -> &Receiver<Outbound> {
        &self.outbound
    }

    /// Stops the thread after it finishes queued commands and returns the map.
    /// The map is never touched by the authority again.
    pub fn shutdown(mut self) -> Result<TerrainMap, AuthorityError> {
        self.stop().ok_or(AuthorityError::Stopped)?
    }

    fn stop(&mut self) -> Option<Result<TerrainMap, AuthorityError>> {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(AuthorityCommand::Shutdown);
        }
        let handle = self.handle.take()?;
        let result = handle.join().map_err(|_| AuthorityError::Panicked);
        tracing::info!("terrain authority stopped");
        Some(result)
    }
}

impl Drop for TerrainAuthority {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    map: TerrainMap,
    outbound: Sender<Outbound>,
    tick: TickSettings,
    /// Next row the tick scan starts from.
    cursor: u32,
}

impl Worker {
    fn run(&mut self, commands: &Receiver<AuthorityCommand>) {
        let ticker = if self.tick.rate_hz > 0 {
            crossbeam_channel::tick(Duration::from_secs(1) / self.tick.rate_hz)
        } else {
            crossbeam_channel::never()
        };

        loop {
            crossbeam_channel::select! {
                recv(commands) -> command => match command {
                    Ok(AuthorityCommand::Shutdown) | Err(_) => break,
                    Ok(command) => self.handle(command),
                },
                recv(ticker) -> _ => self.tick_slice(),
            }
        }
    }

    fn handle(&mut self, command: AuthorityCommand) {
        match command {
            AuthorityCommand::Edit { x, y, id } => self.apply_edit(x, y, id),
            AuthorityCommand::DefineZone(record) => {
                if let Err(err) = self.add_zone(record) {
                    tracing::warn!(%err, "ignoring zone definition");
                }
            }
            AuthorityCommand::RemoveZoneAt { x, y } => {
                self.remove_zone(wire_coord(x), wire_coord(y));
            }
            AuthorityCommand::ClientPacket { client, data } => self.client_packet(client, &data),
            AuthorityCommand::Tick => self.tick_slice(),
            AuthorityCommand::Snapshot(reply) => {
                let packet = Packet::MapChanged(MapSnapshot::capture(&self.map));
                let _ = reply.send(packet.encode());
            }
            AuthorityCommand::Save(reply) => {
                let _ = reply.send(encode_map(&self.map));
            }
            AuthorityCommand::Shutdown => {}
        }
    }

    fn client_packet(&mut self, client: ClientId, data: &[u8]) {
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(err) => return self.disconnect(client, err.to_string()),
        };

        match packet {
            Packet::RequestBlockChange(change) => {
                if !self.map.catalog().contains(change.id) {
                    return self.disconnect(client, format!("unknown tile id {}", change.id.0));
                }
                self.apply_edit(i32::from(change.x), i32::from(change.y), change.id);
            }
            Packet::RequestZoneAdd(record) => {
                if let Err(err) = self.add_zone(record) {
                    self.disconnect(client, err.to_string());
                }
            }
            Packet::RequestZoneRemove { x, y, player } => {
                tracing::debug!(client = client.0, player, x, y, "zone removal requested");
                self.remove_zone(x, y);
            }
            other => {
                let kind = other.packet_type();
                self.disconnect(client, format!("unexpected {kind:?} packet from client"));
            }
        }
    }

    fn disconnect(&mut self, client: ClientId, reason: String) {
        tracing::warn!(client = client.0, %reason, "dropping misbehaving client");
        self.emit(Outbound::Disconnect { client, reason });
    }

    fn apply_edit(&mut self, x: i32, y: i32, id: TileId) {
        let before = self.map.deltas().len();
        self.map.set_tile(x, y, id);
        let applied: Vec<DeltaChange> = self.map.deltas().since(before).to_vec();
        self.broadcast_changes(&applied);
    }

    /// Replicas insert `ZoneAdded` records as-is, so the snapped record is
    /// what goes out.
    fn add_zone(&mut self, record: ZoneRecord) -> Result<(), ZoneError> {
        let zoning = self.map.zones_mut().define_record(record)?;
        self.emit(Outbound::Broadcast(Packet::ZoneAdded(zoning.record).encode()));
        Ok(())
    }

    /// Replicas run the same `delete_at` on the broadcast point.
    fn remove_zone(&mut self, x: i16, y: i16) {
        if self
            .map
            .zones_mut()
            .delete_at(f32::from(x), f32::from(y))
            .is_some()
        {
            self.emit(Outbound::Broadcast(Packet::ZoneRemoved { x, y }.encode()));
        }
    }

    fn tick_slice(&mut self) {
        if !self.map.catalog().has_behaviors() {
            return;
        }
        let height = self.map.height();
        let rows = match self.tick.rows_per_tick {
            0 => height,
            n => n.min(height),
        };
        let start = if self.cursor >= height { 0 } else { self.cursor };
        let end = (start + rows).min(height);
        self.cursor = if end >= height { 0 } else { end };

        let changes = self.map.tick_rows(start..end);
        if !changes.is_empty() {
            tracing::debug!(start, end, changes = changes.len(), "tick slice");
        }
        self.broadcast_changes(&changes);
    }

    fn broadcast_changes(&self, changes: &[DeltaChange]) {
        for &change in changes {
            self.emit(Outbound::Broadcast(Packet::BlockUpdate(change).encode()));
        }
    }

    fn emit(&self, message: Outbound) {
        // The receiver only disappears while the handle is being dropped.
        let _ = self.outbound.send(message);
    }
}

/// Floors a world coordinate onto the `i16` wire grid (saturating, NaN is 0).
fn wire_coord(value: f32) -> i16 {
    value.floor() as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use doodle_terrain::{
        MapSettings, Rgba, TileCatalog, WorldRect, ZoneInfo, decode_map, stock,
    };

    use super::*;
    use crate::replica::TerrainReplica;

    fn settings() -> MapSettings {
        MapSettings {
            width: 20,
            height: 16,
            surface_row: 8,
            height_modifier: 2.0,
            seed: 3,
            ..MapSettings::default()
        }
    }

    fn catalog() -> Arc<TileCatalog> {
        Arc::new(TileCatalog::standard().unwrap())
    }

    fn manual() -> TickSettings {
        TickSettings {
            rate_hz: 0,
            rows_per_tick: 0,
        }
    }

    fn spawn(tick: TickSettings) -> TerrainAuthority {
        let map = TerrainMap::generate(catalog(), settings()).unwrap();
        TerrainAuthority::spawn(map, tick).unwrap()
    }

    fn zone() -> ZoneRecord {
        named_zone("camp", WorldRect::new(0, 0, 32, 32))
    }

    fn named_zone(name: &str, bounds: WorldRect) -> ZoneRecord {
        ZoneRecord {
            bounds,
            owner: 0,
            info: ZoneInfo {
                color: Rgba::WHITE,
                name: name.into(),
            },
        }
    }

    fn zone_names(map: &TerrainMap) -> Vec<String> {
        map.zones()
            .zones()
            .iter()
            .map(|z| z.info().name.clone())
            .collect()
    }

    #[test]
    fn test_edit_is_applied_and_broadcast() {
        let authority = spawn(manual());
        authority.edit(2, 2, stock::STONE).unwrap();
        // Snapshot is processed after the edit, so the outbound queue is filled.
        authority.snapshot().unwrap();
        assert_eq!(
            authority.drain_outbound(),
            vec![Outbound::Broadcast(
                Packet::BlockUpdate(DeltaChange::new(2, 2, stock::STONE)).encode()
            )]
        );
        let map = authority.shutdown().unwrap();
        assert_eq!(map.tile(2, 2), stock::STONE);
    }

    #[test]
    fn test_out_of_bounds_edit_broadcasts_nothing() {
        let authority = spawn(manual());
        authority.edit(-5, 2, stock::STONE).unwrap();
        authority.snapshot().unwrap();
        assert!(authority.drain_outbound().is_empty());
    }

    #[test]
    fn test_client_requests_flow_through_single_writer() {
        let authority = spawn(manual());
        let client = ClientId(1);
        authority
            .client_packet(
                client,
                Packet::RequestBlockChange(DeltaChange::new(4, 1, stock::WOOD)).encode(),
            )
            .unwrap();
        authority
            .client_packet(client, Packet::RequestZoneAdd(zone()).encode())
            .unwrap();
        authority
            .client_packet(
                client,
                Packet::RequestZoneRemove {
                    x: 5,
                    y: 5,
                    player: 0,
                }
                .encode(),
            )
            .unwrap();
        authority.snapshot().unwrap();

        let outbound = authority.drain_outbound();
        assert_eq!(outbound.len(), 3);
        assert_eq!(
            outbound[2],
            Outbound::Broadcast(Packet::ZoneRemoved { x: 5, y: 5 }.encode())
        );
        let map = authority.shutdown().unwrap();
        assert_eq!(map.tile(4, 1), stock::WOOD);
        assert!(map.zones().is_empty());
    }

    #[test]
    fn test_misbehaving_client_is_disconnected() {
        let authority = spawn(manual());
        let client = ClientId(9);
        authority.client_packet(client, vec![0xAB, 0, 1]).unwrap();
        authority
            .client_packet(
                client,
                Packet::RequestBlockChange(DeltaChange::new(1, 1, TileId(250))).encode(),
            )
            .unwrap();
        authority
            .client_packet(client, Packet::ZoneRemoved { x: 0, y: 0 }.encode())
            .unwrap();
        authority.snapshot().unwrap();

        let outbound = authority.drain_outbound();
        assert_eq!(outbound.len(), 3);
        assert!(
            outbound
                .iter()
                .all(|o| matches!(o, Outbound::Disconnect { client: ClientId(9), .. }))
        );
        let map = authority.shutdown().unwrap();
        assert!(map.deltas().is_empty());
    }

    #[test]
    fn test_client_zone_is_snapped_before_broadcast() {
        let authority = spawn(manual());
        let request = named_zone("field", WorldRect::new(3, 5, 30, 7));
        authority
            .client_packet(ClientId(2), Packet::RequestZoneAdd(request).encode())
            .unwrap();
        authority.snapshot().unwrap();

        let snapped = named_zone("field", WorldRect::new(0, 0, 48, 16));
        assert_eq!(
            authority.drain_outbound(),
            vec![Outbound::Broadcast(Packet::ZoneAdded(snapped).encode())]
        );
        let map = authority.shutdown().unwrap();
        assert_eq!(map.zones().zones()[0].bounds(), WorldRect::new(0, 0, 48, 16));
    }

    #[test]
    fn test_overflowing_zone_disconnects_client() {
        let authority = spawn(manual());
        let client = ClientId(4);
        for bounds in [
            WorldRect::new(i32::MAX, 0, 16, 16),
            WorldRect::new(0, i32::MAX - 20, 16, 16),
            WorldRect::new(0, 0, 0, 16),
        ] {
            authority
                .client_packet(client, Packet::RequestZoneAdd(named_zone("bad", bounds)).encode())
                .unwrap();
        }
        // A bad local definition is dropped without stopping the thread.
        authority
            .send(AuthorityCommand::DefineZone(named_zone(
                "bad",
                WorldRect::new(i32::MAX, i32::MAX, 1, 1),
            )))
            .unwrap();
        assert!(authority.snapshot().is_ok());

        let outbound = authority.drain_outbound();
        assert_eq!(outbound.len(), 3);
        assert!(
            outbound
                .iter()
                .all(|o| matches!(o, Outbound::Disconnect { client: ClientId(4), .. }))
        );
        let map = authority.shutdown().unwrap();
        assert!(map.zones().is_empty());
    }

    #[test]
    fn test_zone_removal_matches_on_server_and_replica() {
        let authority = spawn(manual());
        let left = named_zone("A", WorldRect::new(-16, 0, 16, 16));
        let right = named_zone("B", WorldRect::new(0, 0, 16, 16));
        authority.send(AuthorityCommand::DefineZone(left)).unwrap();
        authority.send(AuthorityCommand::DefineZone(right)).unwrap();
        let snapshot = authority.snapshot().unwrap();
        authority.drain_outbound();

        let mut replica = TerrainReplica::new(catalog(), settings());
        replica.handle(&snapshot).unwrap();

        authority
            .send(AuthorityCommand::RemoveZoneAt { x: -0.5, y: 0.5 })
            .unwrap();
        authority.snapshot().unwrap();
        let outbound = authority.drain_outbound();
        assert_eq!(
            outbound,
            vec![Outbound::Broadcast(Packet::ZoneRemoved { x: -1, y: 0 }.encode())]
        );
        for message in outbound {
            if let Outbound::Broadcast(bytes) = message {
                replica.handle(&bytes).unwrap();
            }
        }

        let server = authority.shutdown().unwrap();
        assert_eq!(zone_names(&server), vec!["B".to_string()]);
        assert_eq!(zone_names(replica.map().unwrap()), zone_names(&server));
    }

    #[test]
    fn test_snapshot_replicates_to_client() {
        let authority = spawn(manual());
        authority.edit(1, 1, stock::STONE).unwrap();
        authority.send(AuthorityCommand::DefineZone(zone())).unwrap();
        let snapshot = authority.snapshot().unwrap();

        let mut replica = TerrainReplica::new(catalog(), settings());
        replica.handle(&snapshot).unwrap();
        for message in authority.drain_outbound() {
            if let Outbound::Broadcast(bytes) = message {
                replica.handle(&bytes).unwrap();
            }
        }

        let server = authority.shutdown().unwrap();
        let client = replica.map().unwrap();
        assert_eq!(client.grid().tiles(), server.grid().tiles());
        // The zone arrives twice: once in the snapshot, once as a broadcast.
        assert_eq!(client.zones().len(), 2);
    }

    #[test]
    fn test_manual_tick_moves_sand() {
        let authority = spawn(manual());
        authority.edit(3, 0, stock::SAND).unwrap();
        authority.send(AuthorityCommand::Tick).unwrap();
        authority.snapshot().unwrap();
        let map = authority.shutdown().unwrap();
        assert_eq!(map.tile(3, 0), TileId::AIR);
        assert_eq!(map.tile(3, 1), stock::SAND);
    }

    #[test]
    fn test_tick_slices_advance_cursor() {
        let authority = spawn(TickSettings {
            rate_hz: 0,
            rows_per_tick: 1,
        });
        authority.edit(3, 0, stock::SAND).unwrap();
        // Row 0 is scanned by the first slice only.
        authority.send(AuthorityCommand::Tick).unwrap();
        authority.send(AuthorityCommand::Tick).unwrap();
        let map = authority.shutdown().unwrap();
        assert_eq!(map.tile(3, 1), TileId::AIR);
        assert_eq!(map.tile(3, 2), stock::SAND);
    }

    #[test]
    fn test_timer_ticks_until_shutdown() {
        let authority = spawn(TickSettings {
            rate_hz: 200,
            rows_per_tick: 0,
        });
        authority.edit(6, 0, stock::SAND).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut moved = false;
        while Instant::now() < deadline {
            let bytes = authority.save_bytes().unwrap();
            let map = decode_map(&bytes, catalog(), &settings()).unwrap().unwrap();
            if map.tile(6, 0).is_air() {
                moved = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(moved, "sand never fell");
        authority.shutdown().unwrap();
    }

    #[test]
    fn test_commands_after_shutdown_fail() {
        let mut authority = spawn(manual());
        let _ = authority.stop();
        assert!(matches!(
            authority.edit(0, 0, stock::STONE),
            Err(AuthorityError::Stopped)
        ));
        assert!(matches!(authority.snapshot(), Err(AuthorityError::Stopped)));
    }

    #[test]
    fn test_save_bytes_round_trip() {
        let authority = spawn(manual());
        authority.edit(7, 3, stock::LADDER).unwrap();
        let bytes = authority.save_bytes().unwrap();
        let loaded = decode_map(&bytes, catalog(), &settings()).unwrap().unwrap();
        assert_eq!(loaded.tile(7, 3), stock::LADDER);
    }
}
