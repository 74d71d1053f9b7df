//! Inbound map messages.
//!
//! The session hands the cache message bodies with their type byte already
//! stripped. Each type here knows how to parse its own body.

use tessera_common::{Coord, MessageReader, PacketId, TilesetId, WireResult};

/// Index that terminates the flag table and the plot record list.
pub const TABLE_END: u8 = 255;

/// Request to drop or refresh cached grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateMessage {
    /// Re-fetch one grid, keeping the current copy visible meanwhile
    Grid(Coord),
    /// Drop every grid outside the inclusive rectangle `[ul, lr]`
    Trim {
        /// Upper-left grid coordinate
        ul: Coord,
        /// Lower-right grid coordinate
        lr: Coord,
    },
    /// Drop every grid
    TrimAll,
}

impl InvalidateMessage {
    /// Parses an invalidate body: a type byte followed by its coordinates.
    ///
    /// Returns `Ok(None)` for an unknown type byte, which is ignored.
    pub fn parse(body: &[u8]) -> WireResult<Option<Self>> {
        let mut r = MessageReader::new(body);
        let msg = match r.u8()? {
            0 => Self::Grid(r.coord()?),
            1 => {
                let ul = r.coord()?;
                let lr = r.coord()?;
                Self::Trim { ul, lr }
            },
            2 => Self::TrimAll,
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

/// One id binding of a tile-set mapping message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetMapping {
    /// Id tiles refer to
    pub id: TilesetId,
    /// Resource name
    pub name: String,
    /// Resource version
    pub version: u16,
}

impl TilesetMapping {
    /// Parses `(u8 id, string name, u16 version)` triples until the body is
    /// exhausted.
    pub fn parse_all(body: &[u8]) -> WireResult<Vec<Self>> {
        let mut r = MessageReader::new(body);
        let mut out = Vec::new();
        while !r.is_empty() {
            let id = TilesetId::new(r.u8()?);
            let name = r.string()?.to_owned();
            let version = r.u16()?;
            out.push(Self { id, name, version });
        }
        Ok(out)
    }
}

/// One datagram worth of a fragmented map payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFragment {
    /// Shared by every fragment of one payload
    pub packet_id: PacketId,
    /// Where `payload` starts in the reassembled payload
    pub offset: u16,
    /// Length of the reassembled payload
    pub total_len: u16,
    /// Fragment bytes
    pub payload: Vec<u8>,
}

impl MapFragment {
    /// Parses `(i32 packet id, u16 offset, u16 total length, bytes...)`.
    pub fn parse(body: &[u8]) -> WireResult<Self> {
        let mut r = MessageReader::new(body);
        let packet_id = PacketId::new(r.i32()?);
        let offset = r.u16()?;
        let total_len = r.u16()?;
        Ok(Self {
            packet_id,
            offset,
            total_len,
            payload: r.rest().to_vec(),
        })
    }
}

/// Per-grid plot flags, indexed by the plot records of one update.
#[derive(Clone, PartialEq, Eq)]
pub struct FlagTable([u8; 256]);

impl FlagTable {
    /// Creates a table with every flag zero.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; 256])
    }

    /// Flag value at `index`.
    #[must_use]
    pub const fn get(&self, index: u8) -> u8 {
        self.0[index as usize]
    }

    /// Sets the flag value at `index`.
    pub fn set(&mut self, index: u8, flag: u8) {
        self.0[usize::from(index)] = flag;
    }
}

impl Default for FlagTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlagTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.0
                    .iter()
                    .enumerate()
                    .filter(|(_, flag)| **flag != 0),
            )
            .finish()
    }
}

/// Reassembled grid update, with its tile and plot data still compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapData<'a> {
    /// Grid the update is for
    pub gc: Coord,
    /// Minimap name, `None` when the server sent an empty string
    pub name: Option<String>,
    /// Flags referenced by plot records
    pub flags: FlagTable,
    /// Zlib stream of tiles followed by plot records
    pub compressed: &'a [u8],
}

impl<'a> MapData<'a> {
    /// Parses `(coord, string name, (u8 index, u8 flag)* 255, zlib...)`.
    pub fn parse(payload: &'a [u8]) -> WireResult<Self> {
        let mut r = MessageReader::new(payload);
        let gc = r.coord()?;
        let name = match r.string()? {
            "" => None,
            name => Some(name.to_owned()),
        };
        let mut flags = FlagTable::new();
        loop {
            let index = r.u8()?;
            if index == TABLE_END {
                break;
            }
            flags.set(index, r.u8()?);
        }
        Ok(Self {
            gc,
            name,
            flags,
            compressed: r.rest(),
        })
    }
}
