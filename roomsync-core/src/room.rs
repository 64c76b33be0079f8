//! The five practice rooms and their provider calendars.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RoomSyncError, RoomSyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomId {
    A,
    B,
    C,
    D,
    E,
}

impl RoomId {
    pub const ALL: [RoomId; 5] = [RoomId::A, RoomId::B, RoomId::C, RoomId::D, RoomId::E];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomId::A => "a",
            RoomId::B => "b",
            RoomId::C => "c",
            RoomId::D => "d",
            RoomId::E => "e",
        }
    }

    /// Human-facing hall name, e.g. "A홀".
    pub fn display_name(&self) -> String {
        format!("{}홀", self.as_str().to_uppercase())
    }

    /// Parse a comma-separated list like "a,b, c". Empty entries are ignored.
    pub fn parse_list(list: &str) -> RoomSyncResult<Vec<RoomId>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(RoomId::from_str)
            .collect()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoomId {
    type Err = RoomSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(RoomId::A),
            "b" => Ok(RoomId::B),
            "c" => Ok(RoomId::C),
            "d" => Ok(RoomId::D),
            "e" => Ok(RoomId::E),
            _ => Err(RoomSyncError::UnknownRoom(s.to_string())),
        }
    }
}

/// A room bound to the provider calendar that holds its bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub calendar_id: String,
}

/// Static room → calendar mapping, loaded from settings.
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: BTreeMap<RoomId, Room>,
}

impl RoomDirectory {
    pub fn new(calendars: impl IntoIterator<Item = (RoomId, String)>) -> Self {
        let rooms = calendars
            .into_iter()
            .map(|(id, calendar_id)| (id, Room { id, calendar_id }))
            .collect();
        RoomDirectory { rooms }
    }

    pub fn get(&self, id: RoomId) -> RoomSyncResult<&Room> {
        self.rooms
            .get(&id)
            .ok_or_else(|| RoomSyncError::UnknownRoom(id.to_string()))
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    /// The requested rooms, or every configured room when `requested` is None.
    pub fn select(&self, requested: Option<&[RoomId]>) -> RoomSyncResult<Vec<RoomId>> {
        match requested {
            None => Ok(self.ids()),
            Some(ids) => ids.iter().map(|id| self.get(*id).map(|r| r.id)).collect(),
        }
    }

    pub fn by_calendar_id(&self, calendar_id: &str) -> Option<&Room> {
        self.rooms.values().find(|r| r.calendar_id == calendar_id)
    }
}
