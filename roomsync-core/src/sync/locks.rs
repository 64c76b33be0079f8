use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::room::RoomId;

/// One mutex per room so that at most one pass touches a room's bookings
/// and cursor at a time.
#[derive(Debug)]
pub struct RoomLocks {
    locks: HashMap<RoomId, Arc<Mutex<()>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        RoomLocks {
            locks: RoomId::ALL
                .iter()
                .map(|room| (*room, Arc::new(Mutex::new(()))))
                .collect(),
        }
    }

    pub async fn lock(&self, room: RoomId) -> OwnedMutexGuard<()> {
        // Every RoomId has an entry.
        self.locks[&room].clone().lock_owned().await
    }

    pub fn is_locked(&self, room: RoomId) -> bool {
        self.locks[&room].try_lock().is_err()
    }
}

impl Default for RoomLocks {
    fn default() -> Self {
        RoomLocks::new()
    }
}
