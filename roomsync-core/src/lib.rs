//! Core of the roomsync practice-room booking calendar.
//!
//! This crate is shared by the provider, store and server crates:
//! - rooms, tariffs and the booking price calculator
//! - `provider` and `store` contracts plus in-memory implementations
//! - the `sync` state machine, webhook `channels` and statistics

pub mod booking;
pub mod cache;
pub mod channels;
pub mod civil_time;
pub mod config;
pub mod constants;
pub mod debounce;
pub mod error;
pub mod memory;
pub mod policy;
pub mod price_text;
pub mod pricing;
pub mod provider;
pub mod room;
pub mod stats;
pub mod store;
pub mod sync;
pub mod tariff;
pub mod window;

pub use booking::Booking;
pub use error::{RoomSyncError, RoomSyncResult};
pub use room::{Room, RoomDirectory, RoomId};
pub use window::TimeWindow;
