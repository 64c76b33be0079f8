//! Google Calendar provider for roomsync: event listing with sync tokens,
//! and push-notification channels.

mod client;
mod session;
mod wire;

pub use client::GoogleCalendar;
pub use session::{OAuthCredentials, Session};
