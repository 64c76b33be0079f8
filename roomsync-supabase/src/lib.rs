//! Supabase storage for roomsync, over PostgREST.
//!
//! Tables are described in `sql/schema.sql`.

mod rest;
mod store;

pub use rest::PostgrestClient;
pub use store::SupabaseStore;
