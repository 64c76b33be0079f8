//! A calendar event materialized as a priced booking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RoomSyncError, RoomSyncResult};
use crate::price_text::{StatedPriceKind, extract_description_price, parse_stated_price};
use crate::pricing::{PriceClass, PriceQuote, is_partner_booking};
use crate::provider::ProviderEvent;
use crate::room::RoomId;

/// One stored booking. `event_id` is the natural key: there is at most one
/// booking per provider event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub room_id: RoomId,
    #[serde(rename = "google_event_id")]
    pub event_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "start_time")]
    pub start: DateTime<Utc>,
    #[serde(rename = "end_time")]
    pub end: DateTime<Utc>,
    /// None when the span could not be priced.
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default, rename = "price_type")]
    pub price_class: Option<PriceClass>,
    /// Booked through the partner reservation platform.
    #[serde(default, rename = "is_naver")]
    pub partner: bool,
    /// Amount written into the event text, if any.
    #[serde(default)]
    pub stated_price: Option<i64>,
    /// Keyword hint next to the stated price. None when the text has
    /// neither an amount nor a keyword.
    #[serde(default, rename = "stated_price_kind")]
    pub stated_kind: Option<StatedPriceKind>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Build an unpriced booking from a provider event. Events without a
    /// concrete start and end (all-day markers, cancellations) yield None.
    pub fn from_event(room_id: RoomId, event: &ProviderEvent, now: DateTime<Utc>) -> Option<Self> {
        if event.cancelled {
            return None;
        }
        let (start, end) = event.concrete_span()?;
        let stated = parse_stated_price(&event.summary, &event.description);
        let stated_price = stated
            .amount
            .or_else(|| extract_description_price(&event.description));
        let stated_kind = (stated_price.is_some() || stated.kind != StatedPriceKind::General)
            .then_some(stated.kind);

        Some(Booking {
            id: None,
            room_id,
            event_id: event.id.clone(),
            title: event.summary.clone(),
            description: event.description.clone(),
            start,
            end,
            price: None,
            price_class: None,
            partner: is_partner_booking(&event.description),
            stated_price,
            stated_kind,
            updated_at: now,
        })
    }

    /// Record a price calculation outcome. An unknown room prices as 0 with
    /// the `unknown` label; an invalid range leaves the price empty.
    pub fn apply_quote(&mut self, quote: RoomSyncResult<PriceQuote>) {
        match quote {
            Ok(quote) => {
                self.price = Some(quote.price);
                self.price_class = Some(quote.class);
                self.partner = quote.partner;
            }
            Err(RoomSyncError::UnknownRoom(room)) => {
                tracing::warn!(room = %room, event_id = %self.event_id, "no tariff for room, pricing as unknown");
                let unknown = PriceQuote::unknown(self.partner);
                self.price = Some(unknown.price);
                self.price_class = Some(unknown.class);
            }
            Err(err) => {
                tracing::warn!(event_id = %self.event_id, error = %err, "booking left unpriced");
                self.price = None;
                self.price_class = None;
            }
        }
    }

    pub fn revenue(&self) -> i64 {
        self.price.unwrap_or(0)
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_minutes() as f64 / 60.0
    }
}
