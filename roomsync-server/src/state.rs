use std::sync::Arc;

use anyhow::{Context, Result};
use roomsync_core::channels::{ChannelManager, ChannelOptions};
use roomsync_core::config::Settings;
use roomsync_core::debounce::{Debouncer, Trigger};
use roomsync_core::memory::MemoryStore;
use roomsync_core::policy::{PolicyResolver, Pricer};
use roomsync_core::pricing::PriceCalculator;
use roomsync_core::provider::CalendarProvider;
use roomsync_core::store::{BookingStore, ChannelStore, PricePolicyStore, SyncStateStore};
use roomsync_core::sync::Synchronizer;
use roomsync_core::tariff::TariffTable;
use roomsync_core::{RoomId, RoomSyncError};
use roomsync_provider_google::GoogleCalendar;
use roomsync_supabase::SupabaseStore;

/// The provider and the four stores the server runs on.
#[derive(Clone)]
pub struct Backends {
    pub provider: Arc<dyn CalendarProvider>,
    pub bookings: Arc<dyn BookingStore>,
    pub cursors: Arc<dyn SyncStateStore>,
    pub channels: Arc<dyn ChannelStore>,
    pub policies: Arc<dyn PricePolicyStore>,
}

impl Backends {
    /// Every store backed by one in-memory store.
    pub fn in_memory(provider: Arc<dyn CalendarProvider>, store: Arc<MemoryStore>) -> Self {
        Backends {
            provider,
            bookings: store.clone(),
            cursors: store.clone(),
            channels: store.clone(),
            policies: store,
        }
    }

    /// Google for events, Supabase for storage when configured.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let provider: Arc<dyn CalendarProvider> = Arc::new(
            GoogleCalendar::new(&settings.google).context("Failed to set up Google Calendar")?,
        );

        match &settings.supabase {
            Some(supabase) => {
                let store = Arc::new(SupabaseStore::new(supabase));
                Ok(Backends {
                    provider,
                    bookings: store.clone(),
                    cursors: store.clone(),
                    channels: store.clone(),
                    policies: store,
                })
            }
            None => {
                tracing::warn!("no [supabase] section, bookings are kept in memory only");
                Ok(Self::in_memory(provider, Arc::new(MemoryStore::new())))
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sync: Arc<Synchronizer>,
    pub channels: Arc<ChannelManager>,
    pub bookings: Arc<dyn BookingStore>,
    pub pricer: Arc<Pricer>,
    pub debouncer: Arc<Debouncer<RoomId>>,
}

impl AppState {
    pub fn new(settings: Settings, backends: Backends) -> Result<Self> {
        let rooms = settings
            .room_directory()
            .context("Invalid [rooms] configuration")?;
        if rooms.ids().is_empty() {
            tracing::warn!("no rooms configured");
        }

        let policies = Arc::new(PolicyResolver::new(
            backends.policies.clone(),
            TariffTable::default(),
            settings.sync.policy_cache_ttl,
        ));
        let pricer = Arc::new(Pricer::new(
            policies,
            PriceCalculator::new(settings.holidays()),
        ));

        let sync = Arc::new(
            Synchronizer::new(
                backends.provider.clone(),
                rooms,
                backends.bookings.clone(),
                backends.cursors.clone(),
                pricer.clone(),
            )
            .with_batch_size(settings.sync.batch_size),
        );

        let channels = Arc::new(ChannelManager::new(
            backends.provider.clone(),
            backends.channels.clone(),
            sync.clone(),
            ChannelOptions {
                callback_url: settings.webhook.callback_url.clone().unwrap_or_default(),
                stop_previous: settings.webhook.stop_previous,
                ttl: None,
            },
        ));

        let debouncer = Arc::new(Debouncer::new(settings.webhook.cooldown));

        Ok(AppState {
            settings: Arc::new(settings),
            sync,
            channels,
            bookings: backends.bookings,
            pricer,
            debouncer,
        })
    }

    pub fn from_settings(settings: Settings) -> Result<Self> {
        let backends = Backends::from_settings(&settings)?;
        Self::new(settings, backends)
    }

    /// Channel registration needs a public callback URL.
    pub fn require_callback_url(&self) -> Result<&str, RoomSyncError> {
        self.settings
            .webhook
            .callback_url
            .as_deref()
            .ok_or_else(|| RoomSyncError::Config("webhook.callback_url is not set".into()))
    }

    /// Schedule a debounced cursor sync of one room.
    pub fn trigger_sync(&self, room: RoomId) -> Trigger {
        let sync = self.sync.clone();
        self.debouncer.trigger(room, move || {
            let sync = sync.clone();
            async move {
                if sync.is_syncing(room) {
                    tracing::debug!(room = %room, "waiting for the running pass");
                }
                match sync.sync_room(room).await {
                    Ok(report) => tracing::info!(
                        room = %room,
                        mode = ?report.mode,
                        upserted = report.upserted,
                        deleted = report.deleted,
                        "webhook sync finished"
                    ),
                    Err(err) => tracing::error!(room = %room, error = %err, "webhook sync failed"),
                }
            }
        })
    }
}
