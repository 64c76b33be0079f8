//! Background loops: channel renewal and the upcoming-window refresh.

use std::time::Duration;

use roomsync_core::TimeWindow;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// Spawn both loops. They run until the runtime shuts down.
pub fn spawn_all(state: &AppState) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if state.settings.webhook.callback_url.is_some() {
        handles.push(tokio::spawn(renew_loop(state.clone())));
    } else {
        tracing::info!("webhook.callback_url not set, channel renewal disabled");
    }
    handles.push(tokio::spawn(refresh_loop(state.clone())));

    handles
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn renew_loop(state: AppState) {
    let margin = match chrono::Duration::from_std(state.settings.webhook.renew_margin) {
        Ok(margin) => margin,
        Err(err) => {
            tracing::error!(error = %err, "webhook.renew_margin out of range, renewal disabled");
            return;
        }
    };

    let mut interval = ticker(state.settings.webhook.renew_interval);
    loop {
        interval.tick().await;
        match state.channels.sweep_expiring(margin).await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                tracing::info!(renewed = outcomes.len() - failed, failed, "channel sweep finished");
            }
            Err(err) => tracing::error!(error = %err, "channel sweep failed"),
        }
    }
}

async fn refresh_loop(state: AppState) {
    let settings = &state.settings.sync;
    let mut interval = ticker(settings.refresh_interval);
    loop {
        interval.tick().await;
        let window = TimeWindow::upcoming(chrono::Utc::now(), settings.upcoming_weeks);
        let rooms = state.sync.rooms().ids();
        let outcomes = state
            .sync
            .sync_windows(&rooms, window, settings.timeout)
            .await;
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        tracing::info!(rooms = rooms.len(), failed, "upcoming window refreshed");
    }
}
