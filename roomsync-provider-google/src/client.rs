use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use roomsync_core::config::GoogleSettings;
use roomsync_core::provider::{
    CalendarProvider, ChannelRequest, EventPage, ListQuery, ListRequest, WatchResponse,
};
use roomsync_core::{RoomSyncError, RoomSyncResult};
use url::Url;

use crate::session::{OAuthCredentials, Session};
use crate::wire::{
    ChannelResource, FromGoogle, GoogleEventList, StopBody, WatchBody, WatchParams,
};

/// Google Calendar v3 over REST.
///
/// Listing works with an API key for public calendars. Channel calls need
/// OAuth credentials; the access token is refreshed on demand.
#[derive(Debug)]
pub struct GoogleCalendar {
    http: reqwest::Client,
    api_base: Url,
    api_key: Option<String>,
    session: Option<Session>,
}

impl GoogleCalendar {
    pub fn new(settings: &GoogleSettings) -> RoomSyncResult<Self> {
        let api_base = Url::parse(&settings.api_base_url)
            .map_err(|e| RoomSyncError::Config(format!("google.api_base_url: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(RoomSyncError::Config(format!(
                "google.api_base_url is not a base URL: {api_base}"
            )));
        }

        let session = match (
            &settings.client_id,
            &settings.client_secret,
            &settings.refresh_token,
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(Session::new(
                settings.token_url.clone(),
                OAuthCredentials {
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                    refresh_token: refresh_token.clone(),
                },
            )),
            _ => None,
        };

        if session.is_none() && settings.api_key.is_none() {
            return Err(RoomSyncError::Config(
                "Google needs google.api_key or OAuth client credentials".into(),
            ));
        }

        Ok(GoogleCalendar {
            http: reqwest::Client::new(),
            api_base,
            api_key: settings.api_key.clone(),
            session,
        })
    }

    pub fn has_oauth(&self) -> bool {
        self.session.is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> RoomSyncResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| RoomSyncError::Config("google.api_base_url is not a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        require_oauth: bool,
    ) -> RoomSyncResult<RequestBuilder> {
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.query(&[("key", key)]);
        }
        match &self.session {
            Some(session) => {
                let token = session.access_token(&self.http).await?;
                builder = builder.bearer_auth(token);
            }
            None if require_oauth => {
                return Err(RoomSyncError::Config(
                    "push channels need Google OAuth client credentials".into(),
                ));
            }
            None => {}
        }
        Ok(builder)
    }

    /// Send and turn non-success statuses into errors.
    async fn send(&self, builder: RequestBuilder) -> RoomSyncResult<Response> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED
            && let Some(session) = &self.session
        {
            session.invalidate().await;
        }
        let message = response.text().await.unwrap_or_default();
        Err(classify(status, message))
    }
}

fn transport_error(err: reqwest::Error) -> RoomSyncError {
    if err.is_decode() {
        RoomSyncError::Serialization(err.to_string())
    } else {
        RoomSyncError::ProviderTransient(err.to_string())
    }
}

/// 410 means the sync token is gone; 429 and 5xx are worth retrying later.
fn classify(status: StatusCode, message: String) -> RoomSyncError {
    if status == StatusCode::GONE {
        RoomSyncError::CursorInvalid(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RoomSyncError::ProviderTransient(format!("{status}: {message}"))
    } else {
        RoomSyncError::ProviderRejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn list_params(request: &ListRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("singleEvents", "true".to_string()),
        ("maxResults", request.max_results.to_string()),
    ];
    match &request.query {
        ListQuery::Full => {}
        ListQuery::Delta { sync_token } => params.push(("syncToken", sync_token.clone())),
        ListQuery::Window(window) => {
            params.push((
                "timeMin",
                window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
            params.push((
                "timeMax",
                window.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
            params.push(("orderBy", "startTime".to_string()));
        }
    }
    if let Some(page_token) = &request.page_token {
        params.push(("pageToken", page_token.clone()));
    }
    params
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn list_events(
        &self,
        calendar_id: &str,
        request: &ListRequest,
    ) -> RoomSyncResult<EventPage> {
        let url = self.endpoint(&["calendars", calendar_id, "events"])?;
        let builder = self
            .request(Method::GET, url, false)
            .await?
            .query(&list_params(request));

        let list: GoogleEventList = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        let page = EventPage::from_google(list);
        tracing::debug!(
            calendar_id,
            events = page.events.len(),
            more = page.next_page_token.is_some(),
            "fetched event page"
        );
        Ok(page)
    }

    async fn watch(
        &self,
        calendar_id: &str,
        request: &ChannelRequest,
    ) -> RoomSyncResult<WatchResponse> {
        let url = self.endpoint(&["calendars", calendar_id, "events", "watch"])?;
        let body = WatchBody {
            id: &request.channel_id,
            kind: "web_hook",
            address: &request.callback_url,
            token: &request.token,
            params: request.ttl.map(|ttl| WatchParams {
                ttl: ttl.num_seconds().to_string(),
            }),
        };
        let builder = self.request(Method::POST, url, true).await?.json(&body);

        let resource: ChannelResource = self
            .send(builder)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        let expiration = resource.expiration()?;
        tracing::info!(
            calendar_id,
            channel_id = %request.channel_id,
            resource_id = %resource.resource_id,
            %expiration,
            "channel opened"
        );
        Ok(WatchResponse {
            resource_id: resource.resource_id,
            expiration,
        })
    }

    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> RoomSyncResult<()> {
        let url = self.endpoint(&["channels", "stop"])?;
        let builder = self
            .request(Method::POST, url, true)
            .await?
            .json(&StopBody {
                id: channel_id,
                resource_id,
            });

        match self.send(builder).await {
            Ok(_) => {
                tracing::info!(channel_id, "channel stopped");
                Ok(())
            }
            Err(RoomSyncError::ProviderRejected { status: 404, .. }) => {
                tracing::debug!(channel_id, "channel already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use roomsync_core::TimeWindow;

    #[test]
    fn test_classify() {
        assert!(matches!(
            classify(StatusCode::GONE, "fullSyncRequired".into()),
            RoomSyncError::CursorInvalid(_)
        ));
        assert!(matches!(
            classify(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            RoomSyncError::ProviderTransient(_)
        ));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, String::new()),
            RoomSyncError::ProviderTransient(_)
        ));
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, String::new()),
            RoomSyncError::ProviderRejected { status: 403, .. }
        ));
    }

    #[test]
    fn test_window_params() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let params = list_params(&ListRequest::new(ListQuery::Window(window)));
        assert!(params.contains(&("timeMin", "2025-11-01T00:00:00Z".to_string())));
        assert!(params.contains(&("timeMax", "2025-12-01T00:00:00Z".to_string())));
        assert!(params.contains(&("orderBy", "startTime".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "syncToken"));
    }

    #[test]
    fn test_delta_params_carry_tokens() {
        let request = ListRequest::new(ListQuery::Delta {
            sync_token: "sync-1".into(),
        })
        .page(Some("page-2".into()));
        let params = list_params(&request);
        assert!(params.contains(&("syncToken", "sync-1".to_string())));
        assert!(params.contains(&("pageToken", "page-2".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "timeMin"));
    }

    #[test]
    fn test_requires_some_credentials() {
        let settings = GoogleSettings {
            api_key: None,
            ..GoogleSettings::default()
        };
        assert!(matches!(
            GoogleCalendar::new(&settings),
            Err(RoomSyncError::Config(_))
        ));
    }

    #[test]
    fn test_calendar_ids_are_escaped_in_paths() {
        let settings = GoogleSettings {
            api_key: Some("key".into()),
            ..GoogleSettings::default()
        };
        let google = GoogleCalendar::new(&settings).unwrap();
        let url = google
            .endpoint(&["calendars", "ko.south_korea#holiday@group.v.calendar.google.com", "events"])
            .unwrap();
        assert_eq!(
            url.path(),
            "/calendar/v3/calendars/ko.south_korea%23holiday@group.v.calendar.google.com/events"
        );
    }
}
