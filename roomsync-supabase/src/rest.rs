//! Minimal PostgREST client: filtered selects with range pagination,
//! upserts, inserts and deletes against Supabase's `/rest/v1`.

use reqwest::{Method, RequestBuilder, Response};
use roomsync_core::{RoomSyncError, RoomSyncResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Supabase caps responses at 1000 rows.
pub(crate) const PAGE_SIZE: usize = 1000;

/// Filters as PostgREST query pairs, e.g. `("room_id", "eq.a")`.
pub(crate) type Filters = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn error(self, message: String) -> RoomSyncError {
        match self {
            Access::Read => RoomSyncError::StoreRead(message),
            Access::Write => RoomSyncError::StoreWrite(message),
        }
    }
}

/// `in.("x","y")` with values quoted so commas and parentheses survive.
pub(crate) fn in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values
        .into_iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http: reqwest::Client,
    base: String,
    key: String,
}

impl PostgrestClient {
    pub fn new(project_url: &str, service_role_key: &str) -> Self {
        PostgrestClient {
            http: reqwest::Client::new(),
            base: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            key: service_role_key.to_string(),
        }
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send(
        &self,
        access: Access,
        table: &str,
        builder: RequestBuilder,
    ) -> RoomSyncResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| access.error(format!("{table}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(table, status = status.as_u16(), body = %body, "PostgREST request failed");
        Err(access.error(format!("{table}: {status} {body}")))
    }

    /// Every row matching `filters`, fetched one range page at a time.
    /// Filters must include an `order` for the pages to be stable.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &Filters,
    ) -> RoomSyncResult<Vec<T>> {
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            let builder = self
                .request(Method::GET, table)
                .query(filters)
                .header("Range-Unit", "items")
                .header("Range", format!("{}-{}", offset, offset + PAGE_SIZE - 1));
            let page: Vec<T> = self
                .send(Access::Read, table, builder)
                .await?
                .json()
                .await
                .map_err(|e| RoomSyncError::StoreRead(format!("{table}: {e}")))?;

            let len = page.len();
            rows.extend(page);
            if len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(rows)
    }

    /// Insert rows, merging into existing ones that collide on `on_conflict`.
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        on_conflict: &str,
        rows: &[T],
    ) -> RoomSyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let builder = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        self.send(Access::Write, table, builder).await?;
        Ok(())
    }

    /// Insert one row and return it as stored.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> RoomSyncResult<R> {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(row);
        let mut stored: Vec<R> = self
            .send(Access::Write, table, builder)
            .await?
            .json()
            .await
            .map_err(|e| RoomSyncError::StoreWrite(format!("{table}: {e}")))?;
        stored
            .pop()
            .ok_or_else(|| RoomSyncError::StoreWrite(format!("{table}: insert returned no row")))
    }

    /// Delete matching rows and return how many went.
    pub async fn delete(&self, table: &str, filters: &Filters) -> RoomSyncResult<usize> {
        let builder = self
            .request(Method::DELETE, table)
            .query(filters)
            .header("Prefer", "return=representation");
        let deleted: Vec<serde_json::Value> = self
            .send(Access::Write, table, builder)
            .await?
            .json()
            .await
            .map_err(|e| RoomSyncError::StoreWrite(format!("{table}: {e}")))?;
        Ok(deleted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_list_quotes_values() {
        assert_eq!(in_list(["a", "b"]), r#"in.("a","b")"#);
        assert_eq!(
            in_list(["evt_20251103T010000Z", "odd\"id"]),
            r#"in.("evt_20251103T010000Z","odd\"id")"#
        );
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client = PostgrestClient::new("https://abc.supabase.co/", "key");
        assert_eq!(client.base, "https://abc.supabase.co/rest/v1");
    }
}
