//! REST note store
//!
//! Talks to the hosted realtime database through its PostgREST
//! interface. Change notifications are derived by polling the table
//! and comparing snapshots, one poller per subscription.

use super::{NoteStore, Subscription};
use crate::config::{CHANGE_CHANNEL_CAPACITY, NOTES_TABLE, REST_POLL_INTERVAL};
use crate::error::{BoardError, Result};
use crate::model::{sort_for_board, ChangeEvent, ChangeKind, NewNote, Note, PositionUpdate};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// Note store speaking PostgREST
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    table_url: String,
    poll_interval: Duration,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(api_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            table_url: table_url(base_url),
            poll_interval: REST_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn row_url(&self, id: &str) -> String {
        format!("{}?id=eq.{}", self.table_url, id)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BoardError::Transport(format!("{}: {}", status, body)))
    }

    async fn fetch(client: &Client, table_url: &str) -> Result<Vec<Note>> {
        let request = client
            .get(table_url)
            .query(&[("select", "*"), ("order", "created_at.asc")]);
        let mut notes: Vec<Note> = Self::send(request).await?.json().await?;
        sort_for_board(&mut notes);
        Ok(notes)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| BoardError::Config(format!("Invalid API key header: {}", e)))
}

fn table_url(base_url: &str) -> String {
    format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), NOTES_TABLE)
}

/// Changes between two snapshots: inserts and updates in the order of
/// `current`, followed by deletes sorted by id
fn diff_snapshots(previous: &HashMap<String, Note>, current: &[Note]) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for note in current {
        match previous.get(&note.id) {
            None => events.push(ChangeEvent::new(ChangeKind::Insert, &note.id)),
            Some(old) if old != note => events.push(ChangeEvent::new(ChangeKind::Update, &note.id)),
            Some(_) => {}
        }
    }

    let mut deleted: Vec<&String> = previous
        .keys()
        .filter(|id| !current.iter().any(|n| &n.id == *id))
        .collect();
    deleted.sort();
    events.extend(
        deleted
            .into_iter()
            .map(|id| ChangeEvent::new(ChangeKind::Delete, id)),
    );

    events
}

fn index(notes: Vec<Note>) -> HashMap<String, Note> {
    notes.into_iter().map(|n| (n.id.clone(), n)).collect()
}

#[async_trait]
impl NoteStore for RestStore {
    async fn select_all(&self) -> Result<Vec<Note>> {
        Self::fetch(&self.client, &self.table_url).await
    }

    async fn insert(&self, req: NewNote) -> Result<Note> {
        let request = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&req);

        let mut created: Vec<Note> = Self::send(request).await?.json().await?;
        let note = created
            .pop()
            .ok_or_else(|| BoardError::Transport("Insert returned no rows".to_string()))?;

        tracing::debug!("Created note: {}", note.id);
        Ok(note)
    }

    async fn update_position(&self, id: &str, update: PositionUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let request = self.client.patch(self.row_url(id)).json(&update);
        Self::send(request).await?;

        tracing::debug!("Moved note: {}", id);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        Self::send(self.client.delete(self.row_url(id))).await?;

        tracing::debug!("Deleted note: {}", id);
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let (tx, rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let client = self.client.clone();
        let table_url = self.table_url.clone();
        let poll_interval = self.poll_interval;

        // Baseline so the first poll does not report every existing note.
        let mut previous = index(Self::fetch(&client, &table_url).await?);

        let feeder = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.tick().await;

            loop {
                interval.tick().await;

                let current = match Self::fetch(&client, &table_url).await {
                    Ok(notes) => notes,
                    Err(e) => {
                        tracing::warn!("Polling for note changes failed: {}", e);
                        continue;
                    }
                };

                for event in diff_snapshots(&previous, &current) {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                previous = index(current);
            }
        });

        tracing::debug!("Polling {} every {:?}", self.table_url, poll_interval);
        Ok(Subscription::with_feeder(rx, feeder))
    }
}
