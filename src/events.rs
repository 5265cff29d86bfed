//! Progress events and the per-job event sink.
//!
//! One sink exists per job, owned by the orchestrator; the receiving half is
//! adapted into the HTTP response body. The channel holds a single record,
//! so a slow consumer blocks the pipeline instead of piling up events, and a
//! record is handed off before the producer observes its next operation.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::errors::JobError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Progress,
    Success,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// One record on the wire: `{type, message, data?, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: String,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            kind,
            message: message.into(),
            data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(EventKind::Progress, message, None)
    }

    pub fn progress_with(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(EventKind::Progress, message, Some(data))
    }

    pub fn success(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(EventKind::Success, message, Some(data))
    }

    pub fn error(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(EventKind::Error, message, Some(data))
    }

    /// SSE framing: a single `data:` line holding the JSON record, then a
    /// blank line. No `event:` tags.
    pub fn to_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", json)
    }
}

/// The consumer went away; nothing can be delivered anymore.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Event stream closed by the consumer")]
pub struct SinkClosed;

impl From<SinkClosed> for JobError {
    fn from(_: SinkClosed) -> Self {
        JobError::Cancelled
    }
}

/// Producer half of a job's event stream.
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    /// Build a sink and the receiver the gateway turns into a response body.
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, event: Event) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }

    pub async fn progress(&self, message: impl Into<String>) -> Result<(), SinkClosed> {
        self.emit(Event::progress(message)).await
    }

    pub async fn progress_with(
        &self,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), SinkClosed> {
        self.emit(Event::progress_with(message, data)).await
    }

    pub async fn success(
        &self,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), SinkClosed> {
        self.emit(Event::success(message, data)).await
    }

    pub async fn error(
        &self,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), SinkClosed> {
        self.emit(Event::error(message, data)).await
    }

    /// Resolves when the consumer drops its half. The orchestrator races
    /// this against the pipeline to observe disconnects between emits.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_shape() {
        let event = Event::progress("Cloning repository...");
        let frame = event.to_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"type\":\"progress\""));
        assert!(frame.contains("Cloning repository..."));
        assert!(!frame.contains("event:"));
    }

    #[test]
    fn test_frame_omits_missing_data() {
        let frame = Event::progress("x").to_frame();
        assert!(!frame.contains("\"data\""));
    }

    #[test]
    fn test_timestamp_is_rfc3339_utc() {
        let event = Event::progress("x");
        let parsed = chrono::DateTime::parse_from_rfc3339(&event.timestamp);
        assert!(parsed.is_ok(), "bad timestamp: {}", event.timestamp);
        assert!(event.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(!EventKind::Progress.is_terminal());
        assert!(EventKind::Success.is_terminal());
        assert!(EventKind::Error.is_terminal());
    }

    #[test]
    fn test_error_event_carries_payload() {
        let event = Event::error(
            "Invalid repository URL: not-a-url",
            serde_json::json!({"state": "ACQUIRE_REPO", "kind": "InvalidRepoURL"}),
        );
        let frame = event.to_frame();
        assert!(frame.contains("\"kind\":\"InvalidRepoURL\""));
        assert!(frame.contains("\"state\":\"ACQUIRE_REPO\""));
    }

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let (sink, mut rx) = EventSink::channel();
        let producer = tokio::spawn(async move {
            sink.progress("one").await.unwrap();
            sink.progress("two").await.unwrap();
            sink.success("three", serde_json::json!({})).await.unwrap();
        });

        let mut messages = Vec::new();
        while let Some(event) = rx.recv().await {
            messages.push(event.message);
        }
        producer.await.unwrap();
        assert_eq!(messages, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_second_emit_blocks_until_consumed() {
        let (sink, mut rx) = EventSink::channel();
        sink.progress("first").await.unwrap();

        // Channel capacity is one record; the next emit must wait.
        let blocked = tokio::time::timeout(Duration::from_millis(20), sink.progress("second")).await;
        assert!(blocked.is_err(), "emit should block while unconsumed");

        assert_eq!(rx.recv().await.unwrap().message, "first");
        tokio::time::timeout(Duration::from_millis(100), sink.progress("second"))
            .await
            .expect("emit should proceed once drained")
            .unwrap();
    }

    #[tokio::test]
    async fn test_emit_after_consumer_drop_reports_closure() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        assert_eq!(sink.progress("x").await, Err(SinkClosed));
    }

    #[tokio::test]
    async fn test_closed_resolves_on_consumer_drop() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        tokio::time::timeout(Duration::from_millis(100), sink.closed())
            .await
            .expect("closed() should resolve");
    }
}
