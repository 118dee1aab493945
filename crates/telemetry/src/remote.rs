//! Remote trace delivery.
//!
//! Events are queued on an unbounded channel and posted by a background
//! task, so recording a span never waits on the network. Delivery failures
//! are logged and dropped.

use crate::model::{FeedbackEntry, Span};
use chrono::{DateTime, Utc};
use depo_core::error::TraceError;
use depo_core::trace::SpanUpdate;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One event mirrored to the remote backend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportEvent {
    SpanStarted { span: Span },
    SpanUpdated { span_id: String, update: SpanUpdate },
    SpanEnded { span_id: String, ended_at: DateTime<Utc> },
    Feedback { feedback: FeedbackEntry },
}

#[derive(Debug, Serialize)]
struct EventEnvelope<'a> {
    project: &'a str,
    event: &'a ExportEvent,
}

/// Handle to the background delivery task.
#[derive(Clone)]
pub struct RemoteExporter {
    tx: mpsc::UnboundedSender<ExportEvent>,
}

impl RemoteExporter {
    /// Start the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(api_url: &str, api_key: Option<String>, project: impl Into<String>) -> Result<Self, TraceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TraceError::Delivery(e.to_string()))?;
        let endpoint = format!("{}/v1/events", api_url.trim_end_matches('/'));
        let project = project.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<ExportEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut request = client.post(&endpoint).json(&EventEnvelope {
                    project: &project,
                    event: &event,
                });
                if let Some(key) = &api_key {
                    request = request.bearer_auth(key);
                }
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(endpoint = %endpoint, "Trace event delivered");
                    }
                    Ok(response) => {
                        warn!(status = response.status().as_u16(), "Trace backend rejected event");
                    }
                    Err(e) => warn!(error = %e, "Trace event delivery failed"),
                }
            }
            debug!("Trace exporter stopped");
        });

        Ok(Self { tx })
    }

    /// Queue an event. Never blocks.
    pub fn send(&self, event: ExportEvent) {
        if self.tx.send(event).is_err() {
            warn!("Trace exporter is gone; event dropped");
        }
    }
}
