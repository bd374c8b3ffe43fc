//! Push progress state machine
//!
//! The engine answers a push with newline-delimited JSON events. Events with
//! a layer `id` drive a per-layer state machine; an event carrying an error
//! ends the push. Status strings this module does not know are ignored so
//! that new engine messages never break a push.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Progress counters attached to `Pushing` events
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Trailing `aux` payload with the pushed manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushAux {
    #[serde(rename = "Tag", default)]
    pub tag: Option<String>,
    #[serde(rename = "Digest", default)]
    pub digest: Option<String>,
    #[serde(rename = "Size", default)]
    pub size: Option<u64>,
}

/// One decoded event from the push stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "progressDetail", default)]
    pub progress_detail: Option<ProgressDetail>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "errorDetail", default)]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub aux: Option<PushAux>,
}

impl PushEvent {
    /// Registry-reported error, if this event carries one
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| {
                self.error_detail
                    .as_ref()
                    .and_then(|d| d.message.as_deref())
                    .filter(|e| !e.trim().is_empty())
            })
    }

    /// Manifest digest reported at the end of a push
    pub fn digest(&self) -> Option<&str> {
        if let Some(digest) = self.aux.as_ref().and_then(|a| a.digest.as_deref()) {
            return Some(digest);
        }
        // "<tag>: digest: sha256:<hex> size: <n>"
        let status = self.status.as_deref()?;
        let mut words = status.split_whitespace();
        words.find(|w| *w == "digest:")?;
        words.next().filter(|d| d.starts_with("sha256:"))
    }
}

/// Per-layer push state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerState {
    Waiting,
    Preparing,
    Pushing,
    Verifying,
    Pushed,
    Exists,
    Mounted,
}

impl LayerState {
    /// Map an engine status string; unknown statuses map to `None`
    pub fn from_status(status: &str) -> Option<Self> {
        let status = status.trim();
        match status {
            "Waiting" => Some(Self::Waiting),
            "Preparing" => Some(Self::Preparing),
            "Pushing" => Some(Self::Pushing),
            "Pushed" => Some(Self::Pushed),
            "Layer already exists" => Some(Self::Exists),
            s if s.starts_with("Verifying") => Some(Self::Verifying),
            s if s.starts_with("Mounted from") => Some(Self::Mounted),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Preparing => 1,
            Self::Pushing => 2,
            Self::Verifying => 3,
            Self::Pushed | Self::Exists | Self::Mounted => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Pushed | Self::Exists | Self::Mounted)
    }
}

/// Progress of a single layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerProgress {
    pub layer_id: String,
    pub state: LayerState,
    pub current_bytes: u64,
    pub total_bytes: u64,
}

impl LayerProgress {
    fn new(layer_id: &str, state: LayerState) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            state,
            current_bytes: 0,
            total_bytes: 0,
        }
    }

    /// Apply a transition; returns whether anything changed
    ///
    /// Terminal states are sticky and states never move backwards. Any
    /// terminal status is accepted from any non-terminal state.
    fn advance(&mut self, next: LayerState, detail: Option<&ProgressDetail>) -> bool {
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            return false;
        }

        let mut changed = self.state != next;
        self.state = next;

        if let Some(detail) = detail {
            if let Some(total) = detail.total.filter(|t| *t > 0) {
                changed |= self.total_bytes != total;
                self.total_bytes = total;
            }
            if let Some(current) = detail.current {
                let current = current.max(self.current_bytes);
                changed |= self.current_bytes != current;
                self.current_bytes = current;
            }
        }

        if next == LayerState::Pushed && self.total_bytes > 0 {
            self.current_bytes = self.total_bytes;
        }

        changed
    }
}

/// Outcome of applying one event
#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// A layer changed state or byte count
    Layer(LayerProgress),
    /// A non-layer status line, passed through for display
    Status(String),
    /// Nothing to report
    Ignored,
}

/// Counts of layers by final state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub pushed: usize,
    pub exists: usize,
    pub mounted: usize,
    pub incomplete: usize,
}

impl LayerSummary {
    pub fn total(&self) -> usize {
        self.pushed + self.exists + self.mounted + self.incomplete
    }
}

/// Aggregated progress for one push
#[derive(Debug, Default)]
pub struct PushProgress {
    layers: Vec<LayerProgress>,
    index: HashMap<String, usize>,
    digest: Option<String>,
}

impl PushProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event; an error event is returned as `Err(message)`
    pub fn apply(&mut self, event: &PushEvent) -> Result<EventOutcome, String> {
        if let Some(message) = event.error_message() {
            return Err(message.to_string());
        }

        if let Some(digest) = event.digest() {
            self.digest = Some(digest.to_string());
        }

        let status = match event.status.as_deref() {
            Some(status) => status,
            None => return Ok(EventOutcome::Ignored),
        };

        let layer_id = match event.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => return Ok(EventOutcome::Status(status.to_string())),
        };

        let Some(next) = LayerState::from_status(status) else {
            return Ok(EventOutcome::Ignored);
        };

        let (slot, created) = match self.index.get(layer_id) {
            Some(&slot) => (slot, false),
            None => {
                self.layers.push(LayerProgress::new(layer_id, LayerState::Waiting));
                self.index.insert(layer_id.to_string(), self.layers.len() - 1);
                (self.layers.len() - 1, true)
            }
        };

        let layer = &mut self.layers[slot];
        if layer.advance(next, event.progress_detail.as_ref()) || created {
            Ok(EventOutcome::Layer(layer.clone()))
        } else {
            Ok(EventOutcome::Ignored)
        }
    }

    /// Layers in order of first appearance
    #[cfg(test)]
    pub fn layers(&self) -> &[LayerProgress] {
        &self.layers
    }

    #[cfg(test)]
    pub fn layer(&self, layer_id: &str) -> Option<&LayerProgress> {
        self.index.get(layer_id).map(|&slot| &self.layers[slot])
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn summary(&self) -> LayerSummary {
        let mut summary = LayerSummary::default();
        for layer in &self.layers {
            match layer.state {
                LayerState::Pushed => summary.pushed += 1,
                LayerState::Exists => summary.exists += 1,
                LayerState::Mounted => summary.mounted += 1,
                _ => summary.incomplete += 1,
            }
        }
        summary
    }
}

/// Splits a byte stream into JSON events on newline boundaries
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<PushEvent>, serde_json::Error> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = Self::decode_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Result<Option<PushEvent>, serde_json::Error> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest)
    }

    fn decode_line(line: &[u8]) -> Result<Option<PushEvent>, serde_json::Error> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(trimmed).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, status: &str) -> PushEvent {
        PushEvent {
            id: Some(id.to_string()),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }

    fn pushing(id: &str, current: u64, total: u64) -> PushEvent {
        PushEvent {
            progress_detail: Some(ProgressDetail {
                current: Some(current),
                total: Some(total),
            }),
            ..event(id, "Pushing")
        }
    }

    fn error_event(message: &str) -> PushEvent {
        PushEvent {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_layer_lifecycle() {
        let mut progress = PushProgress::new();
        for e in [
            event("a1", "Preparing"),
            event("a1", "Waiting"),
            pushing("a1", 512, 2048),
            pushing("a1", 1024, 2048),
            event("a1", "Pushed"),
        ] {
            progress.apply(&e).unwrap();
        }
        let layer = progress.layer("a1").unwrap();
        assert_eq!(layer.state, LayerState::Pushed);
        assert_eq!(layer.current_bytes, 2048);
        assert_eq!(layer.total_bytes, 2048);
    }

    #[test]
    fn test_repeated_pushing_does_not_regress() {
        let mut progress = PushProgress::new();
        progress.apply(&pushing("a1", 100, 1000)).unwrap();
        progress.apply(&event("a1", "Preparing")).unwrap();
        progress.apply(&pushing("a1", 50, 1000)).unwrap();
        progress.apply(&pushing("a1", 300, 1000)).unwrap();

        let layer = progress.layer("a1").unwrap();
        assert_eq!(layer.state, LayerState::Pushing);
        assert_eq!(layer.current_bytes, 300);
    }

    #[test]
    fn test_layer_already_exists_from_any_non_terminal_state() {
        let mut progress = PushProgress::new();
        progress.apply(&event("w", "Waiting")).unwrap();
        progress.apply(&event("p", "Preparing")).unwrap();
        progress.apply(&pushing("u", 10, 100)).unwrap();
        for id in ["w", "p", "u", "fresh"] {
            progress.apply(&event(id, "Layer already exists")).unwrap();
            assert_eq!(progress.layer(id).unwrap().state, LayerState::Exists, "{}", id);
        }
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut progress = PushProgress::new();
        progress.apply(&event("a1", "Mounted from library/alpine")).unwrap();
        progress.apply(&event("a1", "Pushed")).unwrap();
        progress.apply(&pushing("a1", 1, 2)).unwrap();
        assert_eq!(progress.layer("a1").unwrap().state, LayerState::Mounted);
    }

    #[test]
    fn test_unknown_status_is_ignored() {
        let mut progress = PushProgress::new();
        progress.apply(&pushing("a1", 1, 10)).unwrap();
        let outcome = progress.apply(&event("a1", "Retrying in 5 seconds")).unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
        assert_eq!(progress.layer("a1").unwrap().state, LayerState::Pushing);

        let outcome = progress.apply(&event("b2", "Compressing")).unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(progress.layer("b2").is_none());
    }

    #[test]
    fn test_error_event_short_circuits_at_any_position() {
        let successes = vec![
            event("a", "Preparing"),
            pushing("a", 1, 2),
            event("a", "Pushed"),
            event("b", "Layer already exists"),
        ];
        for position in 0..=successes.len() {
            let mut stream = successes.clone();
            stream.insert(position, error_event("denied: requested access to the resource is denied"));

            let mut progress = PushProgress::new();
            let mut failure = None;
            let mut applied = 0;
            for e in &stream {
                match progress.apply(e) {
                    Ok(_) => applied += 1,
                    Err(message) => {
                        failure = Some(message);
                        break;
                    }
                }
            }
            assert_eq!(applied, position);
            assert!(failure.unwrap().starts_with("denied"));
        }
    }

    #[test]
    fn test_error_detail_counts_as_error() {
        let e = PushEvent {
            error_detail: Some(ErrorDetail {
                code: None,
                message: Some("unauthorized".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(PushProgress::new().apply(&e), Err("unauthorized".to_string()));

        let empty = PushEvent {
            error: Some(String::new()),
            ..event("a", "Pushed")
        };
        assert!(PushProgress::new().apply(&empty).is_ok());
    }

    #[test]
    fn test_summary_and_digest() {
        let mut progress = PushProgress::new();
        progress.apply(&event("a", "Pushed")).unwrap();
        progress.apply(&event("b", "Layer already exists")).unwrap();
        progress.apply(&event("c", "Mounted from acme/base")).unwrap();
        progress.apply(&event("d", "Preparing")).unwrap();
        let status = PushEvent {
            status: Some(
                "v1: digest: sha256:4c1b0a0f9f0f4d7e5c6d33a5d61e2e3b0c9e8d1f2a3b4c5d6e7f8091a2b3c4d5 size: 1570"
                    .to_string(),
            ),
            ..Default::default()
        };
        assert!(matches!(progress.apply(&status).unwrap(), EventOutcome::Status(_)));

        assert_eq!(
            progress.summary(),
            LayerSummary {
                pushed: 1,
                exists: 1,
                mounted: 1,
                incomplete: 1
            }
        );
        assert!(progress.digest().unwrap().starts_with("sha256:4c1b"));
        let ids: Vec<_> = progress.layers().iter().map(|l| l.layer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_decoder_handles_split_chunks() {
        let body = concat!(
            r#"{"status":"The push refers to repository [docker.io/acme/app]"}"#,
            "\n",
            r#"{"status":"Preparing","progressDetail":{},"id":"5f70bf18a086"}"#,
            "\r\n\n",
            r#"{"status":"Pushing","progressDetail":{"current":512,"total":1024},"progress":"[==>   ]","id":"5f70bf18a086"}"#,
            "\n",
            r#"{"progress":"","aux":{"Tag":"v1","Digest":"sha256:abc","Size":525}}"#,
        );

        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(7) {
            events.extend(decoder.feed(chunk).unwrap());
        }
        events.extend(decoder.finish().unwrap());

        assert_eq!(events.len(), 4);
        assert_eq!(events[1].id.as_deref(), Some("5f70bf18a086"));
        assert_eq!(
            events[2].progress_detail,
            Some(ProgressDetail {
                current: Some(512),
                total: Some(1024)
            })
        );
        assert_eq!(events[3].digest(), Some("sha256:abc"));
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = EventDecoder::new();
        assert!(decoder.feed(b"not json\n").is_err());
    }
}
