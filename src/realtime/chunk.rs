use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Largest encoded payload a single transport event carries before the
/// sender fragments it.
pub const CHUNK_SIZE: usize = 8192;

/// Hard ceiling the transport itself accepts per event.
pub const MAX_TRANSPORT_PAYLOAD: usize = 10240;

/// Suffix appended to an event name for its fragments.
pub const CHUNK_SUFFIX: &str = ":chunk";

const CORRELATION_ID_LEN: usize = 16;

/// One fragment of a serialized payload.
///
/// Fragments of the same payload share an `id`. The last one carries
/// `final: true` so a receiver knows how many to wait for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub index: u32,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub data: String,
}

pub fn chunk_event(event: &str) -> String {
    format!("{}{}", event, CHUNK_SUFFIX)
}

/// Returns the base event name if `event` names a fragment stream.
pub fn base_event(event: &str) -> Option<&str> {
    event.strip_suffix(CHUNK_SUFFIX)
}

pub fn correlation_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CORRELATION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Bytes `c` occupies once written inside a JSON string literal.
fn escaped_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Splits `payload` into segments whose JSON-escaped size stays within
/// `limit`. Segments always break on character boundaries, so each one is
/// valid UTF-8 on its own.
pub fn split_payload(payload: &str, limit: usize) -> Vec<String> {
    let mut segments = vec![];
    let mut start = 0;
    let mut size = 0;

    for (offset, c) in payload.char_indices() {
        let len = escaped_len(c);
        if size + len > limit && offset > start {
            segments.push(payload[start..offset].to_string());
            start = offset;
            size = 0;
        }
        size += len;
    }

    if start < payload.len() || segments.is_empty() {
        segments.push(payload[start..].to_string());
    }

    segments
}

/// Fragments `payload` into chunks sharing a fresh correlation id.
pub fn into_chunks(payload: &str) -> Vec<Chunk> {
    let id = correlation_id();
    let segments = split_payload(payload, CHUNK_SIZE);
    let last = segments.len() - 1;

    segments
        .into_iter()
        .enumerate()
        .map(|(index, data)| Chunk {
            id: id.clone(),
            index: index as u32,
            is_final: index == last,
            data,
        })
        .collect()
}

#[derive(Debug)]
struct PartialMessage {
    segments: BTreeMap<u32, String>,
    final_index: Option<u32>,
    started: Instant,
}

impl PartialMessage {
    fn is_complete(&self) -> bool {
        match self.final_index {
            Some(last) => (0..=last).all(|index| self.segments.contains_key(&index)),
            None => false,
        }
    }
}

/// Collects fragments per correlation id until every index up to the final
/// one has arrived, in whatever order they come.
#[derive(Debug)]
pub struct Reassembler {
    buffers: HashMap<String, PartialMessage>,
    timeout: Duration,
}

impl Reassembler {
    pub fn new(timeout: Duration) -> Reassembler {
        Reassembler {
            buffers: HashMap::new(),
            timeout,
        }
    }

    /// Stores `chunk` and returns the full payload once it is complete.
    /// A repeated index replaces the earlier copy.
    pub fn accept(&mut self, chunk: Chunk, now: Instant) -> Option<String> {
        let buffer = self
            .buffers
            .entry(chunk.id.clone())
            .or_insert_with(|| PartialMessage {
                segments: BTreeMap::new(),
                final_index: None,
                started: now,
            });

        if chunk.is_final {
            buffer.final_index = Some(chunk.index);
        }
        if let Some(last) = buffer.final_index {
            if chunk.index > last {
                warn!(id = %chunk.id, index = chunk.index, "dropping fragment past the final index");
                return None;
            }
        }
        buffer.segments.insert(chunk.index, chunk.data);

        if !buffer.is_complete() {
            return None;
        }

        let buffer = self.buffers.remove(&chunk.id)?;
        let last = buffer.final_index?;
        let payload: String = buffer
            .segments
            .into_iter()
            .take_while(|(index, _)| *index <= last)
            .map(|(_, data)| data)
            .collect();

        Some(payload)
    }

    /// Drops buffers that have waited longer than the timeout.
    pub fn reap(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.buffers.len();
        self.buffers
            .retain(|_, buffer| now.saturating_duration_since(buffer.started) < timeout);

        let reaped = before - self.buffers.len();
        if reaped > 0 {
            debug!(reaped, "discarded incomplete realtime payloads");
        }

        reaped
    }

    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_len(segment: &str) -> usize {
        // minus the surrounding quotes
        serde_json::to_string(segment).unwrap().len() - 2
    }

    fn large_payload() -> String {
        let line = "Ünïcödé \"quoted\" text\twith\\escapes and emoji 🚀\n";
        line.repeat(600)
    }

    #[test]
    fn small_payload_is_a_single_segment() {
        let segments = split_payload("hello", CHUNK_SIZE);

        assert_eq!(segments, vec!["hello".to_string()]);
        assert_eq!(split_payload("", CHUNK_SIZE), vec![String::new()]);
    }

    #[test]
    fn segments_respect_the_encoded_limit() {
        let payload = large_payload();

        let segments = split_payload(&payload, CHUNK_SIZE);

        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(encoded_len(segment) <= CHUNK_SIZE);
        }
        assert_eq!(segments.concat(), payload);
    }

    #[test]
    fn control_characters_count_as_unicode_escapes() {
        let payload = "\u{01}".repeat(10);

        let segments = split_payload(&payload, 12);

        assert_eq!(segments.len(), 5);
        for segment in &segments {
            assert!(encoded_len(segment) <= 12);
        }
    }

    #[test]
    fn chunks_mark_only_the_last_as_final() {
        let chunks = into_chunks(&large_payload());

        let id = &chunks[0].id;
        assert_eq!(id.len(), CORRELATION_ID_LEN);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(&chunk.id, id);
            assert_eq!(chunk.index as usize, index);
            assert_eq!(chunk.is_final, index == chunks.len() - 1);
        }
    }

    #[test]
    fn chunk_envelope_uses_final_key() {
        let chunk = Chunk {
            id: "abc".into(),
            index: 2,
            is_final: true,
            data: "xyz".into(),
        };

        let json = serde_json::to_value(&chunk).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "id": "abc", "index": 2, "final": true, "data": "xyz" })
        );
    }

    #[test]
    fn reassembles_in_any_arrival_order() {
        let payload = large_payload();
        let chunks = into_chunks(&payload);
        assert!(chunks.len() >= 3);

        let orders: Vec<Vec<usize>> = vec![
            (0..chunks.len()).collect(),
            (0..chunks.len()).rev().collect(),
            {
                let mut order: Vec<usize> = (0..chunks.len()).step_by(2).collect();
                order.extend((1..chunks.len()).step_by(2));
                order
            },
        ];

        for order in orders {
            let mut reassembler = Reassembler::new(Duration::from_secs(60));
            let now = Instant::now();
            let mut completed = None;
            for (position, index) in order.iter().enumerate() {
                let result = reassembler.accept(chunks[*index].clone(), now);
                if position + 1 < order.len() {
                    assert_eq!(result, None);
                } else {
                    completed = result;
                }
            }

            assert_eq!(completed.as_deref(), Some(payload.as_str()));
            assert_eq!(reassembler.pending(), 0);
        }
    }

    #[test]
    fn duplicate_fragments_do_not_corrupt_the_payload() {
        let payload = large_payload();
        let chunks = into_chunks(&payload);
        let mut reassembler = Reassembler::new(Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(reassembler.accept(chunks[0].clone(), now), None);
        assert_eq!(reassembler.accept(chunks[0].clone(), now), None);
        let mut completed = None;
        for chunk in chunks.iter().skip(1) {
            completed = reassembler.accept(chunk.clone(), now);
        }

        assert_eq!(completed, Some(payload));
    }

    #[test]
    fn withheld_final_fragment_never_completes_and_is_reaped() {
        let chunks = into_chunks(&large_payload());
        let mut reassembler = Reassembler::new(Duration::from_secs(60));
        let start = Instant::now();

        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(reassembler.accept(chunk.clone(), start), None);
        }

        assert_eq!(reassembler.pending(), 1);
        assert_eq!(reassembler.reap(start + Duration::from_secs(30)), 0);
        assert_eq!(reassembler.reap(start + Duration::from_secs(61)), 1);
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn interleaved_payloads_stay_separate() {
        let first = "a".repeat(CHUNK_SIZE * 2);
        let second = "b".repeat(CHUNK_SIZE * 2);
        let first_chunks = into_chunks(&first);
        let second_chunks = into_chunks(&second);
        let mut reassembler = Reassembler::new(Duration::from_secs(60));
        let now = Instant::now();

        let mut results = vec![];
        for (a, b) in first_chunks.into_iter().zip(second_chunks) {
            results.extend(reassembler.accept(a, now));
            results.extend(reassembler.accept(b, now));
        }

        assert_eq!(results, vec![first, second]);
    }

    #[test]
    fn event_names_round_trip_through_the_suffix() {
        assert_eq!(chunk_event("message"), "message:chunk");
        assert_eq!(base_event("message:chunk"), Some("message"));
        assert_eq!(base_event("message"), None);
    }
}
