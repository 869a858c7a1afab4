// src/analysis/normalizer.rs — Detection payload → {count, observed_at}
//
// Detector output is not schema-stable across versions. Every payload is
// first classified into a closed set of shapes; anything that fails to
// classify lands in an `Unrecognized` arm and counts as zero.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::DetectionResult;

/// One frame's raw detector output, exactly as the feed produced it.
pub type DetectionEvent = Value;

/// Positional predictions carry their metadata mapping in this slot.
const POSITIONAL_METADATA_INDEX: usize = 5;

/// The working payload of an event, after unwrapping a paired value.
#[derive(Debug, PartialEq)]
enum Payload<'a> {
    Predictions(&'a [Value]),
    Unrecognized,
}

/// A single prediction inside the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Prediction<'a> {
    /// Tuple-like record with at least six fields; the sixth is metadata.
    Positional(&'a [Value]),
    /// Keyed record carrying `class` or `class_name`.
    Keyed(&'a Map<String, Value>),
    Unrecognized,
}

fn classify_event(event: &DetectionEvent) -> Payload<'_> {
    // Paired events (result, frame) keep the result first.
    let working = match event {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return Payload::Unrecognized,
        },
        other => other,
    };

    match working
        .as_object()
        .and_then(|m| m.get("predictions"))
        .and_then(Value::as_array)
    {
        Some(predictions) => Payload::Predictions(predictions),
        None => Payload::Unrecognized,
    }
}

fn classify_prediction(prediction: &Value) -> Prediction<'_> {
    match prediction {
        Value::Array(fields) if fields.len() > POSITIONAL_METADATA_INDEX => {
            Prediction::Positional(fields)
        }
        Value::Object(map) => Prediction::Keyed(map),
        _ => Prediction::Unrecognized,
    }
}

fn class_label(prediction: Prediction<'_>) -> Option<&str> {
    match prediction {
        Prediction::Positional(fields) => fields[POSITIONAL_METADATA_INDEX]
            .as_object()?
            .get("class_name")?
            .as_str(),
        Prediction::Keyed(map) => map
            .get("class")
            .or_else(|| map.get("class_name"))?
            .as_str(),
        Prediction::Unrecognized => None,
    }
}

/// Count predictions in `event` whose class label equals `target`,
/// ignoring case (Unicode lowercase folding). Total over its input:
/// unrecognized shapes count zero.
pub fn count_matching(event: &DetectionEvent, target: &str) -> u32 {
    let predictions = match classify_event(event) {
        Payload::Predictions(p) => p,
        Payload::Unrecognized => {
            tracing::debug!("Detection payload has no predictions sequence; counting 0");
            return 0;
        }
    };

    let target = target.to_lowercase();
    let mut count = 0;
    for raw in predictions {
        let prediction = classify_prediction(raw);
        match class_label(prediction) {
            Some(label) if label.to_lowercase() == target => count += 1,
            Some(_) => {}
            None => tracing::debug!("Skipping prediction without a readable class label"),
        }
    }
    count
}

/// Decoding policy seam. Supervisors only ever see this trait, so the
/// policy can change with the detector without touching session logic.
pub trait EventDecoder: Send + Sync {
    /// Number of target objects in a single event.
    fn count(&self, event: &DetectionEvent) -> u32;

    /// Stamp a count with the time it was observed.
    fn normalize(&self, event: &DetectionEvent, observed_at: DateTime<Utc>) -> DetectionResult {
        DetectionResult {
            count: self.count(event),
            observed_at: Some(observed_at),
        }
    }
}

/// Counts predictions of a single class label.
#[derive(Debug, Clone)]
pub struct LabelCounter {
    target: String,
}

impl LabelCounter {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl EventDecoder for LabelCounter {
    fn count(&self, event: &DetectionEvent) -> u32 {
        count_matching(event, &self.target)
    }
}
