//! A single scheduled musical event: when it starts, how long it lasts,
//! what pitch(es) and volume it has, and a bag of extra properties.
//!
//! Ported from `performance_note.py`'s `PerformanceNote`. Rather than one
//! class whose `pitch`/`length`/`volume` attributes are "maybe a number,
//! maybe a tuple, maybe an envelope", each of those becomes its own enum
//! here — the shape is checked once, at construction or parse time,
//! instead of on every read.

use crate::clock::Clock;
use crate::curve::ParameterCurve;
use crate::error::PerformanceNoteError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// How long a note lasts. `Segments` marks a note that has already been
/// split into tied pieces (by [`PerformanceNote::split_at_beat`]) and
/// still carries all of its pieces as one logical note, pending
/// quantization downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Length {
    Single(f64),
    Segments(Vec<f64>),
}

impl Length {
    pub fn sum(&self) -> f64 {
        match self {
            Length::Single(x) => *x,
            Length::Segments(xs) => xs.iter().sum(),
        }
    }

    fn scale(&self, ratio: f64) -> Length {
        match self {
            Length::Single(x) => Length::Single(x * ratio),
            Length::Segments(xs) => Length::Segments(xs.iter().map(|x| x * ratio).collect()),
        }
    }
}

/// One member of a [`Pitch::Chord`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChordPitch {
    Number(f64),
    Envelope(ParameterCurve),
}

impl ChordPitch {
    fn average_level(&self) -> f64 {
        match self {
            ChordPitch::Number(n) => *n,
            ChordPitch::Envelope(curve) => curve.average_level(),
        }
    }
}

/// The pitch (or pitches) of a note.
#[derive(Debug, Clone, PartialEq)]
pub enum Pitch {
    /// No pitch at all: a silence occupying the note's duration.
    Rest,
    Number(f64),
    /// A glissando or other continuous pitch trajectory.
    Envelope(ParameterCurve),
    Chord(Vec<ChordPitch>),
}

/// The volume (dynamic) of a note.
#[derive(Debug, Clone, PartialEq)]
pub enum Volume {
    Number(f64),
    Envelope(ParameterCurve),
}

impl Volume {
    fn average_level(&self) -> f64 {
        match self {
            Volume::Number(n) => *n,
            Volume::Envelope(curve) => curve.average_level(),
        }
    }
}

/// The external collaborator that actually produces sound (or whatever
/// downstream rendering a note's pitch/volume/length describe). Left
/// abstract; embedding applications provide the implementation.
pub trait Instrument {
    fn play_note(
        &self,
        pitch: &Pitch,
        volume: &Volume,
        length: &Length,
        properties: &HashMap<String, Value>,
        clock: Option<&Clock>,
        blocking: bool,
    );

    fn play_chord(
        &self,
        pitches: &[ChordPitch],
        volume: &Volume,
        length: &Length,
        properties: &HashMap<String, Value>,
        clock: Option<&Clock>,
        blocking: bool,
    );
}

fn next_source_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A single musical event with a start time (in the beats of whichever
/// clock scheduled it), a length, a pitch, a volume, and arbitrary
/// properties.
///
/// Note-vs-note equality ([`PartialEq`], derived) compares every field, as
/// the JSON round-trip tests rely on. Note-vs-number comparison
/// ([`PartialOrd<f64>`]/[`PartialEq<f64>`], implemented below) looks only
/// at `start_time` — that's what lets a sorted `Vec` of notes be
/// binary-searched by a bare beat position.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceNote {
    pub start_time: f64,
    pub length: Length,
    pub pitch: Pitch,
    pub volume: Volume,
    pub properties: HashMap<String, Value>,
}

impl PerformanceNote {
    pub fn new(start_time: f64, length: Length, pitch: Pitch, volume: Volume, properties: HashMap<String, Value>) -> Self {
        Self {
            start_time,
            length,
            pitch,
            volume,
            properties,
        }
    }

    pub fn length_sum(&self) -> f64 {
        self.length.sum()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.length_sum()
    }

    /// Rescale `length` proportionally so the note ends at `new_end_time`.
    pub fn set_end_time(&mut self, new_end_time: f64) {
        let new_length = new_end_time - self.start_time;
        let ratio = new_length / self.length_sum();
        self.length = self.length.scale(ratio);
    }

    /// Average pitch across the note's duration. A chord averages its
    /// members; a rest contributes `0.0` (there is no pitch to average,
    /// but callers that sort or bucket by average pitch still need a
    /// number).
    pub fn average_pitch(&self) -> f64 {
        match &self.pitch {
            Pitch::Rest => 0.0,
            Pitch::Number(n) => *n,
            Pitch::Envelope(curve) => curve.average_level(),
            Pitch::Chord(chord) => {
                chord.iter().map(ChordPitch::average_level).sum::<f64>() / chord.len() as f64
            }
        }
    }

    pub fn play(&self, instrument: &dyn Instrument, clock: Option<&Clock>, blocking: bool) {
        match &self.pitch {
            Pitch::Chord(chord) => {
                instrument.play_chord(chord, &self.volume, &self.length, &self.properties, clock, blocking)
            }
            other => instrument.play_note(other, &self.volume, &self.length, &self.properties, clock, blocking),
        }
    }

    /// Split this note at `split_beat`. If `split_beat` doesn't fall
    /// strictly inside `(start_time, end_time)`, returns the note
    /// unaltered and no second half. Otherwise returns both halves, with
    /// tie-tracking properties (`_starts_tie`, `_ends_tie`, `_source_id`)
    /// set so the two pieces can be recombined later.
    ///
    /// Volume is not split at the tie point; both halves keep the whole
    /// note's volume curve as-is.
    pub fn split_at_beat(&self, split_beat: f64) -> Result<(PerformanceNote, Option<PerformanceNote>), PerformanceNoteError> {
        if !(self.start_time < split_beat && split_beat < self.end_time()) {
            return Ok((self.clone(), None));
        }

        let local_split = split_beat - self.start_time;
        let (first_length, second_length) = split_length(&self.length, local_split)?;

        let mut first = self.clone();
        let mut second = self.clone();
        first.length = first_length;
        second.start_time = split_beat;
        second.length = second_length;

        if !matches!(self.pitch, Pitch::Rest) {
            match &self.pitch {
                Pitch::Envelope(curve) => {
                    let (start_curve, end_curve) = curve.split_at(local_split);
                    first.pitch = Pitch::Envelope(start_curve);
                    second.pitch = Pitch::Envelope(end_curve);
                }
                Pitch::Chord(chord) => {
                    let mut first_chord = Vec::with_capacity(chord.len());
                    let mut second_chord = Vec::with_capacity(chord.len());
                    for member in chord {
                        match member {
                            ChordPitch::Envelope(curve) => {
                                let (start_curve, end_curve) = curve.split_at(local_split);
                                first_chord.push(ChordPitch::Envelope(start_curve));
                                second_chord.push(ChordPitch::Envelope(end_curve));
                            }
                            ChordPitch::Number(n) => {
                                first_chord.push(ChordPitch::Number(*n));
                                second_chord.push(ChordPitch::Number(*n));
                            }
                        }
                    }
                    first.pitch = Pitch::Chord(first_chord);
                    second.pitch = Pitch::Chord(second_chord);
                }
                Pitch::Number(_) | Pitch::Rest => {}
            }

            first.properties.insert("_starts_tie".to_string(), Value::Bool(true));
            second.properties.insert("_ends_tie".to_string(), Value::Bool(true));

            let source_id = match first.properties.get("_source_id").cloned() {
                Some(existing) => existing,
                None => {
                    let id = Value::from(next_source_id());
                    first.properties.insert("_source_id".to_string(), id.clone());
                    id
                }
            };
            second.properties.insert("_source_id".to_string(), source_id);
        }

        Ok((first, Some(second)))
    }

    pub fn to_json(&self) -> Value {
        let pitch_json = match &self.pitch {
            Pitch::Rest => Value::Null,
            Pitch::Number(n) => serde_json::json!(*n),
            Pitch::Envelope(curve) => curve.to_json(),
            Pitch::Chord(chord) => {
                let mut arr = vec![Value::String("chord".to_string())];
                for member in chord {
                    arr.push(match member {
                        ChordPitch::Number(n) => serde_json::json!(*n),
                        ChordPitch::Envelope(curve) => curve.to_json(),
                    });
                }
                Value::Array(arr)
            }
        };
        let volume_json = match &self.volume {
            Volume::Number(n) => serde_json::json!(*n),
            Volume::Envelope(curve) => curve.to_json(),
        };
        let length_json = match &self.length {
            Length::Single(x) => serde_json::json!(*x),
            Length::Segments(xs) => serde_json::json!(xs),
        };
        serde_json::json!({
            "start_time": self.start_time,
            "length": length_json,
            "pitch": pitch_json,
            "volume": volume_json,
            "properties": self.properties,
        })
    }

    pub fn from_json(value: &Value) -> Result<Self, PerformanceNoteError> {
        let obj = value
            .as_object()
            .ok_or_else(|| PerformanceNoteError::MalformedJson("expected a JSON object".to_string()))?;

        let start_time = obj
            .get("start_time")
            .and_then(Value::as_f64)
            .ok_or_else(|| PerformanceNoteError::MalformedJson("missing start_time".to_string()))?;

        let length = obj
            .get("length")
            .ok_or_else(|| PerformanceNoteError::MalformedJson("missing length".to_string()))
            .and_then(parse_length)?;

        let pitch = obj
            .get("pitch")
            .ok_or_else(|| PerformanceNoteError::MalformedJson("missing pitch".to_string()))
            .and_then(parse_pitch)?;

        let volume = obj
            .get("volume")
            .ok_or_else(|| PerformanceNoteError::MalformedJson("missing volume".to_string()))
            .and_then(parse_volume)?;

        let properties = match obj.get("properties") {
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            None | Some(Value::Null) => HashMap::new(),
            _ => return Err(PerformanceNoteError::MalformedJson("properties must be an object".to_string())),
        };

        Ok(PerformanceNote::new(start_time, length, pitch, volume, properties))
    }
}

/// Compare with a bare beat position, the way a sorted `Vec<PerformanceNote>`
/// is bisected by start time.
impl PartialEq<f64> for PerformanceNote {
    fn eq(&self, other: &f64) -> bool {
        self.start_time == *other
    }
}

impl PartialOrd<f64> for PerformanceNote {
    fn partial_cmp(&self, other: &f64) -> Option<std::cmp::Ordering> {
        self.start_time.partial_cmp(other)
    }
}

impl PartialOrd for PerformanceNote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.start_time.partial_cmp(&other.start_time)
    }
}

fn collapse(parts: Vec<f64>) -> Length {
    if parts.len() == 1 {
        Length::Single(parts[0])
    } else {
        Length::Segments(parts)
    }
}

fn split_length(length: &Length, split_point: f64) -> Result<(Length, Length), PerformanceNoteError> {
    match length {
        Length::Single(total) => {
            if !(0.0 < split_point && split_point < *total) {
                return Err(PerformanceNoteError::SplitPointOutOfRange(split_point));
            }
            Ok((Length::Single(split_point), Length::Single(total - split_point)))
        }
        Length::Segments(segments) => {
            let mut part_sum = 0.0;
            for (i, segment_length) in segments.iter().enumerate() {
                if part_sum + segment_length < split_point {
                    part_sum += segment_length;
                } else if (part_sum + segment_length - split_point).abs() < 1e-9 {
                    let first = collapse(segments[..=i].to_vec());
                    let second = collapse(segments[i + 1..].to_vec());
                    return Ok((first, second));
                } else {
                    let mut first_parts = segments[..i].to_vec();
                    first_parts.push(split_point - part_sum);
                    let mut second_parts = vec![part_sum + segment_length - split_point];
                    second_parts.extend_from_slice(&segments[i + 1..]);
                    return Ok((collapse(first_parts), collapse(second_parts)));
                }
            }
            Err(PerformanceNoteError::SplitPointOutOfRange(split_point))
        }
    }
}

fn parse_length(value: &Value) -> Result<Length, PerformanceNoteError> {
    match value {
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| PerformanceNoteError::MalformedJson("length segment must be a number".to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Length::Segments(parts))
        }
        _ => value
            .as_f64()
            .map(Length::Single)
            .ok_or_else(|| PerformanceNoteError::MalformedJson("length must be a number or array".to_string())),
    }
}

fn parse_pitch(value: &Value) -> Result<Pitch, PerformanceNoteError> {
    match value {
        Value::Null => Ok(Pitch::Rest),
        Value::Number(n) => Ok(Pitch::Number(n.as_f64().unwrap_or(0.0))),
        Value::Array(items) => {
            if items.first().and_then(Value::as_str) == Some("chord") {
                let chord = items[1..].iter().map(parse_chord_pitch).collect::<Result<Vec<_>, _>>()?;
                Ok(Pitch::Chord(chord))
            } else {
                Ok(Pitch::Envelope(ParameterCurve::from_json(value)?))
            }
        }
        _ => Err(PerformanceNoteError::MalformedJson("pitch must be null, a number, or an array".to_string())),
    }
}

fn parse_chord_pitch(value: &Value) -> Result<ChordPitch, PerformanceNoteError> {
    match value {
        Value::Number(n) => Ok(ChordPitch::Number(n.as_f64().unwrap_or(0.0))),
        Value::Array(_) => Ok(ChordPitch::Envelope(ParameterCurve::from_json(value)?)),
        _ => Err(PerformanceNoteError::MalformedJson("chord member must be a number or an envelope array".to_string())),
    }
}

fn parse_volume(value: &Value) -> Result<Volume, PerformanceNoteError> {
    match value {
        Value::Number(n) => Ok(Volume::Number(n.as_f64().unwrap_or(0.0))),
        Value::Array(_) => Ok(Volume::Envelope(ParameterCurve::from_json(value)?)),
        _ => Err(PerformanceNoteError::MalformedJson("volume must be a number or an envelope array".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_note(start: f64, length: f64, pitch: f64) -> PerformanceNote {
        PerformanceNote::new(
            start,
            Length::Single(length),
            Pitch::Number(pitch),
            Volume::Number(1.0),
            HashMap::new(),
        )
    }

    #[test]
    fn end_time_and_length_sum() {
        let note = simple_note(2.0, 3.0, 60.0);
        assert_eq!(note.length_sum(), 3.0);
        assert_eq!(note.end_time(), 5.0);
    }

    #[test]
    fn set_end_time_rescales_segment_lengths_proportionally() {
        let mut note = PerformanceNote::new(
            0.0,
            Length::Segments(vec![1.0, 1.0]),
            Pitch::Number(60.0),
            Volume::Number(1.0),
            HashMap::new(),
        );
        note.set_end_time(4.0);
        assert_eq!(note.length, Length::Segments(vec![2.0, 2.0]));
    }

    #[test]
    fn average_pitch_of_chord_is_mean_of_members() {
        let note = PerformanceNote::new(
            0.0,
            Length::Single(1.0),
            Pitch::Chord(vec![ChordPitch::Number(60.0), ChordPitch::Number(64.0), ChordPitch::Number(67.0)]),
            Volume::Number(1.0),
            HashMap::new(),
        );
        assert!((note.average_pitch() - (60.0 + 64.0 + 67.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn split_outside_range_returns_note_unaltered() {
        let note = simple_note(0.0, 4.0, 60.0);
        let (first, second) = note.clone().split_at_beat(10.0).unwrap();
        assert_eq!(first, note);
        assert!(second.is_none());
    }

    #[test]
    fn split_inside_range_produces_tied_halves() {
        let note = simple_note(0.0, 4.0, 60.0);
        let (first, second) = note.split_at_beat(1.5).unwrap();
        let second = second.expect("split point was in range");
        assert_eq!(first.length, Length::Single(1.5));
        assert_eq!(second.length, Length::Single(2.5));
        assert_eq!(second.start_time, 1.5);
        assert_eq!(first.properties.get("_starts_tie"), Some(&Value::Bool(true)));
        assert_eq!(second.properties.get("_ends_tie"), Some(&Value::Bool(true)));
        assert_eq!(first.properties.get("_source_id"), second.properties.get("_source_id"));
    }

    #[test]
    fn split_of_envelope_pitch_preserves_continuity() {
        let mut curve = ParameterCurve::new(60.0);
        curve.append_segment(72.0, 4.0, 0.0);
        let note = PerformanceNote::new(0.0, Length::Single(4.0), Pitch::Envelope(curve), Volume::Number(1.0), HashMap::new());
        let (first, second) = note.split_at_beat(2.0).unwrap();
        let second = second.unwrap();
        let Pitch::Envelope(first_curve) = &first.pitch else { panic!("expected envelope") };
        let Pitch::Envelope(second_curve) = &second.pitch else { panic!("expected envelope") };
        assert!((first_curve.end_level() - second_curve.value_at(0.0)).abs() < 1e-9);
    }

    #[test]
    fn rest_split_does_not_set_tie_properties() {
        let note = PerformanceNote::new(0.0, Length::Single(4.0), Pitch::Rest, Volume::Number(1.0), HashMap::new());
        let (first, second) = note.split_at_beat(1.0).unwrap();
        let second = second.unwrap();
        assert!(!first.properties.contains_key("_starts_tie"));
        assert!(!second.properties.contains_key("_ends_tie"));
    }

    #[test]
    fn ordering_compares_by_start_time_only() {
        let a = simple_note(1.0, 1.0, 60.0);
        let b = simple_note(2.0, 1.0, 72.0);
        assert!(a < b);
        assert!(a == 1.0);
        assert!(a < 2.0);
    }

    #[test]
    fn json_round_trip_plain_note() {
        let note = simple_note(0.5, 1.0, 60.0);
        let json = note.to_json();
        let back = PerformanceNote::from_json(&json).unwrap();
        assert_eq!(note, back);
    }

    #[test]
    fn json_round_trip_chord_with_envelope_member() {
        let mut curve = ParameterCurve::new(60.0);
        curve.append_segment(64.0, 1.0, 0.0);
        let note = PerformanceNote::new(
            0.0,
            Length::Single(1.0),
            Pitch::Chord(vec![ChordPitch::Number(48.0), ChordPitch::Envelope(curve)]),
            Volume::Number(0.8),
            HashMap::new(),
        );
        let json = note.to_json();
        assert_eq!(json["pitch"][0], Value::String("chord".to_string()));
        let back = PerformanceNote::from_json(&json).unwrap();
        assert_eq!(note, back);
    }

    #[test]
    fn json_rest_pitch_round_trips_as_null() {
        let note = PerformanceNote::new(0.0, Length::Single(1.0), Pitch::Rest, Volume::Number(1.0), HashMap::new());
        let json = note.to_json();
        assert_eq!(json["pitch"], Value::Null);
        let back = PerformanceNote::from_json(&json).unwrap();
        assert_eq!(back.pitch, Pitch::Rest);
    }
}
