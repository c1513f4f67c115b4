//! Tempo map: a [`ParameterCurve`] of beat-length, tracking cumulative
//! beats and elapsed parent-time for a single clock.
//!
//! This is the Rust counterpart of `clock.py`'s `TempoMap`, which built the
//! same idea on top of a `ParameterCurve` subclass. Composition is used
//! here instead of inheritance, which is the more idiomatic shape for this
//! kind of "curve plus a couple of accumulators" type.

use crate::curve::{Curvature, ParameterCurve};

/// Piecewise curve of beat-length (parent-seconds per beat) plus the
/// running totals needed to convert beat intervals into parent-time
/// intervals and back.
///
/// Invariant: `self.t == self.curve.integrate_interval(0.0, self.beats)`
/// at every point where no segment has been mutated since the last
/// `advance` (spec.md §8, testable property 1).
#[derive(Debug, Clone)]
pub struct TempoMap {
    curve: ParameterCurve,
    beats: f64,
    t: f64,
}

impl TempoMap {
    /// A tempo map starting at a constant `starting_rate` (beats per
    /// parent-second).
    pub fn new(starting_rate: f64) -> Self {
        Self {
            curve: ParameterCurve::new(1.0 / starting_rate),
            beats: 0.0,
            t: 0.0,
        }
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn beats(&self) -> f64 {
        self.beats
    }

    /// Current beat-length: parent-seconds per beat of this clock, right now.
    pub fn beat_length(&self) -> f64 {
        self.curve.value_at(self.beats)
    }

    /// Set an instantaneous beat-length step, taking effect from now on.
    pub fn set_beat_length(&mut self, beat_length: f64) {
        self.prepare_for_new_segment();
        self.curve.append_segment(beat_length, 0.0, 0.0);
    }

    /// "Beats per parent-second".
    pub fn rate(&self) -> f64 {
        1.0 / self.beat_length()
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.set_beat_length(1.0 / rate);
    }

    /// "Beats per minute", assuming parent-time is measured in seconds.
    pub fn tempo(&self) -> f64 {
        self.rate() * 60.0
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        self.set_rate(tempo / 60.0);
    }

    /// Schedule a transition of beat-length to `target` over
    /// `transition_beats` beats of this clock's own time, with the given
    /// curvature. A non-positive `transition_beats` is an instantaneous
    /// step, same as [`set_beat_length`](Self::set_beat_length).
    pub fn set_beat_length_target(&mut self, target: f64, transition_beats: f64, curvature: Curvature) {
        self.prepare_for_new_segment();
        self.curve.append_segment(target, transition_beats, curvature);
    }

    pub fn set_rate_target(&mut self, target_rate: f64, transition_beats: f64, curvature: Curvature) {
        self.set_beat_length_target(1.0 / target_rate, transition_beats, curvature);
    }

    pub fn set_tempo_target(&mut self, target_tempo: f64, transition_beats: f64, curvature: Curvature) {
        self.set_beat_length_target(60.0 / target_tempo, transition_beats, curvature);
    }

    /// Bring the curve up to date at the current beat position: drop any
    /// segment extending into the future, and if the curve's defined
    /// length falls short of `beats()`, extend its last level forward to
    /// meet it. Tempo changes set while a clock has been resting at a
    /// stable rate must take effect starting now, not retroactively.
    fn prepare_for_new_segment(&mut self) {
        self.curve.remove_segments_after(self.beats);
        if self.curve.length() < self.beats {
            let gap = self.beats - self.curve.length();
            let level = self.curve.end_level();
            self.curve.append_segment(level, gap, 0.0);
        }
    }

    /// Parent-time it would take to advance `beats` beats from here,
    /// given the current (and any already-scheduled future) tempo curve.
    pub fn get_wait_time(&self, beats: f64) -> f64 {
        self.curve.integrate_interval(self.beats, self.beats + beats)
    }

    /// Advance the map by `beats` beats, and by `wait_time` parent-seconds
    /// (computed via [`get_wait_time`](Self::get_wait_time) if not given
    /// explicitly — callers that already computed it, e.g. the clock's
    /// wait loop, pass it through to avoid integrating twice).
    pub fn advance(&mut self, beats: f64, wait_time: Option<f64>) {
        let wait_time = wait_time.unwrap_or_else(|| self.get_wait_time(beats));
        self.beats += beats;
        self.t += wait_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_tempo_wait_time_is_exact() {
        let map = TempoMap::new(2.0); // rate = 2 beats/sec
        assert!((map.get_wait_time(10.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn advance_accumulates_beats_and_time() {
        let mut map = TempoMap::new(1.0);
        map.advance(1.0, None);
        map.advance(1.0, None);
        assert_eq!(map.beats(), 2.0);
        assert!((map.time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_ramp_matches_closed_form_integral() {
        // 60bpm -> 120bpm over 10 beats: the curve being ramped is
        // beat_length itself (1.0 -> 0.5 s/beat), linearly, not the rate —
        // clock.py's own TODO says as much ("default curvature be linear
        // change in beat_length"). A linear ramp in beat_length from 1.0
        // to 0.5 over 10 beats has average beat_length (1.0+0.5)/2 = 0.75,
        // so the wait time is 10 * 0.75 = 7.5s.
        let mut map = TempoMap::new(1.0);
        map.set_tempo_target(120.0, 10.0, 0.0);
        let wait = map.get_wait_time(10.0);
        let expected = 7.5;
        assert!((wait - expected).abs() < 1e-6, "wait={wait} expected={expected}");
    }

    #[test]
    fn beats_is_monotonic_non_decreasing() {
        let mut map = TempoMap::new(1.0);
        let mut last = map.beats();
        for _ in 0..5 {
            map.advance(0.3, None);
            assert!(map.beats() >= last);
            last = map.beats();
        }
    }

    #[test]
    fn instantaneous_step_does_not_retroactively_change_past() {
        let mut map = TempoMap::new(1.0);
        map.advance(2.0, None);
        map.set_beat_length(2.0);
        // Past beats/time are untouched; only future wait_time changes.
        assert_eq!(map.beats(), 2.0);
        assert!((map.get_wait_time(1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn set_tempo_target_with_nonpositive_transition_is_instantaneous() {
        let mut map = TempoMap::new(1.0);
        map.set_tempo_target(120.0, 0.0, 0.0);
        assert!((map.beat_length() - 0.5).abs() < 1e-9);
    }
}
