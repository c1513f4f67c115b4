//! Piecewise parameter curve: the envelope primitive consumed by the tempo
//! map (and, in principle, by pitch/volume trajectories on a
//! [`PerformanceNote`](crate::performance_note::PerformanceNote)).
//!
//! This module is a from-scratch, minimal stand-in for the "envelope math
//! library" the core spec treats as an external collaborator (see
//! `SPEC_FULL.md` §D). It implements exactly the operations the rest of the
//! crate needs: point evaluation, exact interval integration, segment
//! append/truncate, splitting, and JSON round-trip.

use crate::error::CurveError;
use std::f64::consts::E;

/// Shape of a single segment's transition from its start level to its end
/// level. `0.0` is linear; nonzero values bend the curve exponentially,
/// the same family SCAMP-style tempo curves use (see `clock.py`'s closing
/// comment: linear change in beat-length is the same shape as exponential
/// interpolation of tempo).
pub type Curvature = f64;

/// One segment of a [`ParameterCurve`]: a transition from `origin_level`
/// (the level the curve was at when this segment was appended) to
/// `end_level`, with the given `curvature`.
///
/// The exponential family `curvature != 0` uses isn't closed under naive
/// domain rescaling: restricting it to a sub-range and re-normalizing `u`
/// against the sub-range's own duration produces a different shape than
/// truly restricting the original function (see `remove_segments_after`/
/// `split_at`). So a segment also remembers `full_duration` (the original,
/// unsliced duration the shape's `u = t / full_duration` is measured
/// against) and `domain_start` (how far into that original `[0, 1]` domain
/// this piece begins) — both `0.0`/`duration` for a freshly appended
/// segment, and only diverging once truncation or splitting slices off
/// part of it. `end_level` always names the *original* segment's target
/// (its value as `u -> 1`), not necessarily this piece's own endpoint —
/// [`ParameterCurve::end_level`] computes the latter via [`Segment::value_at`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    origin_level: f64,
    pub end_level: f64,
    pub duration: f64,
    pub curvature: Curvature,
    full_duration: f64,
    domain_start: f64,
}

impl Segment {
    /// A freshly appended segment: unsliced, so its own duration is the
    /// full domain and it starts at `u = 0`.
    fn new(origin_level: f64, end_level: f64, duration: f64, curvature: Curvature) -> Self {
        Self {
            origin_level,
            end_level,
            duration,
            curvature,
            full_duration: duration,
            domain_start: 0.0,
        }
    }

    /// Value of the *original* segment's shape at absolute position `u`
    /// within its `[0, 1]` domain.
    fn level_at_u(&self, u: f64) -> f64 {
        let delta = self.end_level - self.origin_level;
        if self.curvature == 0.0 {
            self.origin_level + delta * u
        } else {
            let c = self.curvature;
            self.origin_level + delta * (1.0 - E.powf(-c * u)) / (1.0 - E.powf(-c))
        }
    }

    /// Value at local position `t` within `[0, self.duration]` of this
    /// (possibly truncated/split) piece.
    fn value_at(&self, t: f64) -> f64 {
        if self.duration <= 0.0 || self.full_duration <= 0.0 {
            return self.end_level;
        }
        let t = t.clamp(0.0, self.duration);
        self.level_at_u(self.domain_start + t / self.full_duration)
    }

    /// Exact definite integral of this piece's value between local
    /// positions `p` and `q` (both clamped into `[0, duration]`).
    fn integrate(&self, p: f64, q: f64) -> f64 {
        if self.duration <= 0.0 || self.full_duration <= 0.0 || p >= q {
            return 0.0;
        }
        let p = p.clamp(0.0, self.duration);
        let q = q.clamp(0.0, self.duration);
        let d = self.full_duration;
        let u1 = self.domain_start + p / d;
        let u2 = self.domain_start + q / d;
        let delta = self.end_level - self.origin_level;
        if self.curvature == 0.0 {
            // origin*(u2-u1) + delta*(u2^2-u1^2)/2, scaled back up by d
            // (dt = d*du, so the integral over t picks up a factor of d).
            d * (self.origin_level * (u2 - u1) + delta * (u2 * u2 - u1 * u1) / 2.0)
        } else {
            let c = self.curvature;
            let denom = 1.0 - E.powf(-c);
            let shape_integral = (u2 - u1) + (E.powf(-c * u2) - E.powf(-c * u1)) / c;
            d * (self.origin_level * (u2 - u1) + delta / denom * shape_integral)
        }
    }

    /// Truncate this piece to only its first `local` (beats/seconds) of
    /// elapsed time, keeping it a faithful restriction of the same
    /// original shape rather than re-normalizing `u` against the new,
    /// shorter duration.
    fn truncated_to(&self, local: f64) -> Segment {
        let mut truncated = *self;
        truncated.duration = local;
        truncated
    }

    /// The remainder of this piece starting `consumed` (beats/seconds)
    /// into it — the right-hand half produced by [`ParameterCurve::split_at`].
    fn remainder_after(&self, consumed: f64) -> Segment {
        let mut remainder = *self;
        remainder.duration = self.duration - consumed;
        remainder.domain_start = self.domain_start + consumed / self.full_duration;
        remainder
    }
}

/// A piecewise curve, defined on `[0, length()]`, holding the envelope's
/// starting level plus an ordered sequence of [`Segment`]s.
///
/// `ParameterCurve` is deliberately minimal: it supports exactly the
/// operations the tempo map and performance-note splitting need. It does
/// not attempt to be a general-purpose envelope library.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCurve {
    initial_level: f64,
    segments: Vec<Segment>,
}

impl ParameterCurve {
    /// A curve that starts (and, until a segment is appended, stays) at
    /// `initial_level`.
    pub fn new(initial_level: f64) -> Self {
        Self {
            initial_level,
            segments: Vec::new(),
        }
    }

    /// Total duration over which this curve is explicitly defined.
    pub fn length(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// The level at the end of the last segment, or the initial level if
    /// no segments have been appended yet. This is the value actually
    /// reached by the last segment's own (possibly truncated) duration,
    /// not necessarily the asymptotic target it was heading toward.
    pub fn end_level(&self) -> f64 {
        self.segments.last().map_or(self.initial_level, |s| s.value_at(s.duration))
    }

    /// Value of the curve at position `x`. Positions before `0` clamp to
    /// the initial level; positions beyond `length()` clamp to
    /// `end_level()` (the curve holds its last value indefinitely).
    ///
    /// At a breakpoint shared by more than one segment (always the case
    /// for a zero-duration segment, which occupies no interval of its
    /// own), the *last*-appended segment covering `x` wins. This is what
    /// makes an instantaneous step (`append_segment(level, 0.0, _)`)
    /// observable at the very beat it was set on: spec.md §4.2 requires
    /// `beat_length()`/`rate()`/`tempo()` to read the new value
    /// immediately, not the value of whatever was current before the
    /// step.
    pub fn value_at(&self, x: f64) -> f64 {
        if self.segments.is_empty() {
            return self.initial_level;
        }
        let mut pos = 0.0;
        let mut found = None;
        for seg in &self.segments {
            let seg_end = pos + seg.duration;
            if x >= pos && x <= seg_end {
                found = Some(seg.value_at(x - pos));
            }
            pos = seg_end;
        }
        found.unwrap_or_else(|| {
            if x < 0.0 {
                self.initial_level
            } else {
                self.end_level()
            }
        })
    }

    /// Exact definite integral of the curve's value between `a` and `b`
    /// (`a` may be greater than `b`, in which case the result is negated).
    pub fn integrate_interval(&self, a: f64, b: f64) -> f64 {
        if a > b {
            return -self.integrate_interval(b, a);
        }
        let len = self.length();
        let mut total = 0.0;
        let mut pos = 0.0;
        for seg in &self.segments {
            let seg_start = pos;
            let seg_end = pos + seg.duration;
            let lo = a.max(seg_start);
            let hi = b.min(seg_end);
            if lo < hi {
                total += seg.integrate(lo - seg_start, hi - seg_start);
            }
            pos = seg_end;
        }
        // Anything past the last defined segment holds at end_level.
        if b > len {
            let lo = a.max(len);
            total += (b - lo) * self.end_level();
        }
        total
    }

    /// Append a new segment going from the current [`end_level`](Self::end_level)
    /// to `level` over `duration`, with the given `curvature`. A
    /// non-positive `duration` is treated as an instantaneous step
    /// (consistent with the scalar setter semantics described in
    /// spec.md §7).
    pub fn append_segment(&mut self, level: f64, duration: f64, curvature: Curvature) {
        let duration = duration.max(0.0);
        let origin_level = self.end_level();
        self.segments.push(Segment::new(origin_level, level, duration, curvature));
    }

    /// Remove any segment (or part of a segment) extending beyond `x`,
    /// truncating a segment that straddles `x` to end exactly at `x`
    /// (holding the value it had reached). The truncated segment keeps
    /// the original shape's full domain so its held value stays a
    /// faithful restriction rather than a re-normalized curve (see
    /// [`Segment::truncated_to`]).
    pub fn remove_segments_after(&mut self, x: f64) {
        if x <= 0.0 {
            self.segments.clear();
            return;
        }
        let mut pos = 0.0;
        let mut keep = Vec::new();
        for seg in &self.segments {
            let seg_end = pos + seg.duration;
            if seg_end <= x {
                keep.push(*seg);
                pos = seg_end;
                continue;
            }
            if pos < x {
                keep.push(seg.truncated_to(x - pos));
            }
            break;
        }
        self.segments = keep;
    }

    /// Split this curve at position `x` into two curves: the first
    /// covering `[0, x]`, the second covering `[0, length() - x]` (with
    /// its own local time axis, starting at the value the original curve
    /// had at `x`). A segment straddling `x` keeps its original shape on
    /// both sides — the right half is the true remainder of that shape,
    /// not a freshly re-normalized one (see [`Segment::remainder_after`]).
    pub fn split_at(&self, x: f64) -> (ParameterCurve, ParameterCurve) {
        let mut left = self.clone();
        left.remove_segments_after(x);

        let mut right = ParameterCurve::new(self.value_at(x));
        let mut pos = 0.0;
        for seg in &self.segments {
            let seg_end = pos + seg.duration;
            if seg_end <= x {
                pos = seg_end;
                continue;
            }
            if pos >= x {
                right.segments.push(*seg);
            } else {
                // seg straddles the split point: only the remainder survives
                right.segments.push(seg.remainder_after(x - pos));
            }
            pos = seg_end;
        }
        (left, right)
    }

    /// Time-weighted average level across the curve's defined length.
    /// Returns the initial level for a curve with no explicit duration.
    pub fn average_level(&self) -> f64 {
        let len = self.length();
        if len <= 0.0 {
            return self.initial_level;
        }
        self.integrate_interval(0.0, len) / len
    }

    /// Serialize as a JSON array `[initial_level, [end_level, duration,
    /// curvature], ...]`. The array shape (as opposed to a scalar number)
    /// is what lets [`PerformanceNote::from_json`](crate::performance_note::PerformanceNote::from_json)
    /// tell an envelope apart from a plain numeric pitch or volume.
    pub fn to_json(&self) -> serde_json::Value {
        let mut segments: Vec<serde_json::Value> = vec![serde_json::json!(self.initial_level)];
        for seg in &self.segments {
            segments.push(serde_json::json!([seg.end_level, seg.duration, seg.curvature]));
        }
        serde_json::Value::Array(segments)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, CurveError> {
        let items = value.as_array().ok_or(CurveError::MalformedJson)?;
        let (initial, rest) = items.split_first().ok_or(CurveError::MalformedJson)?;
        let initial_level = initial.as_f64().ok_or(CurveError::MalformedJson)?;
        let mut curve = ParameterCurve::new(initial_level);
        for entry in rest {
            let triple = entry.as_array().ok_or(CurveError::MalformedJson)?;
            let [end_level, duration, curvature] = triple
                .iter()
                .map(|v| v.as_f64().ok_or(CurveError::MalformedJson))
                .collect::<Result<Vec<_>, _>>()?
                .try_into()
                .map_err(|_| CurveError::MalformedJson)?;
            curve.append_segment(end_level, duration, curvature);
        }
        Ok(curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_segment_value_and_integral() {
        let mut c = ParameterCurve::new(1.0);
        c.append_segment(2.0, 4.0, 0.0);
        assert_eq!(c.value_at(0.0), 1.0);
        assert_eq!(c.value_at(2.0), 1.5);
        assert_eq!(c.value_at(4.0), 2.0);
        // Average of a linear ramp from 1 to 2 over 4 beats is 1.5.
        assert!((c.average_level() - 1.5).abs() < 1e-9);
        assert!((c.integrate_interval(0.0, 4.0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn constant_tempo_linearity() {
        // get_wait_time(b) = b / rate for a constant beat_length curve.
        let c = ParameterCurve::new(0.5); // beat_length = 0.5s/beat => rate = 2
        assert!((c.integrate_interval(0.0, 10.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn holds_last_value_past_defined_length() {
        let mut c = ParameterCurve::new(1.0);
        c.append_segment(3.0, 2.0, 0.0);
        assert_eq!(c.value_at(100.0), 3.0);
        assert!((c.integrate_interval(2.0, 4.0) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn instantaneous_step_is_observable_at_its_own_breakpoint() {
        // append_segment(level, 0.0, _) is the "set an instantaneous step"
        // case (spec.md §4.2): reading the curve right at the beat it was
        // set on must see the new level, not the old one.
        let mut c = ParameterCurve::new(1.0);
        c.append_segment(2.0, 0.0, 0.0);
        assert_eq!(c.value_at(0.0), 2.0);

        // Same, after some elapsed duration: the step at x=4 must win over
        // the ramp segment that ends there.
        let mut c = ParameterCurve::new(1.0);
        c.append_segment(2.0, 4.0, 0.0);
        c.append_segment(5.0, 0.0, 0.0);
        assert_eq!(c.value_at(4.0), 5.0);

        // A second instantaneous step at the same breakpoint overrides the
        // first.
        c.append_segment(9.0, 0.0, 0.0);
        assert_eq!(c.value_at(4.0), 9.0);
    }

    #[test]
    fn remove_segments_after_truncates_mid_segment() {
        let mut c = ParameterCurve::new(0.0);
        c.append_segment(10.0, 10.0, 0.0);
        c.remove_segments_after(5.0);
        assert_eq!(c.length(), 5.0);
        assert!((c.end_level() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn split_at_preserves_continuity() {
        let mut c = ParameterCurve::new(60.0);
        c.append_segment(72.0, 4.0, 0.0);
        let (left, right) = c.split_at(2.0);
        assert!((left.end_level() - 66.0).abs() < 1e-9);
        assert!((right.value_at(0.0) - 66.0).abs() < 1e-9);
        assert!((right.value_at(2.0) - 72.0).abs() < 1e-9);
    }

    #[test]
    fn exponential_curvature_monotonic() {
        let mut c = ParameterCurve::new(0.0);
        c.append_segment(1.0, 1.0, 4.0);
        let a = c.value_at(0.25);
        let b = c.value_at(0.75);
        assert!(a < b);
        assert!(c.value_at(0.0) == 0.0);
        assert!((c.value_at(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn json_round_trip() {
        let mut c = ParameterCurve::new(60.0);
        c.append_segment(120.0, 4.0, 2.0);
        let json = c.to_json();
        let back = ParameterCurve::from_json(&json).unwrap();
        assert_eq!(c, back);
    }
}
