//! # A hierarchical, cooperatively-scheduled musical clock
//!
//! This crate provides a tree of [`Clock`](clock::Clock)s: each node keeps
//! its own tempo (a piecewise curve of beat-length, not just a constant
//! rate), and child clocks are forked from a parent to run concurrently
//! while staying exactly synchronized with it. Only the root of a tree (the
//! "master") ever performs a real wall-clock sleep; every other clock's
//! `wait` is a rendezvous with its parent.
//!
//! ## Project Status
//!
//! Core functionality — the clock tree, tempo curves, and precision sleep —
//! is implemented and tested. This is a from-scratch rework of a timing
//! library that originally drove real-time audio synthesis directly; that
//! synthesis engine has been superseded by the clock/tempo/performance-note
//! system described below (see `DESIGN.md` for what was kept and why).
//!
//! ## Core Features
//!
//! - **Hierarchical clocks**: fork child clocks that inherit a parent's
//!   notion of time while running their own independent tempo.
//! - **Piecewise tempo curves**: linear or exponential transitions between
//!   tempi, with exact closed-form integration (no numerical stepping).
//! - **Cooperative rendezvous scheduling**: a parent clock never advances
//!   past a point a child needs to wake up at.
//! - **Precision sleep**: sub-millisecond wall-clock accuracy via recursive
//!   halving plus a short busy-wait tail.
//! - **Bounded worker pool**: forked clock bodies run on a capacity-limited
//!   pool of OS threads, falling back to a detached thread (with a warning)
//!   under pool exhaustion rather than refusing to run at all.
//! - **Performance notes**: a pitch/volume/length/properties value type with
//!   chord support, glissando envelopes, and beat-position splitting for
//!   tied notes.
//!
//! ## Quick Start
//!
//! ```rust
//! use hierarchical_clock::clock::Clock;
//! use hierarchical_clock::config::ClockConfig;
//!
//! let master = Clock::new_master(Some("master"), &ClockConfig::default());
//! master.set_tempo(120.0);
//!
//! let child = master.fork(Some("voice"), |child| {
//!     child.wait(1.0); // one beat, at whatever tempo `child` has
//! });
//! master.wait_for_children_to_finish();
//! # let _ = child;
//! ```
//!
//! ## Module Organization
//!
//! - [`clock`]: the `Clock` tree, fork/wait rendezvous protocol, and the
//!   bounded worker pool (`clock::pool`) forked bodies run on.
//! - [`tempo_map`]: per-clock mapping between beats and parent-time.
//! - [`curve`]: the piecewise parameter curve tempo maps (and performance
//!   note pitch/volume envelopes) are built from.
//! - [`sleep`]: the two-phase precision sleep the master clock uses.
//! - [`performance_note`]: the scheduled-event value type and the
//!   `Instrument` trait that renders it.
//! - [`config`]: master-clock configuration, with TOML round-trip helpers.
//! - [`error`]: crate error types.

pub mod clock;
pub mod config;
pub mod curve;
pub mod error;
pub mod performance_note;
pub mod sleep;
pub mod tempo_map;
