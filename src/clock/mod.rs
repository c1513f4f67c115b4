//! The hierarchical clock tree: [`Clock`], the cooperative wait/fork
//! protocol, and the [`TimingPolicy`] that governs how the master clock
//! reconciles musical time with wall time.
//!
//! Ported from `clock.py`'s `Clock`/`WakeUpCall`. The tree shape and the
//! rendezvous protocol (spec.md §4.3, §5) are unchanged; where the
//! original relies on a GIL-protected `SortedListWithKey` and a bare
//! `threading.Event`, this keeps the same algorithm but behind explicit
//! `Mutex`es and a `Condvar`-based [`signal::WaitSignal`].

pub mod pool;
mod signal;

use crate::config::ClockConfig;
use crate::sleep::PrecisionSleep;
use crate::tempo_map::TempoMap;
use pool::WorkerPool;
use serde::{Deserialize, Serialize};
use signal::WaitSignal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Governs how the master clock reconciles musical time with wall time
/// when processing between waits takes nonzero time (spec.md §4.3,
/// `wait_in_parent`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingPolicy {
    /// Count each wait from when the previous wait finished. Faithful to
    /// the requested inter-wait gap; heavy processing makes the clock
    /// fall behind real time and it never catches up.
    Relative,
    /// Count from the clock's start time. Heavy processing on one wait
    /// is absorbed by shortening the next one, keeping total elapsed time
    /// faithful to the sum of requested waits at the cost of individual
    /// gap accuracy.
    Absolute,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        TimingPolicy::Relative
    }
}

/// A scheduled future wake-up for a child clock, queued on its parent.
/// Ordered by `parent_time` ascending; ties broken by insertion order via
/// `seq` (spec.md §5: "ties are broken by insertion order").
struct WakeUp {
    parent_time: f64,
    seq: u64,
    clock: Clock,
}

struct Shared {
    children: Vec<Clock>,
    queue: Vec<WakeUp>,
    last_sleep_time: Instant,
}

struct ClockInner {
    name: Option<String>,
    parent: Option<Clock>,
    parent_offset: f64,
    tempo_map: Mutex<TempoMap>,
    shared: Mutex<Shared>,
    ready_and_waiting: AtomicBool,
    signal: WaitSignal,
    /// `Some` only on the master; children submit through `master().pool()`.
    pool: Option<WorkerPool>,
    timing_policy: TimingPolicy,
    use_precise_timing: AtomicBool,
    sleeper: PrecisionSleep,
    start_time: Instant,
    /// Counter for assigning `seq` to wake-ups registered in *this*
    /// clock's queue (i.e. owned by this clock, incremented by whichever
    /// child registers next).
    queue_seq: AtomicU64,
    log_processing_time: AtomicBool,
}

/// A node in the hierarchical clock tree.
///
/// Cheaply `Clone` (an `Arc` handle); clones refer to the same clock.
/// Exactly one clock in a tree has no parent — the master, the sole
/// owner of a [`WorkerPool`] and the only one that ever really sleeps
/// (spec.md §3).
#[derive(Clone)]
pub struct Clock(Arc<ClockInner>);

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("name", &self.0.name)
            .field("is_master", &self.is_master())
            .field("beats", &self.beats())
            .finish()
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Clock {}

impl Clock {
    /// Create the root of a new clock tree.
    pub fn new_master(name: Option<&str>, config: &ClockConfig) -> Clock {
        let now = Instant::now();
        Clock(Arc::new(ClockInner {
            name: name.map(str::to_string),
            parent: None,
            parent_offset: 0.0,
            tempo_map: Mutex::new(TempoMap::new(config.starting_rate)),
            shared: Mutex::new(Shared {
                children: Vec::new(),
                queue: Vec::new(),
                last_sleep_time: now,
            }),
            ready_and_waiting: AtomicBool::new(false),
            signal: WaitSignal::new(),
            pool: Some(WorkerPool::new(config.pool_size)),
            timing_policy: config.timing_policy,
            use_precise_timing: AtomicBool::new(config.use_precise_timing),
            sleeper: PrecisionSleep::new(config.busy_wait_threshold()),
            start_time: now,
            queue_seq: AtomicU64::new(0),
            log_processing_time: AtomicBool::new(false),
        }))
    }

    fn new_child(parent: &Clock, name: Option<String>) -> Clock {
        let now = Instant::now();
        Clock(Arc::new(ClockInner {
            name,
            parent: Some(parent.clone()),
            parent_offset: parent.time(),
            tempo_map: Mutex::new(TempoMap::new(1.0)),
            shared: Mutex::new(Shared {
                children: Vec::new(),
                queue: Vec::new(),
                last_sleep_time: now,
            }),
            ready_and_waiting: AtomicBool::new(false),
            signal: WaitSignal::new(),
            pool: None,
            // Not meaningful on a non-master clock; only used if this
            // clock is later promoted conceptually by being queried
            // directly, which never happens in the wait protocol.
            timing_policy: TimingPolicy::Relative,
            use_precise_timing: AtomicBool::new(true),
            sleeper: PrecisionSleep::default(),
            start_time: now,
            queue_seq: AtomicU64::new(0),
            log_processing_time: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    fn display_name(&self) -> &str {
        self.0.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn is_master(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Walk up to the root of the tree.
    pub fn master(&self) -> Clock {
        match &self.0.parent {
            Some(parent) => parent.master(),
            None => self.clone(),
        }
    }

    pub fn parent(&self) -> Option<&Clock> {
        self.0.parent.as_ref()
    }

    // --- Tempo map forwarding (spec.md §4.3 "Tempo setters") -----------

    pub fn time(&self) -> f64 {
        self.0.tempo_map.lock().unwrap().time()
    }

    pub fn beats(&self) -> f64 {
        self.0.tempo_map.lock().unwrap().beats()
    }

    pub fn beat_length(&self) -> f64 {
        self.0.tempo_map.lock().unwrap().beat_length()
    }

    pub fn set_beat_length(&self, beat_length: f64) {
        self.0.tempo_map.lock().unwrap().set_beat_length(beat_length);
    }

    pub fn rate(&self) -> f64 {
        self.0.tempo_map.lock().unwrap().rate()
    }

    pub fn set_rate(&self, rate: f64) {
        self.0.tempo_map.lock().unwrap().set_rate(rate);
    }

    pub fn tempo(&self) -> f64 {
        self.0.tempo_map.lock().unwrap().tempo()
    }

    pub fn set_tempo(&self, tempo: f64) {
        self.0.tempo_map.lock().unwrap().set_tempo(tempo);
    }

    pub fn set_beat_length_target(&self, target: f64, transition_beats: f64, curvature: f64) {
        self.0
            .tempo_map
            .lock()
            .unwrap()
            .set_beat_length_target(target, transition_beats, curvature);
    }

    pub fn set_rate_target(&self, target_rate: f64, transition_beats: f64, curvature: f64) {
        self.0
            .tempo_map
            .lock()
            .unwrap()
            .set_rate_target(target_rate, transition_beats, curvature);
    }

    pub fn set_tempo_target(&self, target_tempo: f64, transition_beats: f64, curvature: f64) {
        self.0
            .tempo_map
            .lock()
            .unwrap()
            .set_tempo_target(target_tempo, transition_beats, curvature);
    }

    /// Product of `rate` from this clock up to (and including) the root.
    pub fn absolute_rate(&self) -> f64 {
        match &self.0.parent {
            Some(parent) => self.rate() * parent.absolute_rate(),
            None => self.rate(),
        }
    }

    pub fn time_in_parent(&self) -> f64 {
        self.time() + self.0.parent_offset
    }

    fn master_offset(&self) -> f64 {
        match &self.0.parent {
            Some(parent) => self.0.parent_offset + parent.master_offset(),
            None => 0.0,
        }
    }

    pub fn time_in_master(&self) -> f64 {
        self.time() + self.master_offset()
    }

    // --- Processing-time diagnostics (ported from clock.py) ------------

    pub fn log_processing_time(&self) {
        if !log::log_enabled!(log::Level::Info) {
            log::warn!(
                "log_processing_time enabled on clock '{}', but the `info` log level is not \
                 enabled; no processing-time messages will be emitted.",
                self.display_name()
            );
        }
        self.0.log_processing_time.store(true, Ordering::Relaxed);
    }

    pub fn stop_logging_processing_time(&self) {
        self.0.log_processing_time.store(false, Ordering::Relaxed);
    }

    // --- Fork / rendezvous / wait ---------------------------------------

    fn is_ready_and_waiting(&self) -> bool {
        self.0.ready_and_waiting.load(Ordering::Acquire)
    }

    fn set_ready_and_waiting(&self, value: bool) {
        self.0.ready_and_waiting.store(value, Ordering::Release);
    }

    fn master_pool(&self) -> WorkerPool {
        self.master()
            .0
            .pool
            .clone()
            .expect("master clock always owns a worker pool")
    }

    /// Create a child clock and schedule `body(child)` on the master's
    /// worker pool. Returns the child synchronously; the body runs
    /// concurrently. On return (including via panic) the child is removed
    /// from `children`.
    pub fn fork<F>(&self, name: Option<&str>, body: F) -> Clock
    where
        F: FnOnce(Clock) + Send + 'static,
    {
        let child = Clock::new_child(self, name.map(str::to_string));
        {
            let mut shared = self.0.shared.lock().unwrap();
            shared.children.push(child.clone());
        }
        let task_child = child.clone();
        let parent = self.clone();
        self.master_pool().submit(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                body(task_child.clone());
            }));
            parent.remove_child(&task_child);
            if let Err(payload) = result {
                std::panic::resume_unwind(payload);
            }
        });
        child
    }

    /// Schedule a task on the worker pool without creating a clock
    /// (fire-and-forget; for non-musical side work).
    pub fn fork_unsynchronized<F>(&self, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.master_pool().submit(body);
    }

    fn remove_child(&self, child: &Clock) {
        let mut shared = self.0.shared.lock().unwrap();
        shared.children.retain(|c| c != child);
        // A dying child must not leave a pending wake-up behind for us to
        // wait on forever (spec.md §7).
        shared.queue.retain(|w| &w.clock != child);
    }

    fn register_wakeup(&self, parent_time: f64, child: Clock) {
        let seq = self.0.queue_seq.fetch_add(1, Ordering::SeqCst);
        let mut shared = self.0.shared.lock().unwrap();
        shared.queue.push(WakeUp {
            parent_time,
            seq,
            clock: child,
        });
    }

    /// Pop the queue entry with the smallest `(parent_time, seq)` whose
    /// `parent_time` is strictly less than `before`, if any.
    fn pop_next_wakeup_before(&self, before: f64) -> Option<WakeUp> {
        let mut shared = self.0.shared.lock().unwrap();
        let mut best: Option<usize> = None;
        for (i, w) in shared.queue.iter().enumerate() {
            if w.parent_time >= before {
                continue;
            }
            best = match best {
                None => Some(i),
                Some(bi) => {
                    let b = &shared.queue[bi];
                    if (w.parent_time, w.seq) < (b.parent_time, b.seq) {
                        Some(i)
                    } else {
                        Some(bi)
                    }
                }
            };
        }
        best.map(|i| shared.queue.remove(i))
    }

    /// Spin-wait until every live child has registered its next wake-up
    /// (spec.md §4.3 step 1, §5). Intentionally a busy-loop: per spec.md
    /// §5 this terminates quickly since the awaited transition is the
    /// very next thing each child worker does.
    fn rendezvous_barrier(&self) {
        loop {
            let all_ready = {
                let shared = self.0.shared.lock().unwrap();
                shared.children.iter().all(|c| c.is_ready_and_waiting())
            };
            if all_ready {
                break;
            }
            std::hint::spin_loop();
        }
    }

    /// Wake `wakeup.clock` and block until it has either re-armed (called
    /// `wait` again) or finished entirely (spec.md §4.3 step 3f).
    fn wake_and_await_rearm(&self, wakeup: &WakeUp) {
        wakeup.clock.set_ready_and_waiting(false);
        wakeup.clock.0.signal.signal();
        loop {
            let still_a_child = {
                let shared = self.0.shared.lock().unwrap();
                shared.children.iter().any(|c| c == &wakeup.clock)
            };
            if !still_a_child || wakeup.clock.is_ready_and_waiting() {
                break;
            }
            std::hint::spin_loop();
        }
    }

    fn process_wakeup(&self, wakeup: WakeUp) {
        let beats_till_wake = wakeup.parent_time - self.beats();
        let parent_wait = self.0.tempo_map.lock().unwrap().get_wait_time(beats_till_wake);
        self.wait_in_parent(parent_wait);
        self.0
            .tempo_map
            .lock()
            .unwrap()
            .advance(beats_till_wake, Some(parent_wait));
        self.wake_and_await_rearm(&wakeup);
    }

    /// Advance this clock by `beats` beats of its own time, cooperatively
    /// honouring child wake-ups due within that interval (spec.md §4.3).
    pub fn wait(&self, beats: f64) {
        self.rendezvous_barrier();
        let end = self.beats() + beats;
        while let Some(wakeup) = self.pop_next_wakeup_before(end) {
            self.process_wakeup(wakeup);
        }
        let remaining = end - self.beats();
        let final_wait = self.0.tempo_map.lock().unwrap().get_wait_time(remaining);
        self.wait_in_parent(final_wait);
        self.0.tempo_map.lock().unwrap().advance(remaining, Some(final_wait));
    }

    /// Alias for [`wait`](Self::wait), kept for API familiarity with the
    /// original `Clock.sleep`.
    pub fn sleep(&self, beats: f64) {
        self.wait(beats);
    }

    /// Like [`wait`](Self::wait), but runs until every child has finished
    /// rather than for a fixed number of beats.
    pub fn wait_for_children_to_finish(&self) {
        self.rendezvous_barrier();
        while let Some(wakeup) = self.pop_next_wakeup_before(f64::INFINITY) {
            self.process_wakeup(wakeup);
        }
    }

    /// Advance this clock by `dt` parent-seconds: descend into the parent
    /// (or perform the one real sleep, if this is the master).
    fn wait_in_parent(&self, dt: f64) {
        if self.0.log_processing_time.load(Ordering::Relaxed) {
            let elapsed = {
                let shared = self.0.shared.lock().unwrap();
                shared.last_sleep_time.elapsed()
            };
            log::info!(
                "Clock '{}' processed for {:?}.",
                self.display_name(),
                elapsed
            );
        }

        if dt == 0.0 {
            return;
        }

        if self.is_master() {
            let now = Instant::now();
            let stop_sleeping_at = match self.0.timing_policy {
                TimingPolicy::Absolute => self.0.start_time + Duration::from_secs_f64(self.time() + dt),
                TimingPolicy::Relative => {
                    let last_sleep_time = self.0.shared.lock().unwrap().last_sleep_time;
                    last_sleep_time + Duration::from_secs_f64(dt)
                }
            };
            let ten_ms_ago = now.checked_sub(Duration::from_millis(10)).unwrap_or(now);
            if stop_sleeping_at < ten_ms_ago {
                log::warn!(
                    "clock '{}' is running noticeably behind real time; processing is probably too heavy.",
                    self.display_name()
                );
            } else if self.0.use_precise_timing.load(Ordering::Relaxed) {
                self.0.sleeper.sleep_until(stop_sleeping_at);
            } else {
                let now = Instant::now();
                if stop_sleeping_at > now {
                    std::thread::sleep(stop_sleeping_at - now);
                }
            }
        } else {
            let parent = self.0.parent.clone().expect("non-master clock has a parent");
            let wake_time = self.time_in_parent() + dt;
            parent.register_wakeup(wake_time, self.clone());
            self.set_ready_and_waiting(true);
            self.0.signal.wait_and_clear();
        }

        let mut shared = self.0.shared.lock().unwrap();
        shared.last_sleep_time = Instant::now();
    }
}
