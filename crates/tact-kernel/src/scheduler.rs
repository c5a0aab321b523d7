//! The discrete-event scheduler.
//!
//! The kernel owns every process record and the timed event wheel. It
//! runs delta cycles to exhaustion, then advances the simulated clock
//! to the earliest pending timed wake. Exactly one process executes at
//! a time; the scheduler thread blocks while a process holds the
//! baton.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use indexmap::IndexMap;
use tact_core::{ProcessId, SimError, SimTime, WorkerId};

use crate::observer::Registry;
use crate::process::{
    self, panic_message, spawn_process_thread, CurrentCtx, ProcessHandle, ProcessInner,
    ProcessKind, YieldState,
};
use crate::worker::AsyncWorker;

/// Default global time quantum.
pub const DEFAULT_QUANTUM: SimTime = SimTime::from_ms(1);

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the scheduler, process handles, and async
/// workers. Time and quantum are published atomically so async tasks
/// can observe them without taking a lock.
pub(crate) struct KernelShared {
    now_ps: AtomicU64,
    delta: AtomicU64,
    quantum_ps: AtomicU64,
    running: AtomicBool,
    stopping: AtomicBool,
    pub(crate) observers: Registry,
    workers: Mutex<IndexMap<ProcessId, Arc<AsyncWorker>>>,
}

impl KernelShared {
    fn new(quantum: SimTime) -> Self {
        Self {
            now_ps: AtomicU64::new(0),
            delta: AtomicU64::new(0),
            quantum_ps: AtomicU64::new(quantum.raw()),
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            observers: Registry::new(),
            workers: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn now(&self) -> SimTime {
        SimTime::from_ps(self.now_ps.load(Ordering::Acquire))
    }

    fn set_now_ps(&self, ps: u64) {
        self.now_ps.store(ps, Ordering::Release);
    }

    pub(crate) fn delta_count(&self) -> u64 {
        self.delta.load(Ordering::Acquire)
    }

    fn bump_delta(&self) {
        self.delta.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn quantum(&self) -> SimTime {
        SimTime::from_ps(self.quantum_ps.load(Ordering::Acquire))
    }

    pub(crate) fn set_quantum(&self, quantum: SimTime) {
        self.quantum_ps.store(quantum.raw(), Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Worker bound to `process`, spawning it on first use.
    pub(crate) fn worker_for(&self, process: ProcessId, label: &str) -> Arc<AsyncWorker> {
        let mut workers = self.workers.lock().unwrap();
        if let Some(worker) = workers.get(&process) {
            return Arc::clone(worker);
        }
        let id = WorkerId(workers.len() as u32);
        let worker = AsyncWorker::spawn(id, Some(process), label);
        workers.insert(process, Arc::clone(&worker));
        worker
    }

    fn drain_workers(&self) -> Vec<Arc<AsyncWorker>> {
        self.workers.lock().unwrap().drain(..).map(|(_, w)| w).collect()
    }

    fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }
}

// ── Kernel handle ───────────────────────────────────────────────────

/// Cloneable, thread-safe view of a running kernel.
#[derive(Clone)]
pub struct KernelHandle {
    shared: Arc<KernelShared>,
}

impl KernelHandle {
    pub(crate) fn new(shared: Arc<KernelShared>) -> Self {
        Self { shared }
    }

    /// Current simulated time.
    pub fn time_stamp(&self) -> SimTime {
        self.shared.now()
    }

    /// Number of delta cycles executed so far.
    pub fn delta_count(&self) -> u64 {
        self.shared.delta_count()
    }

    /// Global time quantum.
    pub fn quantum(&self) -> SimTime {
        self.shared.quantum()
    }

    /// Replaces the global time quantum.
    pub fn set_quantum(&self, quantum: SimTime) {
        self.shared.set_quantum(quantum);
    }

    /// True while the scheduler is inside a run call.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Requests a shutdown. Blocked processes observe it as
    /// [`Stopped`] from their next (or current) wait.
    ///
    /// [`Stopped`]: tact_core::Stopped
    pub fn stop(&self) {
        self.shared.request_stop();
    }
}

impl fmt::Debug for KernelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelHandle")
            .field("time_stamp", &self.time_stamp())
            .field("quantum", &self.quantum())
            .field("running", &self.is_running())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<KernelHandle>();
};

// ── Event wheel ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wake {
    Process(ProcessId),
    Method(ProcessId),
}

#[derive(PartialEq, Eq)]
struct TimedEntry {
    at_ps: u64,
    seq: u64,
    wake: Wake,
}

impl Ord for TimedEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at_ps, self.seq).cmp(&(other.at_ps, other.seq))
    }
}

impl PartialOrd for TimedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ── Kernel ──────────────────────────────────────────────────────────

struct ProcEntry {
    inner: Arc<ProcessInner>,
    join: Option<JoinHandle<()>>,
}

struct MethodEntry {
    name: String,
    callback: Option<Box<dyn FnOnce() + Send>>,
}

/// Tally returned by [`Kernel::shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Process threads joined during teardown.
    pub processes_joined: usize,
    /// Async worker threads joined during teardown.
    pub workers_joined: usize,
}

/// The simulation kernel.
///
/// Spawn processes, then drive them with [`Kernel::run`] or
/// [`Kernel::run_for`]; runs are resumable. Dropping the kernel shuts
/// it down and joins every thread it spawned.
pub struct Kernel {
    shared: Arc<KernelShared>,
    procs: IndexMap<ProcessId, ProcEntry>,
    methods: IndexMap<ProcessId, MethodEntry>,
    timed: BinaryHeap<Reverse<TimedEntry>>,
    runnable: VecDeque<Wake>,
    next_runnable: VecDeque<Wake>,
    next_seq: u64,
    next_id: u32,
    torn_down: bool,
}

impl Kernel {
    /// Creates a kernel with the default quantum.
    pub fn new() -> Self {
        Self::with_quantum(DEFAULT_QUANTUM)
    }

    /// Creates a kernel with the given global time quantum.
    pub fn with_quantum(quantum: SimTime) -> Self {
        Self {
            shared: Arc::new(KernelShared::new(quantum)),
            procs: IndexMap::new(),
            methods: IndexMap::new(),
            timed: BinaryHeap::new(),
            runnable: VecDeque::new(),
            next_runnable: VecDeque::new(),
            next_seq: 0,
            next_id: 0,
            torn_down: false,
        }
    }

    /// Cloneable handle usable from any thread.
    pub fn handle(&self) -> KernelHandle {
        KernelHandle::new(Arc::clone(&self.shared))
    }

    /// Current simulated time.
    pub fn time_stamp(&self) -> SimTime {
        self.shared.now()
    }

    /// Number of delta cycles executed so far.
    pub fn delta_count(&self) -> u64 {
        self.shared.delta_count()
    }

    /// Global time quantum.
    pub fn quantum(&self) -> SimTime {
        self.shared.quantum()
    }

    /// Replaces the global time quantum.
    pub fn set_quantum(&self, quantum: SimTime) {
        self.shared.set_quantum(quantum);
    }

    /// Number of async workers spawned so far.
    pub fn async_worker_count(&self) -> usize {
        self.shared.worker_count()
    }

    /// Requests a shutdown; see [`KernelHandle::stop`].
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Registers a hook that fires after every delta cycle.
    pub fn on_each_delta_cycle<F>(&self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.shared.observers.on_delta(Box::new(hook));
    }

    /// Registers a hook that fires after every advance of the
    /// simulated clock.
    pub fn on_each_time_step<F>(&self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.shared.observers.on_time_step(Box::new(hook));
    }

    fn alloc_id(&mut self) -> ProcessId {
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push_timed(&mut self, at_ps: u64, wake: Wake) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timed.push(Reverse(TimedEntry { at_ps, seq, wake }));
    }

    /// Spawns a thread process. The body starts running at the first
    /// delta cycle of the next run call.
    pub fn spawn_thread<F>(&mut self, name: &str, body: F) -> ProcessId
    where
        F: FnOnce(ProcessHandle) + Send + 'static,
    {
        let id = self.alloc_id();
        let inner = Arc::new(ProcessInner::new(id, name));
        let join = spawn_process_thread(
            Arc::clone(&inner),
            Arc::clone(&self.shared),
            Box::new(body),
        );
        tracing::debug!(process = id.0, name, "spawned thread process");
        self.procs.insert(
            id,
            ProcEntry {
                inner,
                join: Some(join),
            },
        );
        self.runnable.push_back(Wake::Process(id));
        id
    }

    /// Schedules a run-to-completion method callback `after` the
    /// current time stamp. A zero delay runs it in the next delta
    /// cycle.
    pub fn schedule_method<F>(&mut self, name: &str, after: SimTime, callback: F) -> ProcessId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.alloc_id();
        self.methods.insert(
            id,
            MethodEntry {
                name: name.to_string(),
                callback: Some(Box::new(callback)),
            },
        );
        if after.is_zero() {
            self.runnable.push_back(Wake::Method(id));
        } else {
            let at = self.shared.now().raw() + after.raw();
            self.push_timed(at, Wake::Method(id));
        }
        id
    }

    /// Runs until no timed or runnable work remains, or until a stop
    /// request.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.run_until(None)
    }

    /// Runs for `span` of simulated time, leaving later events
    /// pending. The clock always reaches the horizon. Resumable.
    pub fn run_for(&mut self, span: SimTime) -> Result<(), SimError> {
        let end = self.shared.now().raw() + span.raw();
        self.run_until(Some(end))
    }

    fn run_until(&mut self, end_ps: Option<u64>) -> Result<(), SimError> {
        self.shared.set_running(true);
        let result = self.drive(end_ps);
        self.shared.set_running(false);
        result
    }

    fn drive(&mut self, end_ps: Option<u64>) -> Result<(), SimError> {
        loop {
            if self.shared.is_stopping() {
                return Ok(());
            }
            if !self.runnable.is_empty() {
                while let Some(wake) = self.runnable.pop_front() {
                    self.dispatch(wake)?;
                    if self.shared.is_stopping() {
                        return Ok(());
                    }
                }
                self.shared.bump_delta();
                self.shared.observers.fire_delta();
                std::mem::swap(&mut self.runnable, &mut self.next_runnable);
                continue;
            }
            // Delta cycles exhausted: advance the clock.
            let head_at = self.timed.peek().map(|Reverse(head)| head.at_ps);
            let Some(at) = head_at else {
                if let Some(end) = end_ps {
                    self.finish_horizon(end);
                }
                return Ok(());
            };
            if let Some(end) = end_ps {
                if at > end {
                    self.finish_horizon(end);
                    return Ok(());
                }
            }
            self.shared.set_now_ps(at);
            while let Some(Reverse(head)) = self.timed.peek() {
                if head.at_ps != at {
                    break;
                }
                let Reverse(entry) = self.timed.pop().unwrap();
                self.runnable.push_back(entry.wake);
            }
            self.shared.observers.fire_time_step();
        }
    }

    /// Advances the clock to the run horizon when no event lands on it.
    fn finish_horizon(&mut self, end_ps: u64) {
        if self.shared.now().raw() < end_ps {
            self.shared.set_now_ps(end_ps);
            self.shared.observers.fire_time_step();
        }
    }

    fn dispatch(&mut self, wake: Wake) -> Result<(), SimError> {
        match wake {
            Wake::Process(id) => {
                let inner = match self.procs.get(&id) {
                    Some(entry) => Arc::clone(&entry.inner),
                    None => return Ok(()),
                };
                if inner.is_finished() {
                    return Ok(());
                }
                inner.resume_from_kernel();
                match inner.take_yield() {
                    YieldState::Timed(ps) => {
                        let at = self.shared.now().raw() + ps;
                        self.push_timed(at, wake);
                        Ok(())
                    }
                    YieldState::Delta => {
                        self.next_runnable.push_back(wake);
                        Ok(())
                    }
                    YieldState::Finished => Ok(()),
                    YieldState::Panicked(message) => Err(SimError::ProcessPanicked {
                        process: inner.name().to_string(),
                        message,
                    }),
                    YieldState::Running => {
                        unreachable!("process handed the baton back without recording a wait")
                    }
                }
            }
            Wake::Method(id) => {
                let (name, callback) = match self.methods.get_mut(&id) {
                    Some(entry) => (entry.name.clone(), entry.callback.take()),
                    None => return Ok(()),
                };
                let Some(callback) = callback else {
                    return Ok(());
                };
                process::set_current(CurrentCtx {
                    kind: ProcessKind::Method,
                    id,
                    name: name.clone(),
                    inner: None,
                    shared: Arc::clone(&self.shared),
                });
                let result = catch_unwind(AssertUnwindSafe(callback));
                process::clear_current();
                match result {
                    Ok(()) => Ok(()),
                    Err(payload) => Err(SimError::ProcessPanicked {
                        process: name,
                        message: panic_message(payload.as_ref()),
                    }),
                }
            }
        }
    }

    /// Stops the simulation and joins every spawned thread. Processes
    /// blocked in a wait are woken once and must return promptly.
    /// Workers are joined after their owning processes; an in-flight
    /// async task runs to completion. Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.torn_down {
            return ShutdownReport::default();
        }
        self.torn_down = true;
        self.shared.request_stop();
        let mut report = ShutdownReport::default();
        for entry in self.procs.values_mut() {
            if !entry.inner.is_finished() {
                entry.inner.resume_from_kernel();
                let _ = entry.inner.take_yield();
            }
            if let Some(join) = entry.join.take() {
                let _ = join.join();
                report.processes_joined += 1;
            }
        }
        for worker in self.shared.drain_workers() {
            worker.shutdown_and_join();
            report.workers_joined += 1;
        }
        tracing::debug!(
            processes = report.processes_joined,
            workers = report.workers_joined,
            "kernel shut down"
        );
        report
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("time_stamp", &self.time_stamp())
            .field("delta_count", &self.delta_count())
            .field("processes", &self.procs.len())
            .field("methods", &self.methods.len())
            .field("pending_timed", &self.timed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn empty_kernel_runs_to_completion() {
        let mut kernel = Kernel::new();
        kernel.run().unwrap();
        assert_eq!(kernel.time_stamp(), SimTime::ZERO);
        assert_eq!(kernel.delta_count(), 0);
    }

    #[test]
    fn waits_advance_the_clock() {
        let mut kernel = Kernel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        kernel.spawn_thread("ticker", move |ph| {
            for _ in 0..3 {
                if ph.wait(SimTime::from_us(10)).is_err() {
                    return;
                }
                log.lock().unwrap().push(ph.time_stamp());
            }
        });
        kernel.run().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SimTime::from_us(10),
                SimTime::from_us(20),
                SimTime::from_us(30)
            ]
        );
        assert_eq!(kernel.time_stamp(), SimTime::from_us(30));
    }

    #[test]
    fn same_time_wakes_run_in_spawn_order() {
        let mut kernel = Kernel::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = Arc::clone(&order);
            kernel.spawn_thread(&format!("p{id}"), move |ph| {
                let _ = ph.wait(SimTime::from_ns(5));
                order.lock().unwrap().push(id);
            });
        }
        kernel.run().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn delta_wait_defers_to_next_cycle() {
        let mut kernel = Kernel::new();
        let deltas = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&deltas);
        kernel.spawn_thread("spinner", move |ph| {
            for _ in 0..4 {
                if ph.wait_delta().is_err() {
                    return;
                }
            }
            seen.store(ph.kernel().delta_count(), Ordering::Release);
        });
        kernel.run().unwrap();
        assert_eq!(kernel.time_stamp(), SimTime::ZERO);
        assert!(deltas.load(Ordering::Acquire) >= 4);
    }

    #[test]
    fn run_for_reaches_the_horizon_and_resumes() {
        let mut kernel = Kernel::new();
        let wakes = Arc::new(AtomicU64::new(0));
        let count = Arc::clone(&wakes);
        kernel.spawn_thread("sleeper", move |ph| {
            while ph.wait(SimTime::from_ms(10)).is_ok() {
                count.fetch_add(1, Ordering::AcqRel);
            }
        });
        kernel.run_for(SimTime::from_ms(25)).unwrap();
        assert_eq!(kernel.time_stamp(), SimTime::from_ms(25));
        assert_eq!(wakes.load(Ordering::Acquire), 2);

        kernel.run_for(SimTime::from_ms(10)).unwrap();
        assert_eq!(kernel.time_stamp(), SimTime::from_ms(35));
        assert_eq!(wakes.load(Ordering::Acquire), 3);
    }

    #[test]
    fn methods_run_at_their_scheduled_time() {
        let mut kernel = Kernel::new();
        let fired_at = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fired_at);
        let handle = kernel.handle();
        kernel.schedule_method("alarm", SimTime::from_us(7), move || {
            assert!(process::is_method());
            assert!(!process::is_thread());
            *slot.lock().unwrap() = Some(handle.time_stamp());
        });
        kernel.run().unwrap();
        assert_eq!(*fired_at.lock().unwrap(), Some(SimTime::from_us(7)));
    }

    #[test]
    fn process_panic_surfaces_from_run() {
        let mut kernel = Kernel::new();
        kernel.spawn_thread("doomed", |ph| {
            let _ = ph.wait(SimTime::from_ns(1));
            panic!("model bug");
        });
        let err = kernel.run().unwrap_err();
        match err {
            SimError::ProcessPanicked { process, message } => {
                assert_eq!(process, "doomed");
                assert_eq!(message, "model bug");
            }
        }
    }

    #[test]
    fn stop_request_unblocks_waiters() {
        let mut kernel = Kernel::new();
        let stopped = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&stopped);
        let handle = kernel.handle();
        kernel.spawn_thread("stopper", move |ph| {
            let _ = ph.wait(SimTime::from_us(1));
            handle.stop();
        });
        kernel.spawn_thread("victim", move |ph| {
            if ph.wait(SimTime::from_secs(1)).is_err() {
                seen.store(1, Ordering::Release);
            }
        });
        kernel.run().unwrap();
        let report = kernel.shutdown();
        assert_eq!(report.processes_joined, 2);
        assert_eq!(stopped.load(Ordering::Acquire), 1);
        assert!(kernel.time_stamp() < SimTime::from_secs(1));
    }

    #[test]
    fn shutdown_is_idempotent_and_joins_everything() {
        let mut kernel = Kernel::new();
        kernel.spawn_thread("idle", |ph| {
            let _ = ph.wait(SimTime::from_secs(10));
        });
        let first = kernel.shutdown();
        assert_eq!(first.processes_joined, 1);
        let second = kernel.shutdown();
        assert_eq!(second, ShutdownReport::default());
    }

    #[test]
    fn observers_see_time_steps() {
        let mut kernel = Kernel::new();
        let steps = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&steps);
        let handle = kernel.handle();
        kernel.on_each_time_step(move || log.lock().unwrap().push(handle.time_stamp()));
        kernel.spawn_thread("ticker", |ph| {
            for _ in 0..2 {
                if ph.wait(SimTime::from_ns(100)).is_err() {
                    return;
                }
            }
        });
        kernel.run().unwrap();
        assert_eq!(
            *steps.lock().unwrap(),
            vec![SimTime::from_ns(100), SimTime::from_ns(200)]
        );
    }

    #[test]
    fn quantum_is_visible_everywhere() {
        let kernel = Kernel::with_quantum(SimTime::from_us(100));
        assert_eq!(kernel.quantum(), SimTime::from_us(100));
        let handle = kernel.handle();
        handle.set_quantum(SimTime::from_us(250));
        assert_eq!(kernel.quantum(), SimTime::from_us(250));
    }
}
