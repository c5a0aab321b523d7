//! Simulation processes and the kernel/process baton.
//!
//! Every thread process runs on its own OS thread, but at most one
//! thread executes simulation code at any instant: the kernel and the
//! process exchange a baton through a mutex/condvar pair. The kernel
//! hands the baton over to resume the process; the process hands it
//! back when it waits, finishes, or panics.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tact_core::{ProcessId, SimTime, Stopped};

use crate::scheduler::{KernelHandle, KernelShared};

// ── Baton ───────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Turn {
    Kernel,
    Process,
}

struct Baton {
    turn: Mutex<Turn>,
    cv: Condvar,
}

impl Baton {
    fn new() -> Self {
        Self {
            turn: Mutex::new(Turn::Kernel),
            cv: Condvar::new(),
        }
    }

    fn pass(&self, to: Turn, until: Turn) {
        let mut turn = self.turn.lock().unwrap();
        *turn = to;
        self.cv.notify_all();
        while *turn != until {
            turn = self.cv.wait(turn).unwrap();
        }
    }

    fn hand_over(&self, to: Turn) {
        let mut turn = self.turn.lock().unwrap();
        *turn = to;
        self.cv.notify_all();
    }
}

// ── Process record ──────────────────────────────────────────────────

/// How a process last yielded back to the kernel.
#[derive(Debug)]
pub(crate) enum YieldState {
    /// Baton is with the process; nothing recorded yet.
    Running,
    /// Blocked until the given span of simulated time elapses.
    Timed(u64),
    /// Blocked until the next delta cycle.
    Delta,
    /// Body returned; the process will never run again.
    Finished,
    /// Body panicked with the captured message.
    Panicked(String),
}

pub(crate) struct ProcessInner {
    id: ProcessId,
    name: String,
    baton: Baton,
    yielded: Mutex<YieldState>,
    finished: AtomicBool,
}

impl ProcessInner {
    pub(crate) fn new(id: ProcessId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            baton: Baton::new(),
            yielded: Mutex::new(YieldState::Running),
            finished: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> ProcessId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Kernel side: hand the baton to the process and block until it
    /// comes back.
    pub(crate) fn resume_from_kernel(&self) {
        self.baton.pass(Turn::Process, Turn::Kernel);
    }

    /// Process side: record how we blocked, hand the baton back, and
    /// sleep until the kernel resumes us.
    fn yield_to_kernel(&self, state: YieldState) {
        *self.yielded.lock().unwrap() = state;
        self.baton.pass(Turn::Kernel, Turn::Process);
    }

    /// Process side: terminal yield. Does not wait for another turn.
    fn finish(&self, state: YieldState) {
        *self.yielded.lock().unwrap() = state;
        self.finished.store(true, Ordering::Release);
        self.baton.hand_over(Turn::Kernel);
    }

    /// Process side: block until the kernel dispatches us for the
    /// first time.
    fn await_first_turn(&self) {
        let mut turn = self.baton.turn.lock().unwrap();
        while *turn != Turn::Process {
            turn = self.baton.cv.wait(turn).unwrap();
        }
    }

    pub(crate) fn take_yield(&self) -> YieldState {
        std::mem::replace(&mut *self.yielded.lock().unwrap(), YieldState::Running)
    }
}

// ── Current-context tracking ────────────────────────────────────────

/// Kind of kernel-context execution a thread is performing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessKind {
    /// A resumable process with its own stack.
    Thread,
    /// A run-to-completion callback on the scheduler thread.
    Method,
}

#[derive(Clone)]
pub(crate) struct CurrentCtx {
    pub(crate) kind: ProcessKind,
    pub(crate) id: ProcessId,
    pub(crate) name: String,
    pub(crate) inner: Option<Arc<ProcessInner>>,
    pub(crate) shared: Arc<KernelShared>,
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentCtx>> = const { RefCell::new(None) };
}

pub(crate) fn set_current(ctx: CurrentCtx) {
    CURRENT.with(|cell| *cell.borrow_mut() = Some(ctx));
}

pub(crate) fn clear_current() {
    CURRENT.with(|cell| *cell.borrow_mut() = None);
}

pub(crate) fn current_ctx() -> Option<CurrentCtx> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Identity of the process in whose context the caller runs, if any.
///
/// Inside an async task this is the process that launched the task.
pub fn current_process() -> Option<ProcessId> {
    if let Some(worker) = crate::bridge::current_worker() {
        return Some(worker.process());
    }
    current_ctx().map(|ctx| ctx.id)
}

/// Kind of the current process context, if any.
pub fn current_process_kind() -> Option<ProcessKind> {
    if crate::bridge::current_worker().is_some() {
        return Some(ProcessKind::Thread);
    }
    current_ctx().map(|ctx| ctx.kind)
}

/// True when called from a thread process or one of its async tasks.
pub fn is_thread() -> bool {
    current_process_kind() == Some(ProcessKind::Thread)
}

/// True when called from a method callback.
pub fn is_method() -> bool {
    current_process_kind() == Some(ProcessKind::Method)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ── Process handle ──────────────────────────────────────────────────

/// Capability held by a thread process body to interact with the
/// kernel it belongs to.
#[derive(Clone)]
pub struct ProcessHandle {
    pub(crate) inner: Arc<ProcessInner>,
    pub(crate) shared: Arc<KernelShared>,
}

impl ProcessHandle {
    /// Identifier the kernel assigned to this process.
    pub fn id(&self) -> ProcessId {
        self.inner.id()
    }

    /// Name the process was spawned with.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current simulated time.
    pub fn time_stamp(&self) -> SimTime {
        self.shared.now()
    }

    /// Global time quantum.
    pub fn quantum(&self) -> SimTime {
        self.shared.quantum()
    }

    /// Handle onto the owning kernel.
    pub fn kernel(&self) -> KernelHandle {
        KernelHandle::new(Arc::clone(&self.shared))
    }

    /// Suspends the process for `span` of simulated time. A zero span
    /// suspends until the next delta cycle.
    ///
    /// Returns [`Stopped`] once the kernel is shutting down; the body
    /// is expected to return promptly after that.
    pub fn wait(&self, span: SimTime) -> Result<(), Stopped> {
        let state = if span.is_zero() {
            YieldState::Delta
        } else {
            YieldState::Timed(span.raw())
        };
        self.block_on(state)
    }

    /// Suspends the process until the next delta cycle.
    pub fn wait_delta(&self) -> Result<(), Stopped> {
        self.block_on(YieldState::Delta)
    }

    fn block_on(&self, state: YieldState) -> Result<(), Stopped> {
        if self.shared.is_stopping() {
            return Err(Stopped);
        }
        self.inner.yield_to_kernel(state);
        if self.shared.is_stopping() {
            return Err(Stopped);
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ProcessHandle>();
};

// ── Thread body ─────────────────────────────────────────────────────

pub(crate) fn spawn_process_thread(
    inner: Arc<ProcessInner>,
    shared: Arc<KernelShared>,
    body: Box<dyn FnOnce(ProcessHandle) + Send>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("tact-{}", inner.name))
        .spawn(move || {
            inner.await_first_turn();
            if shared.is_stopping() {
                inner.finish(YieldState::Finished);
                return;
            }
            set_current(CurrentCtx {
                kind: ProcessKind::Thread,
                id: inner.id,
                name: inner.name.clone(),
                inner: Some(Arc::clone(&inner)),
                shared: Arc::clone(&shared),
            });
            let handle = ProcessHandle {
                inner: Arc::clone(&inner),
                shared: Arc::clone(&shared),
            };
            let result = catch_unwind(AssertUnwindSafe(move || body(handle)));
            clear_current();
            match result {
                Ok(()) => inner.finish(YieldState::Finished),
                Err(payload) => inner.finish(YieldState::Panicked(panic_message(payload.as_ref()))),
            }
        })
        .expect("failed to spawn process thread")
}
