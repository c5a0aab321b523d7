//! The async execution bridge.
//!
//! [`async_run`] lets a thread process push heavy work onto a native
//! OS thread while the calling process stays behind and converts the
//! task's reported progress into ordinary timed waits. The kernel
//! itself never blocks on the task; only the launching process does,
//! and only through the scheduler. [`sync_call`] is the reverse
//! direction: an async task borrows its owning process to run a
//! closure in kernel context.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use tact_core::{FatalError, SimTime, Stopped};

use crate::process::{self, ProcessHandle, ProcessKind};
use crate::report;
use crate::worker::AsyncWorker;

thread_local! {
    static ASYNC_WORKER: RefCell<Option<Arc<AsyncWorker>>> = const { RefCell::new(None) };
}

pub(crate) fn enter_async(worker: Arc<AsyncWorker>) {
    ASYNC_WORKER.with(|cell| *cell.borrow_mut() = Some(worker));
}

pub(crate) fn exit_async() {
    ASYNC_WORKER.with(|cell| *cell.borrow_mut() = None);
}

pub(crate) fn current_worker() -> Option<Arc<AsyncWorker>> {
    ASYNC_WORKER.with(|cell| cell.borrow().clone())
}

/// True when the caller is running inside an async task.
pub fn is_async() -> bool {
    current_worker().is_some()
}

/// Records simulated time covered by the current async task.
///
/// The owning process will observe the accumulated total and advance
/// the simulation clock by exactly that much, batched at the kernel's
/// convenience. Fatal when called outside an async task.
pub fn progress(elapsed: SimTime) {
    match current_worker() {
        Some(worker) => worker.add_progress(elapsed.raw()),
        None => report::fatal(FatalError::ProgressOutsideAsync),
    }
}

/// Runs `job` on the calling process's async worker thread and blocks
/// the process until the job completes.
///
/// While the job runs, the process sits in a duty cycle: it drains the
/// job's progress into timed waits (a delta wait when no progress is
/// pending) and services [`sync_call`] requests. Simulated time
/// therefore advances by exactly the progress the job reports, in
/// order, and every call-in executes with the process's scheduling
/// rights.
///
/// Fatal unless called from a thread process outside any async task.
/// Returns [`Stopped`] when the kernel shuts down mid-job; the job
/// still runs to completion, its remaining progress discarded. A panic
/// in the job resurfaces as a panic of the calling process.
pub fn async_run<F>(job: F) -> Result<(), Stopped>
where
    F: FnOnce() + Send + 'static,
{
    if is_async() {
        report::fatal(FatalError::AsyncFromInvalidContext);
    }
    let Some(ctx) = process::current_ctx() else {
        report::fatal(FatalError::AsyncFromInvalidContext);
    };
    if ctx.kind != ProcessKind::Thread {
        report::fatal(FatalError::AsyncFromInvalidContext);
    }
    let inner = ctx.inner.expect("thread process context carries its record");
    let handle = ProcessHandle {
        inner,
        shared: Arc::clone(&ctx.shared),
    };
    let worker = ctx.shared.worker_for(ctx.id, &ctx.name);
    worker.submit(Box::new(job));

    let mut stopped = false;
    while worker.is_working() {
        if stopped {
            // No more simulated waits are possible; park on the
            // mailbox so the job can still complete its call-ins.
            if let Some(call) = worker.recv_call(Duration::from_millis(1)) {
                call();
            }
            continue;
        }
        apply_progress(&worker, &handle, &mut stopped, true);
        while let Some(call) = worker.take_call() {
            // Progress the task reported before issuing the call-in
            // lands before the call-in runs.
            apply_progress(&worker, &handle, &mut stopped, false);
            call();
        }
    }
    // Completion races the last drain; pick up what the final
    // progress reports left behind.
    apply_progress(&worker, &handle, &mut stopped, false);
    if let Some(message) = worker.take_panic() {
        panic!("async task panicked: {message}");
    }
    if stopped {
        Err(Stopped)
    } else {
        Ok(())
    }
}

/// Converts the worker's pending progress into a timed wait. With
/// `idle_delta` set, an empty accumulator still yields a delta cycle
/// so same-time processes keep running while the task computes.
fn apply_progress(
    worker: &AsyncWorker,
    handle: &ProcessHandle,
    stopped: &mut bool,
    idle_delta: bool,
) {
    let pending = worker.take_progress();
    if *stopped || (pending == 0 && !idle_delta) {
        return;
    }
    if handle.wait(SimTime::from_ps(pending)).is_err() {
        *stopped = true;
    }
}

/// Executes `job` in kernel context and returns its result.
///
/// From an async task the job is shipped to the owning process, which
/// runs it inside its duty cycle while this thread blocks; the job may
/// wait on simulated time. From kernel context the job simply runs
/// inline. Fatal from a plain thread with no simulation context.
pub fn sync_call<R, F>(job: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if let Some(worker) = current_worker() {
        let (ret_tx, ret_rx) = bounded(1);
        worker.push_call(Box::new(move || {
            let _ = ret_tx.send(job());
        }));
        match ret_rx.recv() {
            Ok(result) => result,
            Err(_) => panic!("owning process dropped a sync call before completion"),
        }
    } else if process::current_ctx().is_some() {
        job()
    } else {
        report::fatal(FatalError::SyncCallOutsideContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "progress reported outside an async task")]
    fn progress_from_plain_thread_is_fatal() {
        progress(SimTime::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "sync_call requires kernel or async-task context")]
    fn sync_call_from_plain_thread_is_fatal() {
        let _ = sync_call(|| 42);
    }

    #[test]
    #[should_panic(expected = "async_run must be called from a thread process")]
    fn async_run_from_plain_thread_is_fatal() {
        let _ = async_run(|| {});
    }

    #[test]
    fn plain_threads_are_not_async() {
        assert!(!is_async());
    }
}
