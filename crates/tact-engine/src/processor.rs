//! The quantum-stepped processor run loop.
//!
//! A processor wraps a [`CycleCore`] in a kernel thread process and
//! advances it one time quantum at a time. In sync mode the core runs
//! inline on the process thread; in async mode each quantum is pushed
//! through the kernel's execution bridge so the core can burn host
//! time without holding up the scheduler.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tact_core::{CycleCore, FatalError, SimTime, Stopped};
use tact_kernel::{bridge, report, Kernel, KernelHandle, ProcessHandle};

use crate::config::{ConfigError, ProcessorConfig};
use crate::stats::RunStats;

// ── Shared control block ────────────────────────────────────────────

pub(crate) struct Ctrl {
    suspend: AtomicU32,
    single_step: AtomicBool,
    cycles: AtomicU64,
    stats: Mutex<RunStats>,
}

impl Ctrl {
    fn new() -> Self {
        Self {
            suspend: AtomicU32::new(0),
            single_step: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            stats: Mutex::new(RunStats::default()),
        }
    }

    fn is_suspended(&self) -> bool {
        self.suspend.load(Ordering::Acquire) > 0
    }

    fn single_step(&self) -> bool {
        self.single_step.load(Ordering::Acquire)
    }

    fn published_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    fn publish_cycles(&self, count: u64) {
        self.cycles.store(count, Ordering::Release);
    }

    fn record_batch(&self, executed: u64, host: Duration) {
        let mut stats = self.stats.lock().unwrap();
        stats.cycles += executed;
        stats.batches += 1;
        stats.host_time += host;
    }
}

/// Control surface for a spawned processor, usable from any thread.
#[derive(Clone)]
pub struct ProcessorHandle {
    ctrl: Arc<Ctrl>,
}

impl ProcessorHandle {
    /// Holds the run loop in standby. Nested calls stack; the loop
    /// resumes once every suspend has been matched by a resume. The
    /// loop re-checks the gate once per clock period of simulated
    /// time.
    pub fn suspend(&self) {
        self.ctrl.suspend.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases one suspend. Extra resumes are ignored.
    pub fn resume(&self) {
        let _ = self
            .ctrl
            .suspend
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(v.saturating_sub(1))
            });
    }

    /// True while at least one suspend is outstanding.
    pub fn is_suspended(&self) -> bool {
        self.ctrl.is_suspended()
    }

    /// Forces one-cycle sync batches, regardless of the async setting.
    pub fn set_single_step(&self, enabled: bool) {
        self.ctrl.single_step.store(enabled, Ordering::Release);
    }

    /// True while single-stepping is forced.
    pub fn is_single_step(&self) -> bool {
        self.ctrl.single_step()
    }

    /// Cycle count the core most recently reported.
    pub fn cycle_count(&self) -> u64 {
        self.ctrl.published_cycles()
    }

    /// Snapshot of the run-loop counters.
    pub fn stats(&self) -> RunStats {
        *self.ctrl.stats.lock().unwrap()
    }
}

impl fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("cycle_count", &self.cycle_count())
            .field("suspended", &self.is_suspended())
            .field("single_step", &self.is_single_step())
            .finish()
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ProcessorHandle>();
};

// ── Spawning ────────────────────────────────────────────────────────

/// Factory for processor run loops.
pub struct Processor;

impl Processor {
    /// Validates `config` and spawns a kernel process, named after the
    /// core, that drives `core` until the kernel stops.
    pub fn spawn<C>(
        kernel: &mut Kernel,
        config: ProcessorConfig,
        core: C,
    ) -> Result<ProcessorHandle, ConfigError>
    where
        C: CycleCore + 'static,
    {
        config.validate()?;
        let ctrl = Arc::new(Ctrl::new());
        let core: Arc<Mutex<dyn CycleCore>> = Arc::new(Mutex::new(core));
        let name = core.lock().unwrap().name().to_string();
        let run = RunLoop {
            kernel: kernel.handle(),
            config,
            core,
            ctrl: Arc::clone(&ctrl),
            local_offset: SimTime::ZERO,
        };
        kernel.spawn_thread(&name, move |ph| run.run(ph));
        Ok(ProcessorHandle { ctrl })
    }
}

// ── The run loop ────────────────────────────────────────────────────

struct RunLoop {
    kernel: KernelHandle,
    config: ProcessorConfig,
    core: Arc<Mutex<dyn CycleCore>>,
    ctrl: Arc<Ctrl>,
    /// Simulated time generated but not yet surrendered to the
    /// scheduler. Only the sync path accumulates an offset.
    local_offset: SimTime,
}

impl RunLoop {
    fn run(mut self, ph: ProcessHandle) {
        loop {
            if self.standby_gate(&ph).is_err() {
                return;
            }
            let quantum = self.kernel.quantum();
            let single = self.ctrl.single_step();
            let use_async = self.config.allow_async && !single;
            if use_async && self.flush_offset(&ph).is_err() {
                return;
            }
            let start = self.local_stamp(&ph);
            let budget = decide_budget(
                quantum.saturating_sub(self.local_offset),
                self.config.clock,
                single,
            );
            let step = if use_async {
                self.async_step(budget)
            } else {
                self.sync_step(&ph, budget, quantum)
            };
            if step.is_err() {
                return;
            }
            if self.local_stamp(&ph) <= start {
                report::fatal(FatalError::StuckInTime { at: start });
            }
        }
    }

    fn local_stamp(&self, ph: &ProcessHandle) -> SimTime {
        ph.time_stamp() + self.local_offset
    }

    /// Polls the suspend gate once per clock period until released.
    fn standby_gate(&self, ph: &ProcessHandle) -> Result<(), Stopped> {
        while self.ctrl.is_suspended() {
            ph.wait(self.config.clock)?;
        }
        Ok(())
    }

    /// Surrenders accumulated local time before switching modes, so an
    /// async quantum starts aligned with the scheduler clock.
    fn flush_offset(&mut self, ph: &ProcessHandle) -> Result<(), Stopped> {
        if self.local_offset.is_zero() {
            return Ok(());
        }
        let elapsed = self.local_offset;
        self.local_offset = SimTime::ZERO;
        ph.wait(elapsed)
    }

    fn sync_step(&mut self, ph: &ProcessHandle, budget: u64, quantum: SimTime) -> Result<(), Stopped> {
        let host = Instant::now();
        let executed = run_cycles(&self.core, &self.ctrl, budget);
        self.ctrl.record_batch(executed, host.elapsed());
        self.local_offset += self.config.clock * executed;
        if self.local_offset >= quantum {
            return self.flush_offset(ph);
        }
        Ok(())
    }

    fn async_step(&self, budget: u64) -> Result<(), Stopped> {
        let core = Arc::clone(&self.core);
        let ctrl = Arc::clone(&self.ctrl);
        let kernel = self.kernel.clone();
        let period = self.config.clock;
        let rate = self.config.async_rate;
        bridge::async_run(move || async_quantum(core, ctrl, kernel, period, rate, budget))
    }
}

/// Cycles to issue in the next batch. Always at least one, so a core
/// that keeps executing also keeps the clock moving.
fn decide_budget(remaining: SimTime, period: SimTime, single_step: bool) -> u64 {
    if single_step {
        return 1;
    }
    remaining.full_periods(period).max(1)
}

/// Runs one batch against the core and publishes the new cycle count.
/// Fatal when the count moves backwards.
fn run_cycles(core: &Arc<Mutex<dyn CycleCore>>, ctrl: &Ctrl, cycles: u64) -> u64 {
    let mut core = core.lock().unwrap();
    let before = core.cycle_count();
    let floor = ctrl.published_cycles();
    if before < floor {
        report::fatal(FatalError::CycleCountRegressed {
            was: floor,
            now: before,
        });
    }
    core.simulate(cycles);
    let after = core.cycle_count();
    drop(core);
    if after < before {
        report::fatal(FatalError::CycleCountRegressed {
            was: before,
            now: after,
        });
    }
    ctrl.publish_cycles(after);
    after - before
}

/// Body of one async quantum: runs the budget in sub-batches,
/// reporting progress after each, and throttles itself against the
/// scheduler's published clock so it never runs more than a full
/// budget span ahead.
fn async_quantum(
    core: Arc<Mutex<dyn CycleCore>>,
    ctrl: Arc<Ctrl>,
    kernel: KernelHandle,
    period: SimTime,
    rate: u64,
    budget: u64,
) {
    let span_ps = period.raw() * budget;
    let start_ps = kernel.time_stamp().raw();
    let mut local_ps: u64 = 0;
    let mut remaining = budget;
    while kernel.is_running() && remaining > 0 {
        let chunk = (budget / rate).max(1).min(remaining);
        let host = Instant::now();
        let executed = run_cycles(&core, &ctrl, chunk);
        ctrl.record_batch(executed, host.elapsed());
        if executed == 0 {
            // Halted core. Hand the quantum back and let the run
            // loop's progress check decide.
            break;
        }
        local_ps += period.raw() * executed;
        bridge::progress(period * executed);
        remaining = remaining.saturating_sub(executed);
        while kernel.is_running()
            && local_ps.saturating_sub(kernel.time_stamp().raw().saturating_sub(start_ps))
                >= span_ps
        {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_debug_shows_the_counters() {
        let handle = ProcessorHandle {
            ctrl: Arc::new(Ctrl::new()),
        };
        handle.ctrl.publish_cycles(7);
        handle.suspend();
        let rendered = format!("{handle:?}");
        assert!(rendered.contains("cycle_count: 7"), "rendered: {rendered}");
        assert!(rendered.contains("suspended: true"), "rendered: {rendered}");
    }

    #[test]
    fn budget_covers_the_remaining_quantum() {
        let budget = decide_budget(SimTime::from_us(1), SimTime::from_ns(10), false);
        assert_eq!(budget, 100);
    }

    #[test]
    fn budget_never_drops_below_one_cycle() {
        let budget = decide_budget(SimTime::from_ps(3), SimTime::from_ns(10), false);
        assert_eq!(budget, 1);
        let budget = decide_budget(SimTime::ZERO, SimTime::from_ns(10), false);
        assert_eq!(budget, 1);
    }

    #[test]
    fn single_step_forces_one_cycle() {
        let budget = decide_budget(SimTime::from_ms(1), SimTime::from_ns(10), true);
        assert_eq!(budget, 1);
    }

    proptest::proptest! {
        #[test]
        fn budget_is_always_positive(
            remaining_ps in 0u64..=10_000_000,
            period_ps in 1u64..=100_000,
        ) {
            let budget = decide_budget(
                SimTime::from_ps(remaining_ps),
                SimTime::from_ps(period_ps),
                false,
            );
            proptest::prop_assert!(budget >= 1);
            proptest::prop_assert!(budget <= remaining_ps.max(period_ps) / period_ps + 1);
        }
    }
}
