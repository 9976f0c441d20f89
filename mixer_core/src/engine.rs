//! Execution engine: drives one recipe run over the two-phase batch protocol.
//!
//! A run executes on its own worker thread and reports through a channel of
//! [`ExecutionEvent`]s; the caller is never blocked. Only one run is active
//! per engine at a time.
//!
//! Every run:
//! 1. builds the plan and checks stock (nothing is sent on failure),
//! 2. clears stale node state with `batchabort`,
//! 3. sends `batchprep`/`batchrun` in sequential or parallel mode,
//! 4. debits stock only when the whole run completed.
//!
//! Any send failure sends `batchabort` and ends the run; there is no retry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use mixer_traits::{Clock, MonotonicClock, Transport};
use tracing::{debug, info, warn};

use crate::batcher::{TransmissionBatch, group_by_node};
use crate::catalog::Inventory;
use crate::chunker::{ActuationSegment, chunk};
use crate::config::ExecutionLimits;
use crate::error::{ConfigurationError, EngineError, Stage, TransmissionError};
use crate::estimator::{Estimate, estimate};
use crate::format::{format_duration, format_grams};
use crate::hw_error::{LinkFault, map_transport_error};
use crate::ledger::{Availability, check_availability, consume};
use crate::model::{NodeUid, Recipe, pin_label};
use crate::plan::{Plan, Selection, build_plan};
use crate::protocol::Command;
use crate::status::{EngineState, ExecutionEvent, ExecutionMode, RunOutcome, StepReport};

/// Longest uninterrupted sleep while waiting for pumps; bounds stop latency.
const WAIT_SLICE: Duration = Duration::from_millis(50);

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type StopHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct StopState {
    stopped: AtomicBool,
    hooks: Mutex<Vec<StopHook>>,
}

/// Cooperative cancellation flag shared between a run and its controller.
///
/// While a run is active, `stop()` from any clone (a Ctrl-C handler, the run
/// handle) also sends `batchabort` right away instead of waiting for the
/// worker to notice the flag.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<StopState>);

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        for hook in lock(&self.0.hooks).iter() {
            hook();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::SeqCst)
    }

    fn on_stop(&self, hook: StopHook) {
        lock(&self.0.hooks).push(hook);
    }

    fn clear_hooks(&self) {
        lock(&self.0.hooks).clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub recipe: Recipe,
    pub desired_g: f64,
    pub selection: Selection,
    pub mode: ExecutionMode,
}

impl RunRequest {
    pub fn new(recipe: Recipe, desired_g: f64) -> Self {
        Self {
            recipe,
            desired_g,
            selection: Selection::AsRecipe,
            mode: ExecutionMode::Sequential,
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Everything known about a run before anything is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Preflight {
    pub plan: Plan,
    pub segments: Vec<ActuationSegment>,
    pub estimate: Estimate,
    pub availability: Availability,
}

/// Plan, chunk, estimate and check stock for a recipe at `desired_g`.
pub fn preflight<I: Inventory + ?Sized>(
    recipe: &Recipe,
    desired_g: f64,
    selection: &Selection,
    inventory: &I,
    limits: &ExecutionLimits,
) -> Result<Preflight, ConfigurationError> {
    let plan = build_plan(recipe, desired_g, selection, inventory, limits)?;
    let segments = chunk(&plan.requests, limits);
    let estimate = estimate(&segments, limits);
    let availability = check_availability(&plan.requests, inventory);
    Ok(Preflight {
        plan,
        segments,
        estimate,
        availability,
    })
}

pub struct Engine<T, I> {
    transport: Arc<Mutex<T>>,
    inventory: Arc<Mutex<I>>,
    clock: Arc<dyn Clock + Send + Sync>,
    limits: ExecutionLimits,
    active: Arc<AtomicBool>,
}

impl<T, I> Engine<T, I>
where
    T: Transport + Send + 'static,
    I: Inventory + Send + 'static,
{
    pub fn new(transport: Arc<Mutex<T>>, inventory: Arc<Mutex<I>>) -> Self {
        Self {
            transport,
            inventory,
            clock: Arc::new(MonotonicClock::new()),
            limits: ExecutionLimits::default(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn inventory(&self) -> &Arc<Mutex<I>> {
        &self.inventory
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn preflight(&self, request: &RunRequest) -> Result<Preflight, ConfigurationError> {
        let inv = lock(&self.inventory);
        preflight(
            &request.recipe,
            request.desired_g,
            &request.selection,
            &*inv,
            &self.limits,
        )
    }

    pub fn start(&self, request: RunRequest) -> Result<RunHandle, EngineError> {
        self.start_with(request, StopSignal::new())
    }

    /// Start a run controlled by an existing stop signal (e.g. one wired to Ctrl-C).
    pub fn start_with(&self, request: RunRequest, stop: StopSignal) -> Result<RunHandle, EngineError> {
        if !lock(&self.transport).is_connected() {
            return Err(EngineError::NotConnected);
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::Busy);
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        let (tx, rx) = unbounded();
        let worker = Worker {
            transport: Arc::clone(&self.transport),
            inventory: Arc::clone(&self.inventory),
            clock: Arc::clone(&self.clock),
            limits: self.limits.clone(),
            events: tx,
            stop: stop.clone(),
        };
        let transport = Arc::clone(&self.transport);
        stop.on_stop(Box::new(move || abort_now(&*transport)));
        let worker_stop = stop.clone();
        let join = std::thread::Builder::new()
            .name("mixer-run".into())
            .spawn(move || {
                let outcome = worker.execute(&request);
                worker_stop.clear_hooks();
                drop(guard);
                worker.emit(ExecutionEvent::State(EngineState::Idle));
                worker.emit(ExecutionEvent::Finished(outcome.clone()));
                outcome
            })
            .map_err(|e| {
                stop.clear_hooks();
                EngineError::Spawn(e.to_string())
            })?;

        Ok(RunHandle {
            events: rx,
            stop,
            join: Some(join),
        })
    }

    /// Send `batchabort` now; safe with or without a run in flight.
    pub fn abort(&self) -> Result<(), EngineError> {
        send_command(&self.transport, &Command::BatchAbort, Stage::Clear, None, None)?;
        Ok(())
    }

    /// Fire a single pin once, outside batch mode. Refused while a run is active.
    pub fn pulse(&self, slave: u32, pin: u8, duration_ms: u64) -> Result<(), EngineError> {
        if self.is_active() {
            return Err(EngineError::Busy);
        }
        if duration_ms > self.limits.max_segment_ms {
            return Err(EngineError::PulseTooLong {
                requested_ms: duration_ms,
                max_ms: self.limits.max_segment_ms,
            });
        }
        if !lock(&self.transport).is_connected() {
            return Err(EngineError::NotConnected);
        }
        send_command(
            &self.transport,
            &Command::pulse(slave, pin, duration_ms),
            Stage::Pulse,
            None,
            None,
        )?;
        info!(slave, pin = %pin_label(pin), duration_ms, "pulse sent");
        Ok(())
    }
}

/// `batchabort` from outside the worker. When the worker is mid-send the
/// link is busy; it sends its own abort as soon as it sees the stop flag.
fn abort_now<T: Transport + ?Sized>(transport: &Mutex<T>) {
    let mut t = match transport.try_lock() {
        Ok(t) => t,
        Err(TryLockError::Poisoned(p)) => p.into_inner(),
        Err(TryLockError::WouldBlock) => {
            debug!("link busy, batchabort left to the run worker");
            return;
        }
    };
    if let Err(e) = t.send(&Command::BatchAbort.to_string()) {
        warn!(error = %e, "batchabort on stop failed");
    }
}

/// Clears the engine's active flag when the worker finishes, even on panic.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Caller's side of a running recipe.
pub struct RunHandle {
    events: Receiver<ExecutionEvent>,
    stop: StopSignal,
    join: Option<JoinHandle<RunOutcome>>,
}

impl RunHandle {
    pub fn events(&self) -> &Receiver<ExecutionEvent> {
        &self.events
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Request a stop and send `batchabort` immediately.
    ///
    /// The run halts at its next check, after the segment in flight.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the run to end.
    pub fn join(mut self) -> RunOutcome {
        match self.join.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => RunOutcome::Faulted("run worker panicked".into()),
            None => RunOutcome::Faulted("run already joined".into()),
        }
    }
}

fn send_command<T: Transport + ?Sized>(
    transport: &Mutex<T>,
    command: &Command,
    stage: Stage,
    node: Option<NodeUid>,
    ingredient: Option<&str>,
) -> Result<(), TransmissionError> {
    let line = command.to_string();
    let fail = |fault| TransmissionError {
        stage,
        node,
        ingredient: ingredient.map(str::to_string),
        fault,
    };
    let mut t = lock(transport);
    if !t.is_connected() {
        return Err(fail(LinkFault::Disconnected));
    }
    t.send(&line).map_err(|e| fail(map_transport_error(&*e)))?;
    debug!(%stage, command = %line, "sent");
    Ok(())
}

/// Ways a run leaves the happy path mid-flight.
enum Interrupt {
    Stopped,
    Failed(TransmissionError),
}

impl From<TransmissionError> for Interrupt {
    fn from(e: TransmissionError) -> Self {
        Interrupt::Failed(e)
    }
}

struct Worker<T, I> {
    transport: Arc<Mutex<T>>,
    inventory: Arc<Mutex<I>>,
    clock: Arc<dyn Clock + Send + Sync>,
    limits: ExecutionLimits,
    events: Sender<ExecutionEvent>,
    stop: StopSignal,
}

impl<T: Transport, I: Inventory> Worker<T, I> {
    fn emit(&self, event: ExecutionEvent) {
        // The caller may have dropped the receiver; the run still finishes.
        let _ = self.events.send(event);
    }

    fn state(&self, state: EngineState) {
        debug!(%state, "engine state");
        self.emit(ExecutionEvent::State(state));
    }

    fn log(&self, line: String) {
        info!("{line}");
        self.emit(ExecutionEvent::Log(line));
    }

    fn execute(&self, request: &RunRequest) -> RunOutcome {
        self.state(EngineState::CheckingStock);
        let pre = {
            let inv = lock(&self.inventory);
            preflight(
                &request.recipe,
                request.desired_g,
                &request.selection,
                &*inv,
                &self.limits,
            )
        };
        let pre = match pre {
            Ok(pre) if pre.plan.is_complete() => pre,
            Ok(pre) => return self.configuration_failed(pre.plan.errors),
            Err(e) => return self.configuration_failed(vec![e]),
        };

        self.log(format!(
            "{}: {} at scale {:.3} ({} segments)",
            pre.plan.recipe_name,
            format_grams(request.desired_g),
            pre.plan.scale_factor,
            pre.estimate.segment_count
        ));
        self.log(format!(
            "estimated runtime: sequential {}, parallel {}",
            format_duration(pre.estimate.sequential_ms),
            format_duration(pre.estimate.parallel_ms)
        ));
        self.emit(ExecutionEvent::Estimate(pre.estimate));

        if let Availability::Insufficient(shortfalls) = pre.availability {
            for s in &shortfalls {
                self.log(format!(
                    "insufficient stock for {}: need {}, have {}, missing {}",
                    s.name,
                    format_grams(s.needed_g),
                    format_grams(s.available_g),
                    format_grams(s.missing_g)
                ));
            }
            self.state(EngineState::AbortedStock);
            return RunOutcome::StockBlocked(shortfalls);
        }

        self.state(EngineState::Preparing);
        let result = send_command(&self.transport, &Command::BatchAbort, Stage::Clear, None, None)
            .map_err(Interrupt::from)
            .and_then(|()| match request.mode {
                ExecutionMode::Sequential => self.run_sequential(&pre.segments),
                ExecutionMode::Parallel => self.run_parallel(&pre.segments, pre.estimate.parallel_ms),
            });

        match result {
            Ok(()) => self.complete(&pre.plan),
            Err(Interrupt::Stopped) => {
                self.send_abort();
                self.state(EngineState::Stopped);
                self.log("run stopped; stock unchanged".into());
                RunOutcome::Stopped
            }
            Err(Interrupt::Failed(e)) => {
                self.state(EngineState::Aborting);
                warn!(error = %e, "send failed, aborting run");
                self.send_abort();
                self.log(format!("run aborted: {e}; stock unchanged"));
                RunOutcome::SendFailed(e)
            }
        }
    }

    fn configuration_failed(&self, errors: Vec<ConfigurationError>) -> RunOutcome {
        for e in &errors {
            self.log(format!("configuration error: {e}"));
        }
        RunOutcome::ConfigurationFailed(errors)
    }

    fn send_abort(&self) {
        if let Err(e) = send_command(&self.transport, &Command::BatchAbort, Stage::Clear, None, None) {
            warn!(error = %e, "batchabort failed");
        }
    }

    fn check_stop(&self) -> Result<(), Interrupt> {
        if self.stop.is_stopped() {
            Err(Interrupt::Stopped)
        } else {
            Ok(())
        }
    }

    /// Sleep `ms` in slices, returning early when stopped.
    fn wait(&self, ms: u64) -> Result<(), Interrupt> {
        let mut left = Duration::from_millis(ms);
        while !left.is_zero() {
            self.check_stop()?;
            let slice = left.min(WAIT_SLICE);
            self.clock.sleep(slice);
            left -= slice;
        }
        self.check_stop()
    }

    fn prepare(&self, batch: &TransmissionBatch) -> Result<(), Interrupt> {
        for seg in &batch.entries {
            self.emit(ExecutionEvent::Step(StepReport {
                ingredient: seg.ingredient.id,
                label: seg.label(),
                pump: seg.pump,
                node: seg.node,
                pin: seg.pin,
                duration_ms: seg.duration_ms,
                grams: seg.grams,
            }));
            self.log(format!(
                "{}: {} pump, node {}, pin {}, {}, {}",
                seg.label(),
                seg.pump,
                seg.node,
                pin_label(seg.pin),
                format_duration(seg.duration_ms),
                format_grams(seg.grams)
            ));
        }
        let names = batch.labels().join(", ");
        send_command(
            &self.transport,
            &Command::prepare(batch),
            Stage::Prepare,
            Some(batch.node),
            Some(&names),
        )?;
        self.clock
            .sleep(Duration::from_millis(self.limits.inter_command_delay_ms));
        Ok(())
    }

    fn trigger(&self, ingredient: Option<&str>) -> Result<(), Interrupt> {
        send_command(&self.transport, &Command::BatchRun, Stage::Trigger, None, ingredient)?;
        Ok(())
    }

    /// One segment at a time; each is prepared, fired and waited out.
    #[allow(clippy::cast_precision_loss)]
    fn run_sequential(&self, segments: &[ActuationSegment]) -> Result<(), Interrupt> {
        let total = segments.len();
        for (done, seg) in segments.iter().enumerate() {
            self.check_stop()?;
            if done == 0 {
                self.state(EngineState::Running);
            }
            let batch = TransmissionBatch {
                node: seg.node,
                entries: vec![seg.clone()],
                index_for_node: 1,
                batches_for_node: 1,
            };
            self.prepare(&batch)?;
            self.trigger(Some(&seg.label()))?;
            self.wait(seg.duration_ms.saturating_add(self.limits.sequential_settle_ms))?;
            self.emit(ExecutionEvent::Progress((done + 1) as f64 / total as f64));
        }
        Ok(())
    }

    /// Prepare every node, then one trigger fires them together.
    #[allow(clippy::cast_precision_loss)]
    fn run_parallel(&self, segments: &[ActuationSegment], parallel_ms: u64) -> Result<(), Interrupt> {
        let batches = group_by_node(segments, &self.limits);
        if batches.is_empty() {
            return Ok(());
        }
        let total = batches.len();
        for (done, batch) in batches.iter().enumerate() {
            self.check_stop()?;
            let repeated = batch.repeated_pins();
            if !repeated.is_empty() {
                let pins: Vec<String> = repeated.iter().map(|p| pin_label(*p)).collect();
                warn!(
                    node = %batch.node,
                    pins = %pins.join(","),
                    "batch repeats a pin; the node runs those pulses together, not back to back"
                );
                self.log(format!(
                    "warning: node {} batch repeats pin(s) {}; split pulses there overlap",
                    batch.node,
                    pins.join(", ")
                ));
            }
            if batch.batches_for_node > 1 {
                debug!(
                    node = %batch.node,
                    batch = batch.index_for_node,
                    of = batch.batches_for_node,
                    "node needs several batches"
                );
            }
            self.prepare(batch)?;
            self.emit(ExecutionEvent::Progress((done + 1) as f64 / total as f64 * 0.5));
        }
        self.check_stop()?;
        self.state(EngineState::Running);
        self.trigger(None)?;
        let settle = parallel_ms.saturating_add(self.limits.parallel_margin_ms);
        self.log(format!("all nodes fired; waiting {}", format_duration(settle)));
        self.wait(settle)?;
        self.emit(ExecutionEvent::Progress(1.0));
        Ok(())
    }

    fn complete(&self, plan: &Plan) -> RunOutcome {
        self.state(EngineState::Completed);
        let report = {
            let mut inv = lock(&self.inventory);
            consume(&plan.requests, &mut *inv)
        };
        for c in &report.consumed {
            self.log(format!(
                "{}: {} -> {} (-{})",
                c.name,
                format_grams(c.before_g),
                format_grams(c.after_g),
                format_grams(c.consumed_g)
            ));
        }
        for (id, err) in &report.failures {
            self.log(format!("stock of ingredient {id} not updated: {err}"));
        }
        RunOutcome::Completed {
            consumed: report.consumed,
            ledger_errors: report.failures,
        }
    }
}
