//! Periodic and event-triggered rescans
//!
//! A single tokio task owns the scheduler state and receives commands over a
//! channel, so a periodic tick and a debounced rescan can never overlap: there
//! is only ever one pending deadline, and re-arming replaces it.
//!
//! ```text
//!   Idle --start--> Scheduled --deadline--> Running --done--> Scheduled (+interval)
//!    ^                 |  ^                     |
//!    +------stop-------+  +--ui change (+debounce)
//! ```
//!
//! Each session carries a [`CancellationToken`]. [`ScanScheduler::stop`]
//! cancels it before the stop message is even queued, so a deadline that is
//! already due cannot start another tick, and a tick in flight can see that
//! its result is no longer wanted.

use crate::platforms::UiEvent;
use crate::AutomationError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default delay between the end of one tick and the start of the next.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

/// Default quiet period after a UI-change notification before rescanning.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// One unit of scheduled work.
#[async_trait]
pub trait ScanTick: Send + Sync + 'static {
    /// Run one scan. `cancel` fires when the session that scheduled this tick
    /// is stopped; implementations must not apply results once it has.
    async fn tick(&self, cancel: CancellationToken);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    pub interval: Duration,
    pub debounce: Duration,
    /// Delay before the first tick after start.
    pub initial_delay: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SCAN_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            initial_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
pub(crate) enum SchedulerCommand {
    Start(CancellationToken),
    Stop,
    UiChanged,
    Shutdown,
}

/// Cloneable handle the host uses to report UI changes.
///
/// Safe to call from any thread; it only enqueues a message.
#[derive(Debug, Clone)]
pub struct UiEventSink {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
}

impl UiEventSink {
    /// Report a UI change. Kinds that cannot reveal a new target are ignored.
    pub fn notify(&self, event: &UiEvent) {
        if !event.kind.triggers_rescan() {
            trace!("Ignoring UI event {:?}", event.kind);
            return;
        }
        let _ = self.commands.send(SchedulerCommand::UiChanged);
    }
}

/// Handle to the scheduler loop.
pub struct ScanScheduler {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    session: Mutex<CancellationToken>,
    state: watch::Receiver<SchedulerState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScanScheduler {
    /// Spawn the scheduler loop on the current tokio runtime.
    pub fn spawn(
        tick: Arc<dyn ScanTick>,
        timing: SchedulerTiming,
    ) -> Result<Self, AutomationError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            AutomationError::PlatformError(format!("Scan scheduler needs a tokio runtime: {e}"))
        })?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SchedulerState::Idle);
        let idle = CancellationToken::new();
        idle.cancel();

        let control = ControlLoop {
            tick,
            timing,
            commands: receiver,
            state: state_tx,
            token: idle.clone(),
            deadline: None,
        };
        let task = runtime.spawn(control.run());

        Ok(Self {
            commands,
            session: Mutex::new(idle),
            state,
            task: Mutex::new(Some(task)),
        })
    }

    /// Begin ticking with a fresh session token.
    pub fn start(&self) {
        let token = CancellationToken::new();
        {
            let mut session = self.session.lock();
            session.cancel();
            *session = token.clone();
        }
        if self.commands.send(SchedulerCommand::Start(token)).is_err() {
            warn!("Scan scheduler loop has exited, start ignored");
        }
    }

    /// Stop ticking. No tick starts after this returns.
    pub fn stop(&self) {
        self.session.lock().cancel();
        let _ = self.commands.send(SchedulerCommand::Stop);
    }

    /// Request a debounced rescan. Ignored while idle.
    pub fn notify_ui_changed(&self) {
        let _ = self.commands.send(SchedulerCommand::UiChanged);
    }

    pub fn event_sink(&self) -> UiEventSink {
        UiEventSink {
            commands: self.commands.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Stop and end the loop. A tick in flight is allowed to finish.
    pub fn shutdown(&self) {
        self.session.lock().cancel();
        let _ = self.commands.send(SchedulerCommand::Shutdown);
    }

    /// Shut down and wait for the loop to exit.
    pub async fn join(&self) {
        self.shutdown();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What happens once the running tick finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterTick {
    Rearm,
    Debounce(Instant),
    Restart,
    Halt,
}

struct ControlLoop {
    tick: Arc<dyn ScanTick>,
    timing: SchedulerTiming,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    state: watch::Sender<SchedulerState>,
    token: CancellationToken,
    /// The single pending tick, if any.
    deadline: Option<Instant>,
}

impl ControlLoop {
    async fn run(mut self) {
        loop {
            let Some(deadline) = self.deadline else {
                match self.commands.recv().await {
                    Some(command) => {
                        if self.apply(command) {
                            continue;
                        }
                        break;
                    }
                    None => break,
                }
            };

            let token = self.token.clone();
            tokio::select! {
                biased;
                command = self.commands.recv() => {
                    let keep_running = command.is_some_and(|c| self.apply(c));
                    if !keep_running {
                        break;
                    }
                }
                _ = token.cancelled() => self.disarm(),
                _ = sleep_until(deadline) => {
                    if !self.run_tick().await {
                        break;
                    }
                }
            }
        }
        self.token.cancel();
        self.set_state(SchedulerState::Idle);
        debug!("Scan scheduler loop exited");
    }

    /// Handle a command while no tick is running. Returns false on shutdown.
    fn apply(&mut self, command: SchedulerCommand) -> bool {
        match command {
            SchedulerCommand::Start(token) => {
                self.token = token;
                if self.deadline.is_none() {
                    self.arm(Instant::now() + self.timing.initial_delay);
                }
            }
            SchedulerCommand::Stop => self.disarm(),
            SchedulerCommand::UiChanged => {
                if self.deadline.is_some() && !self.token.is_cancelled() {
                    trace!("UI changed, rescanning in {:?}", self.timing.debounce);
                    self.arm(Instant::now() + self.timing.debounce);
                }
            }
            SchedulerCommand::Shutdown => return false,
        }
        true
    }

    /// Run the due tick, still listening for commands. Returns false on shutdown.
    async fn run_tick(&mut self) -> bool {
        self.deadline = None;
        if self.token.is_cancelled() {
            self.set_state(SchedulerState::Idle);
            return true;
        }
        self.set_state(SchedulerState::Running);

        let tick = Arc::clone(&self.tick);
        let mut work = tick.tick(self.token.clone());
        let mut next = AfterTick::Rearm;
        let mut open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut work => break,
                command = self.commands.recv(), if open => match command {
                    Some(SchedulerCommand::Start(token)) => {
                        self.token = token;
                        if next == AfterTick::Halt {
                            next = AfterTick::Restart;
                        }
                    }
                    Some(SchedulerCommand::Stop) => next = AfterTick::Halt,
                    Some(SchedulerCommand::UiChanged) => {
                        if next != AfterTick::Halt {
                            next = AfterTick::Debounce(Instant::now() + self.timing.debounce);
                        }
                    }
                    Some(SchedulerCommand::Shutdown) | None => {
                        open = false;
                        next = AfterTick::Halt;
                    }
                },
            }
        }

        if !open {
            return false;
        }
        let now = Instant::now();
        match next {
            _ if self.token.is_cancelled() => self.disarm(),
            AfterTick::Halt => self.disarm(),
            AfterTick::Rearm => self.arm(now + self.timing.interval),
            AfterTick::Debounce(at) => self.arm(at.max(now)),
            AfterTick::Restart => self.arm(now + self.timing.initial_delay),
        }
        true
    }

    fn arm(&mut self, at: Instant) {
        self.deadline = Some(at);
        self.set_state(SchedulerState::Scheduled);
    }

    fn disarm(&mut self) {
        self.deadline = None;
        self.set_state(SchedulerState::Idle);
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::UiEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{advance, sleep};

    /// Records when each tick started, optionally taking time itself.
    struct RecordingTick {
        started: Mutex<Vec<Instant>>,
        cancelled_on_finish: AtomicUsize,
        work: Duration,
    }

    impl RecordingTick {
        fn new(work: Duration) -> Arc<Self> {
            Arc::new(Self {
                started: Mutex::new(Vec::new()),
                cancelled_on_finish: AtomicUsize::new(0),
                work,
            })
        }

        fn count(&self) -> usize {
            self.started.lock().len()
        }

        fn offsets_from(&self, origin: Instant) -> Vec<u128> {
            self.started
                .lock()
                .iter()
                .map(|t| t.duration_since(origin).as_millis())
                .collect()
        }
    }

    #[async_trait]
    impl ScanTick for RecordingTick {
        async fn tick(&self, cancel: CancellationToken) {
            self.started.lock().push(Instant::now());
            if !self.work.is_zero() {
                sleep(self.work).await;
            }
            if cancel.is_cancelled() {
                self.cancelled_on_finish.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn spawn(tick: &Arc<RecordingTick>) -> ScanScheduler {
        ScanScheduler::spawn(tick.clone(), SchedulerTiming::default()).unwrap()
    }

    /// Let the control loop drain its queue without moving the clock much.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_tick_per_interval_until_stop() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);
        let origin = Instant::now();

        scheduler.start();
        sleep(Duration::from_millis(3500)).await;
        assert_eq!(tick.offsets_from(origin), vec![0, 1000, 2000, 3000]);

        scheduler.stop();
        sleep(Duration::from_millis(5000)).await;
        assert_eq!(tick.count(), 4);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_pending_deadline_prevents_tick() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);

        scheduler.start();
        settle().await;
        assert_eq!(tick.count(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);

        // A deadline is pending at 1000ms.
        advance(Duration::from_millis(500)).await;
        scheduler.stop();
        sleep(Duration::from_millis(3000)).await;
        assert_eq!(tick.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_bursts() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);
        let origin = Instant::now();

        scheduler.start();
        settle().await;
        assert_eq!(tick.count(), 1);

        // Three notifications 200ms apart; the last one lands at 700ms, so
        // the periodic tick due at 1000ms is replaced by one at 1200ms.
        sleep(Duration::from_millis(299)).await;
        scheduler.notify_ui_changed();
        sleep(Duration::from_millis(200)).await;
        scheduler.notify_ui_changed();
        sleep(Duration::from_millis(200)).await;
        scheduler.notify_ui_changed();
        let last = Instant::now();

        sleep(Duration::from_millis(499)).await;
        assert_eq!(tick.count(), 1, "no rescan before the quiet period ends");
        sleep(Duration::from_millis(2)).await;
        assert_eq!(tick.count(), 2);

        let offsets = tick.offsets_from(origin);
        assert_eq!(offsets[1], (last + DEFAULT_DEBOUNCE - origin).as_millis());
        assert_eq!(offsets[1], 1200);

        // Periodic ticking resumes from the debounced tick.
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(tick.offsets_from(origin), vec![0, 1200, 2200]);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ui_events_ignored_while_idle() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);
        let sink = scheduler.event_sink();

        sink.notify(&UiEvent::new(UiEventKind::WindowContentChanged));
        scheduler.notify_ui_changed();
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(tick.count(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_irrelevant_event_kinds_do_not_reschedule() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);
        let sink = scheduler.event_sink();

        scheduler.start();
        settle().await;
        sink.notify(&UiEvent::new(UiEventKind::ViewFocused));
        sleep(Duration::from_millis(600)).await;
        assert_eq!(tick.count(), 1);
        sleep(Duration::from_millis(400)).await;
        assert_eq!(tick.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_after_slow_tick() {
        let tick = RecordingTick::new(Duration::from_millis(300));
        let scheduler = spawn(&tick);
        let origin = Instant::now();

        scheduler.start();
        sleep(Duration::from_millis(2700)).await;
        assert_eq!(tick.offsets_from(origin), vec![0, 1300, 2600]);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_during_running_tick_debounces_after_completion() {
        let tick = RecordingTick::new(Duration::from_millis(300));
        let scheduler = spawn(&tick);
        let origin = Instant::now();

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.notify_ui_changed();

        sleep(Duration::from_millis(600)).await;
        assert_eq!(tick.offsets_from(origin), vec![0, 600]);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_running_tick_does_not_rearm() {
        let tick = RecordingTick::new(Duration::from_millis(300));
        let scheduler = spawn(&tick);

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        sleep(Duration::from_millis(3000)).await;

        assert_eq!(tick.count(), 1);
        assert_eq!(tick.cancelled_on_finish.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);

        scheduler.start();
        settle().await;
        scheduler.stop();
        settle().await;
        scheduler.start();
        settle().await;
        assert_eq!(tick.count(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_ends_loop() {
        let tick = RecordingTick::new(Duration::ZERO);
        let scheduler = spawn(&tick);
        scheduler.start();
        settle().await;
        scheduler.join().await;
        sleep(Duration::from_millis(3000)).await;
        assert_eq!(tick.count(), 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let tick = RecordingTick::new(Duration::ZERO);
        let result = ScanScheduler::spawn(tick, SchedulerTiming::default());
        assert!(matches!(result, Err(AutomationError::PlatformError(_))));
    }
}
