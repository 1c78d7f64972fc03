//! Automatic session refresh.
//!
//! ## Lifecycle
//!
//! ```text
//! Disarmed ──Arm──► Armed ──Fire──► Firing
//!    ▲                │  ◄──Settle───┘ │
//!    └────Disarm──────┴────Disarm──────┘
//! ```
//!
//! While armed, a background task runs the refresh action every interval
//! (first run one interval after arming) and on focus events. A focus event
//! within one interval of the last refresh is ignored. Disarming aborts the
//! task; a request already dispatched may still complete and is sequenced
//! like any other.

use crate::focus::FocusSignal;
use crate::provider::ProviderKind;
use crate::session::SessionManager;
use crate::{AuthError, AuthResult};
use auth_config::SessionRefreshConfig;
use rust_fsm::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub scheduler_machine(Disarmed)

    Disarmed => {
        Arm => Armed
    },
    Armed => {
        Fire => Firing,
        Disarm => Disarmed
    },
    Firing => {
        Settle => Armed,
        Disarm => Disarmed
    }
}

pub use scheduler_machine::Input as SchedulerInput;
pub use scheduler_machine::State as SchedulerState;
pub use scheduler_machine::StateMachine as SchedulerMachine;

/// What a scheduled run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    GetSession,
    Refresh,
}

impl RefreshAction {
    /// Token rotation for the refresh provider, a session fetch otherwise.
    pub fn default_for(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Refresh => RefreshAction::Refresh,
            ProviderKind::AuthJs | ProviderKind::Local => RefreshAction::GetSession,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timer,
    Focus,
}

pub struct RefreshScheduler {
    session: Arc<SessionManager>,
    interval: Option<Duration>,
    on_focus: bool,
    action: RefreshAction,
    machine: Arc<Mutex<SchedulerMachine>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(session: Arc<SessionManager>, config: &SessionRefreshConfig) -> Self {
        let action = RefreshAction::default_for(session.provider().kind());
        Self {
            session,
            interval: config.interval(),
            on_focus: config.enable_on_window_focus,
            action,
            machine: Arc::new(Mutex::new(SchedulerMachine::new())),
            task: Mutex::new(None),
        }
    }

    /// Override the action run on each trigger.
    pub fn with_action(mut self, action: RefreshAction) -> Self {
        self.action = action;
        self
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn on_focus(&self) -> bool {
        self.on_focus
    }

    pub fn action(&self) -> RefreshAction {
        self.action
    }

    pub fn state(&self) -> SchedulerState {
        self.machine.lock().unwrap().state().clone()
    }

    pub fn is_armed(&self) -> bool {
        self.state() != SchedulerState::Disarmed
    }

    /// Start the background task.
    ///
    /// Returns false when neither trigger is enabled or the scheduler is
    /// already armed.
    pub fn arm(&self, focus: &FocusSignal) -> AuthResult<bool> {
        if self.interval.is_none() && !self.on_focus {
            debug!("Session refresh disabled, not arming");
            return Ok(false);
        }

        let mut task = self.task.lock().unwrap();
        if self.is_armed() {
            return Ok(false);
        }
        transition(&self.machine, &SchedulerInput::Arm)?;

        let focus_rx = self.on_focus.then(|| focus.subscribe());
        *task = Some(tokio::spawn(run_loop(
            Arc::clone(&self.session),
            Arc::clone(&self.machine),
            self.interval,
            focus_rx,
            self.action,
        )));

        debug!(
            interval_ms = self.interval.map(|d| d.as_millis() as u64),
            on_focus = self.on_focus,
            action = ?self.action,
            "Refresh scheduler armed"
        );
        Ok(true)
    }

    /// Stop the background task. Nothing fires afterwards.
    pub fn disarm(&self) {
        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        if self.is_armed() {
            if let Err(e) = transition(&self.machine, &SchedulerInput::Disarm) {
                warn!(error = %e, "Failed to disarm refresh scheduler");
            }
            debug!("Refresh scheduler disarmed");
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

fn transition(machine: &Mutex<SchedulerMachine>, input: &SchedulerInput) -> AuthResult<()> {
    let mut machine = machine.lock().unwrap();
    machine.consume(input).map_err(|_| {
        AuthError::InvalidStateTransition(format!(
            "Cannot apply {:?} in state {:?}",
            input,
            machine.state()
        ))
    })?;
    Ok(())
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn next_focus(focus_rx: &mut Option<broadcast::Receiver<()>>) -> Result<(), RecvError> {
    match focus_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_loop(
    session: Arc<SessionManager>,
    machine: Arc<Mutex<SchedulerMachine>>,
    period: Option<Duration>,
    mut focus_rx: Option<broadcast::Receiver<()>>,
    action: RefreshAction,
) {
    let mut ticker = period.and_then(|period| match Instant::now().checked_add(period) {
        Some(first) => {
            let mut ticker = interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(ticker)
        }
        None => {
            warn!(
                interval_ms = period.as_millis() as u64,
                "Refresh interval out of range, timer disabled"
            );
            None
        }
    });
    let mut last_run: Option<Instant> = None;

    loop {
        let trigger = tokio::select! {
            _ = next_tick(&mut ticker) => Trigger::Timer,
            received = next_focus(&mut focus_rx) => match received {
                Ok(()) | Err(RecvError::Lagged(_)) => Trigger::Focus,
                Err(RecvError::Closed) => {
                    focus_rx = None;
                    continue;
                }
            },
        };

        if trigger == Trigger::Focus {
            if let Some(period) = period {
                let last = session.state().last_refreshed_instant().max(last_run);
                if last.is_some_and(|last| last.elapsed() < period) {
                    debug!("Focus within refresh interval, skipping");
                    continue;
                }
            }
        }

        if transition(&machine, &SchedulerInput::Fire).is_err() {
            break;
        }

        let result = match action {
            RefreshAction::GetSession => session.get_session(false).await.map(|_| ()),
            RefreshAction::Refresh => session.refresh().await,
        };
        match result {
            Ok(()) => debug!(trigger = ?trigger, "Scheduled refresh complete"),
            Err(AuthError::NotLoggedIn) => debug!("Nothing to refresh, not logged in"),
            Err(e) => warn!(error = %e, trigger = ?trigger, "Scheduled refresh failed"),
        }
        last_run = Some(Instant::now());

        if transition(&machine, &SchedulerInput::Settle).is_err() {
            break;
        }
    }
}
