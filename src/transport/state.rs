//! Connection lifecycle state machine.
//!
//! The machine is pure: it consumes [`MachineEvent`]s and returns the
//! [`Action`]s the driver has to carry out. No I/O or timers live here.

use std::time::Duration;

use serde::Serialize;

use super::backoff::BackoffPolicy;
use super::frames::{NORMAL_CLOSURE, POLICY_VIOLATION};

/// Lifecycle state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }

    fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconnection bookkeeping exposed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconnectState {
    /// Retries scheduled since the last successful open.
    pub attempts: u32,
    /// Delay used by the most recently scheduled retry.
    pub current_delay: Duration,
    /// Consecutive failures since the last successful open.
    pub failure_streak: u32,
}

impl ReconnectState {
    fn reset(&mut self, base_delay: Duration) {
        self.attempts = 0;
        self.current_delay = base_delay;
        self.failure_streak = 0;
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineEvent {
    /// Someone asked for a connection.
    ConnectRequested,
    /// The pending open succeeded.
    Opened,
    /// The channel closed, with the close code if the peer sent one.
    Closed { code: Option<u16> },
    /// Opening failed or the channel errored. Terminal failures never retry.
    Failed { terminal: bool },
    /// The scheduled retry delay has passed.
    RetryElapsed,
    /// Someone asked to tear the connection down.
    DisconnectRequested,
}

/// Side effect the driver must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Open,
    StartHeartbeat,
    StopHeartbeat,
    ScheduleRetry(Duration),
    CancelRetry,
    Close(u16),
    Publish(ConnectionState),
}

#[derive(Debug)]
pub struct TransportMachine {
    state: ConnectionState,
    reconnect: ReconnectState,
    policy: BackoffPolicy,
    manual_close: bool,
    retry_pending: bool,
}

impl TransportMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        let reconnect = ReconnectState {
            attempts: 0,
            current_delay: policy.base_delay,
            failure_streak: 0,
        };
        Self {
            state: ConnectionState::Disconnected,
            reconnect,
            policy,
            manual_close: false,
            retry_pending: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        self.reconnect
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Whether retries stopped because the attempt budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.state == ConnectionState::Error
            && !self.retry_pending
            && self.policy.is_exhausted(self.reconnect.attempts)
    }

    pub fn handle(&mut self, event: MachineEvent) -> Vec<Action> {
        let mut actions = Vec::new();
        match event {
            MachineEvent::ConnectRequested => {
                if self.state.is_live() {
                    return actions;
                }
                self.manual_close = false;
                if self.retry_pending {
                    self.retry_pending = false;
                    actions.push(Action::CancelRetry);
                }
                // An explicit request always starts a fresh attempt budget,
                // which is also the way out of exhaustion.
                self.reconnect.attempts = 0;
                self.reconnect.current_delay = self.policy.base_delay;
                self.begin_open(&mut actions);
            }
            MachineEvent::RetryElapsed => {
                if !self.retry_pending {
                    return actions;
                }
                self.retry_pending = false;
                if self.manual_close || self.state.is_live() {
                    return actions;
                }
                self.begin_open(&mut actions);
            }
            MachineEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    return actions;
                }
                self.reconnect.reset(self.policy.base_delay);
                self.transition(ConnectionState::Connected, &mut actions);
                actions.push(Action::StartHeartbeat);
            }
            MachineEvent::Closed { code } => {
                if !self.state.is_live() {
                    return actions;
                }
                actions.push(Action::StopHeartbeat);
                self.transition(ConnectionState::Disconnected, &mut actions);
                if self.manual_close || code == Some(POLICY_VIOLATION) {
                    return actions;
                }
                self.reconnect.failure_streak += 1;
                self.schedule_retry(&mut actions);
            }
            MachineEvent::Failed { terminal } => {
                if self.state == ConnectionState::Disconnected && self.manual_close {
                    return actions;
                }
                actions.push(Action::StopHeartbeat);
                self.transition(ConnectionState::Error, &mut actions);
                self.reconnect.failure_streak += 1;
                if terminal || self.manual_close {
                    if self.retry_pending {
                        self.retry_pending = false;
                        actions.push(Action::CancelRetry);
                    }
                    return actions;
                }
                if !self.retry_pending {
                    self.schedule_retry(&mut actions);
                }
            }
            MachineEvent::DisconnectRequested => {
                self.manual_close = true;
                if self.retry_pending {
                    self.retry_pending = false;
                    actions.push(Action::CancelRetry);
                }
                actions.push(Action::StopHeartbeat);
                if self.state.is_live() {
                    actions.push(Action::Close(NORMAL_CLOSURE));
                }
                self.transition(ConnectionState::Disconnected, &mut actions);
            }
        }
        actions
    }

    fn begin_open(&mut self, actions: &mut Vec<Action>) {
        self.transition(ConnectionState::Connecting, actions);
        actions.push(Action::Open);
    }

    fn schedule_retry(&mut self, actions: &mut Vec<Action>) {
        if self.policy.is_exhausted(self.reconnect.attempts) {
            self.transition(ConnectionState::Error, actions);
            return;
        }
        let delay = self.policy.delay_for(self.reconnect.attempts);
        self.reconnect.attempts += 1;
        self.reconnect.current_delay = delay;
        self.retry_pending = true;
        actions.push(Action::ScheduleRetry(delay));
    }

    fn transition(&mut self, next: ConnectionState, actions: &mut Vec<Action>) {
        if self.state != next {
            self.state = next;
            actions.push(Action::Publish(next));
        }
    }
}
