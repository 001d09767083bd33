// ── Live channel state machine ──
//
// Pure transition logic for the live alert channel. `Machine::step` takes
// an input and returns the effects the driver must perform; it never does
// I/O itself, so every transition is testable without sockets or timers.

use std::time::Duration;

use strum::Display;

use crate::bus::BusEvent;
use crate::config::ReconnectConfig;

/// Lifecycle of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Channel up, frames flowing.
    Open,
    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,
    /// Gave up: retries exhausted or the credential was refused.
    Failed,
    /// Closed on request.
    Closed,
}

impl ConnectionState {
    /// States in which the client holds (or is acquiring) a channel.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Reconnecting)
    }
}

/// Exponential backoff bookkeeping.
///
/// `attempt` counts consecutive failures since the channel was last open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max = self.config.max_delay;
        2u32.checked_pow(attempt)
            .and_then(|factor| self.config.base_delay.checked_mul(factor))
            .map_or(max, |delay| delay.min(max))
    }

    fn can_retry(&self) -> bool {
        self.attempt < self.config.max_attempts
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Something that happened to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Consumer asked for a (new) connection.
    Open,
    /// Handshake completed.
    ChannelOpened,
    /// Handshake failed, or an open channel errored, closed, or went idle.
    ChannelLost { permanent: bool, reason: String },
    /// Backoff timer elapsed.
    TimerFired,
    /// Consumer asked to retry after giving up.
    Reconnect,
    /// Consumer asked to shut down.
    Close,
}

/// Work the driver must carry out after a transition, in order.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Dial the current target.
    Connect,
    /// Drop the channel and any in-progress handshake.
    Teardown,
    /// Arm the backoff timer.
    Schedule(Duration),
    CancelTimer,
    Publish(BusEvent),
}

/// The channel's state plus its backoff policy.
#[derive(Debug, Clone)]
pub struct Machine {
    state: ConnectionState,
    policy: ReconnectPolicy,
}

impl Machine {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            policy: ReconnectPolicy::new(config),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Apply `input` and return the resulting effects.
    ///
    /// Inputs that make no sense in the current state (a stale timer, a
    /// late handshake after close) produce no effects.
    pub fn step(&mut self, input: Input) -> Vec<Effect> {
        use ConnectionState as S;

        match (self.state, input) {
            (_, Input::Close) => {
                if self.state == S::Closed {
                    return Vec::new();
                }
                let mut effects = vec![Effect::CancelTimer, Effect::Teardown];
                if self.state == S::Open {
                    effects.push(Effect::Publish(BusEvent::Disconnected {
                        reason: "closed".into(),
                    }));
                }
                self.state = S::Closed;
                effects
            }

            (previous, Input::Open) => {
                let mut effects = vec![Effect::CancelTimer, Effect::Teardown];
                if previous == S::Open {
                    effects.push(Effect::Publish(BusEvent::Disconnected {
                        reason: "reopened".into(),
                    }));
                }
                effects.push(Effect::Connect);
                self.policy.reset();
                self.state = S::Connecting;
                effects
            }

            (S::Connecting, Input::ChannelOpened) => {
                self.policy.reset();
                self.state = S::Open;
                vec![Effect::Publish(BusEvent::Connected)]
            }

            (previous @ (S::Connecting | S::Open), Input::ChannelLost { permanent, reason }) => {
                let mut effects = vec![Effect::Teardown];
                if previous == S::Open {
                    effects.push(Effect::Publish(BusEvent::Disconnected {
                        reason: reason.clone(),
                    }));
                }

                if permanent {
                    self.state = S::Failed;
                    effects.push(Effect::Publish(BusEvent::AuthRejected { reason }));
                } else if self.policy.can_retry() {
                    let delay = self.policy.delay_for(self.policy.attempt);
                    self.policy.attempt += 1;
                    self.state = S::Reconnecting;
                    effects.push(Effect::Schedule(delay));
                } else {
                    self.state = S::Failed;
                    effects.push(Effect::Publish(BusEvent::ReconnectExhausted {
                        attempts: self.policy.attempt,
                        last_error: reason,
                    }));
                }
                effects
            }

            (S::Reconnecting, Input::TimerFired) => {
                self.state = S::Connecting;
                vec![Effect::Connect]
            }

            (S::Failed, Input::Reconnect) => {
                self.policy.reset();
                self.state = S::Connecting;
                vec![Effect::Connect]
            }

            // Skip the remaining wait but keep the failure count.
            (S::Reconnecting, Input::Reconnect) => {
                self.state = S::Connecting;
                vec![Effect::CancelTimer, Effect::Connect]
            }

            _ => Vec::new(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lost() -> Input {
        Input::ChannelLost {
            permanent: false,
            reason: "connection reset".into(),
        }
    }

    fn scheduled(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|e| match e {
            Effect::Schedule(d) => Some(*d),
            _ => None,
        })
    }

    fn published(effects: &[Effect]) -> Vec<crate::bus::Topic> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Publish(ev) => Some(ev.topic()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = ReconnectPolicy::new(ReconnectConfig::default());
        let delays: Vec<u64> = (0..7).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, [1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
    }

    #[test]
    fn consecutive_failures_follow_backoff_then_fail() {
        let mut m = Machine::new(ReconnectConfig::default());
        m.step(Input::Open);

        let mut delays = Vec::new();
        for _ in 0..5 {
            let effects = m.step(lost());
            assert_eq!(m.state(), ConnectionState::Reconnecting);
            delays.push(scheduled(&effects).map(|d| d.as_secs()));
            assert!(matches!(m.step(Input::TimerFired).as_slice(), [Effect::Connect]));
        }
        assert_eq!(delays, [Some(1), Some(2), Some(4), Some(8), Some(16)]);

        let effects = m.step(lost());
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(scheduled(&effects), None);
        assert_eq!(published(&effects), [crate::bus::Topic::ReconnectExhausted]);
    }

    #[test]
    fn opening_resets_attempts() {
        let mut m = Machine::new(ReconnectConfig::default());
        m.step(Input::Open);
        m.step(lost());
        m.step(Input::TimerFired);
        m.step(lost());
        m.step(Input::TimerFired);
        assert_eq!(m.policy().attempt(), 2);

        let effects = m.step(Input::ChannelOpened);
        assert_eq!(m.state(), ConnectionState::Open);
        assert_eq!(m.policy().attempt(), 0);
        assert_eq!(published(&effects), [crate::bus::Topic::Connected]);

        let effects = m.step(lost());
        assert_eq!(scheduled(&effects), Some(Duration::from_secs(1)));
        assert_eq!(published(&effects), [crate::bus::Topic::Disconnected]);
    }

    #[test]
    fn permanent_loss_fails_without_spending_retries() {
        let mut m = Machine::new(ReconnectConfig::default());
        m.step(Input::Open);
        let effects = m.step(Input::ChannelLost {
            permanent: true,
            reason: "HTTP 401".into(),
        });
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.policy().attempt(), 0);
        assert_eq!(scheduled(&effects), None);
        assert_eq!(published(&effects), [crate::bus::Topic::AuthRejected]);
    }

    #[test]
    fn reconnect_from_failed_starts_fresh() {
        let config = ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        };
        let mut m = Machine::new(config);
        m.step(Input::Open);
        m.step(lost());
        assert_eq!(m.state(), ConnectionState::Failed);

        assert!(matches!(m.step(Input::Reconnect).as_slice(), [Effect::Connect]));
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn close_from_any_state_cancels_timer_and_tears_down() {
        let mut m = Machine::new(ReconnectConfig::default());
        m.step(Input::Open);
        m.step(lost());
        let effects = m.step(Input::Close);
        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(matches!(
            effects.as_slice(),
            [Effect::CancelTimer, Effect::Teardown]
        ));

        // Closing twice does nothing.
        assert!(m.step(Input::Close).is_empty());
        // Late events after close are ignored.
        assert!(m.step(Input::TimerFired).is_empty());
        assert!(m.step(Input::ChannelOpened).is_empty());
        assert_eq!(m.state(), ConnectionState::Closed);
    }

    #[test]
    fn reopen_while_open_tears_down_first() {
        let mut m = Machine::new(ReconnectConfig::default());
        m.step(Input::Open);
        m.step(Input::ChannelOpened);

        let effects = m.step(Input::Open);
        assert_eq!(m.state(), ConnectionState::Connecting);
        let teardown = effects
            .iter()
            .position(|e| matches!(e, Effect::Teardown))
            .unwrap_or(usize::MAX);
        let connect = effects
            .iter()
            .position(|e| matches!(e, Effect::Connect))
            .unwrap_or(0);
        assert!(teardown < connect);
    }

    #[test]
    fn stale_inputs_are_ignored() {
        let mut m = Machine::new(ReconnectConfig::default());
        assert!(m.step(Input::TimerFired).is_empty());
        assert!(m.step(Input::Reconnect).is_empty());
        assert!(m.step(lost()).is_empty());
        assert_eq!(m.state(), ConnectionState::Idle);

        m.step(Input::Open);
        m.step(Input::ChannelOpened);
        assert!(m.step(Input::TimerFired).is_empty());
        assert_eq!(m.state(), ConnectionState::Open);
    }
}
