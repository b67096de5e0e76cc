//! Per-lobby round timer.
//!
//! One task per running turn ticks every [`TICK_INTERVAL`] and calls back
//! into its lobby. Each task is bound to the lobby epoch it was started for;
//! the lobby checks that epoch under its lock before applying a tick, so a
//! task that has been superseded can never mutate the next turn.

use std::sync::Weak;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::config::TICK_INTERVAL;
use super::lobby::{Lobby, LobbyId};

/// Source of wall-clock time for a lobby.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock time that follows the tokio clock, so paused-time tests see
/// deadlines pass.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    base: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}

/// Handle to a running timer task.
#[derive(Debug)]
pub(super) struct RoundTimer {
    epoch: u64,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RoundTimer {
    /// Start ticking for `epoch`. Returns `None` outside a tokio runtime.
    pub fn spawn(lobby_id: LobbyId, lobby: Weak<Lobby>, epoch: u64) -> Option<Self> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(lobby = %lobby_id, error = %e, "no runtime for round timer");
                return None;
            }
        };

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = runtime.spawn(run(lobby_id, lobby, epoch, cancel_rx));
        Some(Self {
            epoch,
            cancel,
            handle,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Ask the task to stop before its next tick.
    pub fn cancel(self) -> JoinHandle<()> {
        let _ = self.cancel.send(true);
        self.handle
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn run(
    lobby_id: LobbyId,
    lobby: Weak<Lobby>,
    epoch: u64,
    mut cancel_rx: watch::Receiver<bool>,
) {
    debug!(lobby = %lobby_id, epoch, "round timer started");

    let mut ticker = tokio::time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.changed() => break,
            _ = ticker.tick() => {
                let Some(lobby) = lobby.upgrade() else {
                    break;
                };
                if !lobby.on_tick(epoch) {
                    break;
                }
            }
        }
    }

    debug!(lobby = %lobby_id, epoch, "round timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_virtual_time() {
        let base = Utc::now();
        let clock = TokioClock::starting_at(base);
        tokio::time::sleep(std::time::Duration::from_secs(90)).await;
        assert_eq!((clock.now() - base).num_seconds(), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_when_lobby_is_gone() {
        let timer = RoundTimer::spawn(LobbyId::new(), Weak::new(), 1).unwrap();
        assert_eq!(timer.epoch(), 1);
        tokio::time::sleep(TICK_INTERVAL * 2).await;
        assert!(timer.is_finished());
    }

    #[tokio::test]
    async fn test_cancel_stops_task() {
        let timer = RoundTimer::spawn(LobbyId::new(), Weak::new(), 1).unwrap();
        let handle = timer.cancel();
        tokio::time::timeout(TICK_INTERVAL / 2, handle)
            .await
            .expect("timer did not observe cancellation")
            .unwrap();
    }

    #[test]
    fn test_spawn_outside_runtime() {
        assert!(RoundTimer::spawn(LobbyId::new(), Weak::new(), 1).is_none());
    }
}
