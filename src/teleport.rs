//! Delayed, cancelable teleports ("warmups").
//!
//! Per player: idle -> warmup scheduled -> executed | canceled -> idle.
//! Every scheduled warmup carries an id; the timer only acts when the id is
//! still the one stored for that player, so a replaced or canceled warmup
//! can never move anyone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::back::BackHistory;
use crate::model::{BackCause, Location, PlayerId, TeleportCause};
use crate::notify::{Notification, Notifier};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::world::WorldAccess;

#[derive(Clone, Debug, PartialEq)]
pub enum Destination {
    Location(Location),
    /// Wherever that player stands when the warmup completes.
    Player(PlayerId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeleportOutcome {
    Executed,
    Scheduled,
    /// The player or the destination player was not online.
    Unavailable,
}

struct Warmup {
    id: u64,
    origin: Location,
    destination: Destination,
    cause: TeleportCause,
    timer: TaskHandle,
}

#[derive(Default)]
struct TeleportState {
    warmups: HashMap<PlayerId, Warmup>,
    grace_until: HashMap<PlayerId, Instant>,
    next_id: u64,
}

pub struct TeleportOrchestrator {
    world: Arc<dyn WorldAccess>,
    notifier: Arc<dyn Notifier>,
    back: Arc<BackHistory>,
    scheduler: Scheduler,
    movement_tolerance: f64,
    grace: Duration,
    state: Mutex<TeleportState>,
    this: Weak<TeleportOrchestrator>,
}

impl TeleportOrchestrator {
    pub fn new(
        world: Arc<dyn WorldAccess>,
        notifier: Arc<dyn Notifier>,
        back: Arc<BackHistory>,
        scheduler: Scheduler,
        movement_tolerance: f64,
        grace: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            world,
            notifier,
            back,
            scheduler,
            movement_tolerance,
            grace,
            state: Mutex::new(TeleportState::default()),
            this: this.clone(),
        })
    }

    /// Starts a teleport, replacing any warmup the player already has.
    /// A zero warmup moves the player right away.
    pub fn request_teleport(
        &self,
        player: PlayerId,
        destination: Destination,
        warmup: Duration,
        cause: TeleportCause,
    ) -> TeleportOutcome {
        if warmup.is_zero() {
            self.cancel(player);
            return if self.execute(player, &destination, cause) {
                TeleportOutcome::Executed
            } else {
                TeleportOutcome::Unavailable
            };
        }

        {
            // Checked under the lock so a concurrent quit either sees the
            // new warmup or this call sees the player gone.
            let mut state = self.state.lock().unwrap();
            if let Some(previous) = state.warmups.remove(&player) {
                previous.timer.cancel();
                log::debug!("replaced warmup {} of {player}", previous.id);
            }
            let Some(origin) = self.world.location(player) else {
                return TeleportOutcome::Unavailable;
            };
            state.next_id += 1;
            let id = state.next_id;
            let this = self.this.clone();
            let timer = self.scheduler.after(warmup, move || {
                if let Some(orchestrator) = this.upgrade() {
                    orchestrator.fire(player, id);
                }
            });
            state.warmups.insert(
                player,
                Warmup {
                    id,
                    origin,
                    destination,
                    cause,
                    timer,
                },
            );
            log::debug!("warmup {id} scheduled for {player} in {warmup:?}");
        }

        self.notifier.notify(
            player,
            Notification::WarmupStarted {
                delay: warmup,
                cause,
            },
        );
        TeleportOutcome::Scheduled
    }

    fn fire(&self, player: PlayerId, id: u64) {
        let warmup = {
            let mut state = self.state.lock().unwrap();
            match state.warmups.get(&player) {
                Some(current) if current.id == id => state.warmups.remove(&player),
                _ => None,
            }
        };
        let Some(warmup) = warmup else {
            log::warn!("warmup timer {id} for {player} fired after being replaced; ignoring");
            return;
        };
        if self.execute(player, &warmup.destination, warmup.cause) {
            return;
        }
        if !self.world.is_online(player) {
            log::debug!("{player} left before warmup {id} completed");
            return;
        }
        self.notifier.notify(
            player,
            Notification::Denied {
                reason: "Your teleport destination is no longer available.".to_string(),
            },
        );
    }

    fn execute(&self, player: PlayerId, destination: &Destination, cause: TeleportCause) -> bool {
        let target = {
            let mut state = self.state.lock().unwrap();
            let target = match destination {
                Destination::Location(location) => Some(location.clone()),
                Destination::Player(other) => self.world.location(*other),
            };
            let (Some(target), Some(from)) = (target, self.world.location(player)) else {
                return false;
            };
            self.back.record(player, from, BackCause::Teleported);
            state.grace_until.insert(player, Instant::now() + self.grace);
            target
        };
        self.world.move_player(player, &target);
        log::debug!("teleported {player} to {target} ({cause:?})");
        self.notifier.notify(player, Notification::Teleported { cause });
        true
    }

    /// Feeds a movement report. Moving further than the tolerance from where
    /// the warmup started cancels it, except right after our own teleport.
    pub fn on_move(&self, player: PlayerId, to: &Location) {
        let canceled = {
            let mut state = self.state.lock().unwrap();
            if let Some(until) = state.grace_until.get(&player).copied() {
                if Instant::now() < until {
                    return;
                }
                state.grace_until.remove(&player);
            }
            let moved_too_far = state
                .warmups
                .get(&player)
                .is_some_and(|warmup| warmup.origin.distance(to) > self.movement_tolerance);
            if moved_too_far {
                state.warmups.remove(&player)
            } else {
                None
            }
        };

        if let Some(warmup) = canceled {
            warmup.timer.cancel();
            log::debug!("warmup {} of {player} canceled by movement", warmup.id);
            self.notifier.notify(
                player,
                Notification::WarmupCanceled {
                    cause: warmup.cause,
                },
            );
        }
    }

    /// Drops the player's warmup without telling them. Returns whether one existed.
    pub fn cancel(&self, player: PlayerId) -> bool {
        let removed = self.state.lock().unwrap().warmups.remove(&player);
        match removed {
            Some(warmup) => {
                warmup.timer.cancel();
                log::debug!("warmup {} of {player} canceled", warmup.id);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, player: PlayerId) -> bool {
        self.state.lock().unwrap().warmups.contains_key(&player)
    }

    pub fn remove_player(&self, player: PlayerId) {
        self.cancel(player);
        self.state.lock().unwrap().grace_until.remove(&player);
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        let state = self.state.lock().unwrap();
        state.warmups.contains_key(&player) || state.grace_until.contains_key(&player)
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, warmup) in state.warmups.drain() {
            warmup.timer.cancel();
        }
        state.grace_until.clear();
    }
}
