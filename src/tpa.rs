//! Teleport requests (`/tpa`, `/tpahere`).
//!
//! Pending requests are grouped by target, newest last. At most one request
//! exists per (requester, target) pair; a new one replaces the old one and
//! its expiry timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::time::Instant;

use crate::cooldown::{CATEGORY_TPA, CooldownTracker};
use crate::error::{ErrorKind, RequestError};
use crate::model::{PlayerId, TeleportCause, TpaDirection};
use crate::notify::{Notification, Notifier};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::teleport::{Destination, TeleportOrchestrator, TeleportOutcome};
use crate::world::WorldAccess;

#[derive(Clone, Copy, Debug)]
pub struct TpaSettings {
    pub expiry: Duration,
    pub cooldown: Duration,
    /// Warmup applied to the player who moves once a request is accepted.
    pub warmup: Duration,
}

struct PendingRequest {
    id: u64,
    requester: PlayerId,
    direction: TpaDirection,
    expires_at: Instant,
    timer: TaskHandle,
}

#[derive(Default)]
struct BrokerState {
    by_target: HashMap<PlayerId, Vec<PendingRequest>>,
    next_id: u64,
}

impl BrokerState {
    fn take(&mut self, target: PlayerId, requester: Option<PlayerId>) -> Option<PendingRequest> {
        let list = self.by_target.get_mut(&target)?;
        let index = match requester {
            Some(requester) => list.iter().position(|r| r.requester == requester)?,
            None => list.len().checked_sub(1)?,
        };
        let request = list.remove(index);
        if list.is_empty() {
            self.by_target.remove(&target);
        }
        Some(request)
    }

    fn take_by_id(&mut self, target: PlayerId, id: u64) -> Option<PendingRequest> {
        let list = self.by_target.get_mut(&target)?;
        let index = list.iter().position(|r| r.id == id)?;
        let request = list.remove(index);
        if list.is_empty() {
            self.by_target.remove(&target);
        }
        Some(request)
    }
}

pub struct RequestBroker {
    world: Arc<dyn WorldAccess>,
    notifier: Arc<dyn Notifier>,
    cooldowns: Arc<CooldownTracker>,
    teleports: Arc<TeleportOrchestrator>,
    scheduler: Scheduler,
    settings: TpaSettings,
    state: Mutex<BrokerState>,
    this: Weak<RequestBroker>,
}

impl RequestBroker {
    pub fn new(
        world: Arc<dyn WorldAccess>,
        notifier: Arc<dyn Notifier>,
        cooldowns: Arc<CooldownTracker>,
        teleports: Arc<TeleportOrchestrator>,
        scheduler: Scheduler,
        settings: TpaSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            world,
            notifier,
            cooldowns,
            teleports,
            scheduler,
            settings,
            state: Mutex::new(BrokerState::default()),
            this: this.clone(),
        })
    }

    fn reject(&self, player: PlayerId, err: RequestError) -> RequestError {
        match err.kind() {
            ErrorKind::Validation => log::trace!("request from {player} rejected: {err}"),
            ErrorKind::Policy => log::debug!("request from {player} rejected: {err}"),
        }
        self.notifier.notify(
            player,
            Notification::Denied {
                reason: err.to_string(),
            },
        );
        err
    }

    pub fn send_request(
        &self,
        requester: PlayerId,
        target: PlayerId,
        direction: TpaDirection,
    ) -> Result<(), RequestError> {
        if requester == target {
            return Err(self.reject(requester, RequestError::SelfTarget));
        }
        if let Err(remaining) =
            self.cooldowns
                .try_acquire(requester, CATEGORY_TPA, self.settings.cooldown)
        {
            return Err(self.reject(requester, RequestError::CooldownActive { remaining }));
        }

        let offline = {
            let mut state = self.state.lock().unwrap();
            // Checked under the lock so a quit running alongside either
            // voids this request or makes it fail here.
            if !self.world.is_online(requester) {
                Some(RequestError::NotOnline)
            } else if !self.world.is_online(target) {
                Some(RequestError::TargetOffline)
            } else {
                if let Some(previous) = state.take(target, Some(requester)) {
                    previous.timer.cancel();
                    log::debug!("request {} from {requester} to {target} superseded", previous.id);
                }
                state.next_id += 1;
                let id = state.next_id;
                let this = self.this.clone();
                let timer = self.scheduler.after(self.settings.expiry, move || {
                    if let Some(broker) = this.upgrade() {
                        broker.expire(target, id);
                    }
                });
                state
                    .by_target
                    .entry(target)
                    .or_default()
                    .push(PendingRequest {
                        id,
                        requester,
                        direction,
                        expires_at: Instant::now() + self.settings.expiry,
                        timer,
                    });
                log::debug!("request {id} from {requester} to {target} ({direction:?})");
                None
            }
        };
        if let Some(err) = offline {
            self.cooldowns.clear(requester, CATEGORY_TPA);
            return Err(self.reject(requester, err));
        }

        self.notifier
            .notify(requester, Notification::TpaSent { target, direction });
        self.notifier.notify(
            target,
            Notification::TpaReceived {
                requester,
                direction,
                expires_in: self.settings.expiry,
            },
        );
        Ok(())
    }

    /// Accepts the newest request addressed to `target`, or the one from
    /// `requester` when given.
    pub fn accept(
        &self,
        target: PlayerId,
        requester: Option<PlayerId>,
    ) -> Result<(), RequestError> {
        let request = self.state.lock().unwrap().take(target, requester);
        let Some(request) = request else {
            return Err(self.reject(target, RequestError::NoPendingRequest));
        };
        request.timer.cancel();

        if request.expires_at <= Instant::now() {
            self.notify_expired(target, &request);
            return Err(self.reject(target, RequestError::NoPendingRequest));
        }

        let (mover, destination) = match request.direction {
            TpaDirection::To => (request.requester, target),
            TpaDirection::Here => (target, request.requester),
        };
        if !self.world.is_online(mover) || !self.world.is_online(destination) {
            log::debug!("request {} accepted by {target} but a side is gone", request.id);
            return Err(self.reject(target, RequestError::DestinationUnavailable));
        }
        log::debug!("request {} accepted by {target}", request.id);
        self.notifier
            .notify(request.requester, Notification::TpaAccepted { by: target });
        self.notifier.notify(
            target,
            Notification::TpaAcceptedByYou {
                requester: request.requester,
            },
        );
        let outcome = self.teleports.request_teleport(
            mover,
            Destination::Player(destination),
            self.settings.warmup,
            TeleportCause::TpaAccept,
        );
        if outcome == TeleportOutcome::Unavailable {
            return Err(self.reject(target, RequestError::DestinationUnavailable));
        }
        Ok(())
    }

    /// Denies a pending request. Returns the requester that was denied, or
    /// `None` when there was nothing to deny.
    pub fn deny(&self, target: PlayerId, requester: Option<PlayerId>) -> Option<PlayerId> {
        let request = self.state.lock().unwrap().take(target, requester)?;
        request.timer.cancel();
        log::debug!("request {} denied by {target}", request.id);
        self.notifier
            .notify(request.requester, Notification::TpaDenied { by: target });
        self.notifier.notify(
            target,
            Notification::TpaDeniedByYou {
                requester: request.requester,
            },
        );
        Some(request.requester)
    }

    /// Withdraws the requester's outgoing request to `target`.
    pub fn cancel(&self, requester: PlayerId, target: PlayerId) -> bool {
        let request = self.state.lock().unwrap().take(target, Some(requester));
        let Some(request) = request else {
            return false;
        };
        request.timer.cancel();
        log::debug!("request {} canceled by {requester}", request.id);
        self.notifier
            .notify(target, Notification::TpaCanceled { requester });
        true
    }

    fn expire(&self, target: PlayerId, id: u64) {
        let request = self.state.lock().unwrap().take_by_id(target, id);
        match request {
            Some(request) => self.notify_expired(target, &request),
            None => log::warn!("expiry timer {id} for {target} fired after the request was resolved"),
        }
    }

    fn notify_expired(&self, target: PlayerId, request: &PendingRequest) {
        log::debug!("request {} to {target} expired", request.id);
        self.notifier
            .notify(request.requester, Notification::TpaExpired { target });
        self.notifier.notify(
            target,
            Notification::TpaExpiredIncoming {
                requester: request.requester,
            },
        );
    }

    /// Requesters with a pending request to `target`, oldest first.
    pub fn pending_for(&self, target: PlayerId) -> Vec<(PlayerId, TpaDirection)> {
        let state = self.state.lock().unwrap();
        state
            .by_target
            .get(&target)
            .map(|list| list.iter().map(|r| (r.requester, r.direction)).collect())
            .unwrap_or_default()
    }

    /// Voids every request the player is part of and tells the other side.
    pub fn on_player_quit(&self, player: PlayerId) {
        let mut voided = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(incoming) = state.by_target.remove(&player) {
                for request in incoming {
                    request.timer.cancel();
                    voided.push(request.requester);
                }
            }
            state.by_target.retain(|target, list| {
                list.retain(|request| {
                    if request.requester != player {
                        return true;
                    }
                    request.timer.cancel();
                    voided.push(*target);
                    false
                });
                !list.is_empty()
            });
        }
        for other in voided {
            self.notifier
                .notify(other, Notification::TpaVoided { other: player });
        }
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        let state = self.state.lock().unwrap();
        state.by_target.iter().any(|(target, list)| {
            *target == player || list.iter().any(|r| r.requester == player)
        })
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, list) in state.by_target.drain() {
            for request in list {
                request.timer.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::back::BackHistory;
    use crate::model::{Location, Position};
    use crate::notify::testing::RecordingNotifier;
    use crate::world::testing::FakeWorld;

    struct Fixture {
        world: Arc<FakeWorld>,
        notifier: Arc<RecordingNotifier>,
        back: Arc<BackHistory>,
        cooldowns: Arc<CooldownTracker>,
        broker: Arc<RequestBroker>,
    }

    fn fixture(cooldown: Duration) -> Fixture {
        let world = Arc::new(FakeWorld::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let back = Arc::new(BackHistory::new());
        let cooldowns = Arc::new(CooldownTracker::new());
        let scheduler = Scheduler::current();
        let teleports = TeleportOrchestrator::new(
            world.clone(),
            notifier.clone(),
            back.clone(),
            scheduler.clone(),
            0.5,
            Duration::from_millis(500),
        );
        let broker = RequestBroker::new(
            world.clone(),
            notifier.clone(),
            cooldowns.clone(),
            teleports,
            scheduler,
            TpaSettings {
                expiry: Duration::from_secs(60),
                cooldown,
                warmup: Duration::ZERO,
            },
        );
        Fixture {
            world,
            notifier,
            back,
            cooldowns,
            broker,
        }
    }

    fn at(x: f64) -> Location {
        Location::new("overworld", Position::new(x, 64.0, 0.0))
    }

    fn online(f: &Fixture, x: f64) -> PlayerId {
        let id = Uuid::new_v4();
        f.world.place(id, at(x));
        id
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_tpa_moves_requester_to_target() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 100.0);

        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        assert!(matches!(
            f.notifier.for_player(b).as_slice(),
            [Notification::TpaReceived { requester, .. }] if *requester == a
        ));

        f.broker.accept(b, None).unwrap();
        assert_eq!(f.world.location(a), Some(at(100.0)));
        assert_eq!(
            f.notifier.for_player(a),
            vec![
                Notification::TpaSent { target: b, direction: TpaDirection::To },
                Notification::TpaAccepted { by: b },
                Notification::Teleported { cause: TeleportCause::TpaAccept },
            ]
        );
        assert_eq!(f.back.get(a).unwrap().location, at(0.0));
        assert!(!f.broker.has_player(a));
        assert!(!f.broker.has_player(b));
    }

    #[tokio::test(start_paused = true)]
    async fn tpahere_moves_target_to_requester() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 100.0);

        f.broker.send_request(a, b, TpaDirection::Here).unwrap();
        f.broker.accept(b, Some(a)).unwrap();
        assert_eq!(f.world.location(b), Some(at(0.0)));
        assert_eq!(f.world.location(a), Some(at(0.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_notify_the_requester_once() {
        let f = fixture(Duration::from_secs(30));
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        let offline = Uuid::new_v4();

        assert_eq!(
            f.broker.send_request(a, a, TpaDirection::To),
            Err(RequestError::SelfTarget)
        );
        assert_eq!(
            f.broker.send_request(a, offline, TpaDirection::To),
            Err(RequestError::TargetOffline)
        );
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            f.broker.send_request(a, b, TpaDirection::To),
            Err(RequestError::CooldownActive {
                remaining: Duration::from_secs(20)
            })
        );

        let denials = f
            .notifier
            .for_player(a)
            .into_iter()
            .filter(|n| matches!(n, Notification::Denied { .. }))
            .count();
        assert_eq!(denials, 3);
        assert!(f.cooldowns.is_on_cooldown(a, CATEGORY_TPA));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_expires() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        f.notifier.take();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(
            f.notifier.take(),
            vec![
                (a, Notification::TpaExpired { target: b }),
                (b, Notification::TpaExpiredIncoming { requester: a }),
            ]
        );
        assert_eq!(f.broker.accept(b, None), Err(RequestError::NoPendingRequest));
        assert!(f.world.moves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_request_never_expires_on_its_own_timer() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        f.broker.send_request(a, b, TpaDirection::Here).unwrap();
        f.notifier.take();

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(f.notifier.take().is_empty());
        assert_eq!(f.broker.pending_for(b), vec![(a, TpaDirection::Here)]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.notifier.take().len(), 2);
        assert!(f.broker.pending_for(b).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn accept_picks_newest_or_named_sender() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let c = online(&f, 5.0);
        let b = online(&f, 100.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        f.broker.send_request(c, b, TpaDirection::To).unwrap();

        f.broker.accept(b, Some(a)).unwrap();
        assert_eq!(f.world.location(a), Some(at(100.0)));
        assert_eq!(f.world.location(c), Some(at(5.0)));

        f.broker.accept(b, None).unwrap();
        assert_eq!(f.world.location(c), Some(at(100.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn deny_twice_notifies_once() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        f.notifier.take();

        assert_eq!(f.broker.deny(b, None), Some(a));
        assert_eq!(f.broker.deny(b, None), None);
        assert_eq!(f.notifier.for_player(a), vec![Notification::TpaDenied { by: b }]);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.notifier.for_player(a).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn requester_can_withdraw() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        f.notifier.take();

        assert!(f.broker.cancel(a, b));
        assert!(!f.broker.cancel(a, b));
        assert_eq!(
            f.notifier.take(),
            vec![(b, Notification::TpaCanceled { requester: a })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quitting_voids_both_directions() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        let c = online(&f, 2.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        f.broker.send_request(c, a, TpaDirection::Here).unwrap();
        f.notifier.take();

        f.broker.on_player_quit(a);
        f.broker.on_player_quit(a);
        let mut sent = f.notifier.take();
        sent.sort_by_key(|(id, _)| *id);
        let mut expected = vec![
            (b, Notification::TpaVoided { other: a }),
            (c, Notification::TpaVoided { other: a }),
        ];
        expected.sort_by_key(|(id, _)| *id);
        assert_eq!(sent, expected);
        assert!(!f.broker.has_player(a));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(f.notifier.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refused_send_gives_the_cooldown_back() {
        let f = fixture(Duration::from_secs(30));
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);

        assert_eq!(
            f.broker.send_request(a, Uuid::new_v4(), TpaDirection::To),
            Err(RequestError::TargetOffline)
        );
        assert!(!f.cooldowns.is_on_cooldown(a, CATEGORY_TPA));
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        assert!(matches!(
            f.broker.send_request(a, b, TpaDirection::Here),
            Err(RequestError::CooldownActive { .. })
        ));
        assert_eq!(f.broker.pending_for(b), vec![(a, TpaDirection::To)]);
    }

    #[tokio::test(start_paused = true)]
    async fn accepting_after_the_requester_left_tells_only_the_target() {
        let f = fixture(Duration::ZERO);
        let a = online(&f, 0.0);
        let b = online(&f, 1.0);
        f.broker.send_request(a, b, TpaDirection::To).unwrap();
        f.notifier.take();
        f.world.remove(a);

        assert_eq!(
            f.broker.accept(b, None),
            Err(RequestError::DestinationUnavailable)
        );
        assert!(f.notifier.for_player(a).is_empty());
        assert!(matches!(
            f.notifier.for_player(b).as_slice(),
            [Notification::Denied { .. }]
        ));
        assert!(f.world.moves().is_empty());
        assert!(!f.broker.has_player(b));
    }
}
