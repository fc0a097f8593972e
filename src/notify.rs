//! Semantic notifications emitted by the managers.
//!
//! Rendering to chat text is up to the host; see `plugin::render` for the
//! Pumpkin rendering.

use std::time::Duration;

use crate::model::{PlayerId, TeleportCause, TpaDirection};

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    WarmupStarted { delay: Duration, cause: TeleportCause },
    WarmupCanceled { cause: TeleportCause },
    Teleported { cause: TeleportCause },
    /// A policy rejection shown to the acting player.
    Denied { reason: String },

    TpaSent { target: PlayerId, direction: TpaDirection },
    TpaReceived { requester: PlayerId, direction: TpaDirection, expires_in: Duration },
    TpaAccepted { by: PlayerId },
    TpaAcceptedByYou { requester: PlayerId },
    TpaDenied { by: PlayerId },
    TpaDeniedByYou { requester: PlayerId },
    /// Sent to the requester: the target let the request run out.
    TpaExpired { target: PlayerId },
    /// Sent to the target of an expired request.
    TpaExpiredIncoming { requester: PlayerId },
    /// Sent to the target when the requester withdraws.
    TpaCanceled { requester: PlayerId },
    /// The other side disconnected while the request was pending.
    TpaVoided { other: PlayerId },
}

/// Delivers notifications to players.
pub trait Notifier: Send + Sync {
    fn notify(&self, player: PlayerId, notification: Notification);
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(PlayerId, Notification)>>,
    }

    impl RecordingNotifier {
        pub fn take(&self) -> Vec<(PlayerId, Notification)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }

        pub fn for_player(&self, player: PlayerId) -> Vec<Notification> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == player)
                .map(|(_, n)| n.clone())
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, player: PlayerId, notification: Notification) {
            self.sent.lock().unwrap().push((player, notification));
        }
    }
}
