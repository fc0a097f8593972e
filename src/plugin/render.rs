use std::sync::Arc;

use pumpkin::entity::player::Player;
use pumpkin_util::text::{TextComponent, color::NamedColor};
use tokio::sync::mpsc;

use super::branding;
use super::online::OnlinePlayers;
use crate::cooldown::format_cooldown;
use crate::model::{PlayerId, TeleportCause, TpaDirection};
use crate::notify::{Notification, Notifier};

fn cause_label(cause: TeleportCause) -> &'static str {
    match cause {
        TeleportCause::Command => "teleport",
        TeleportCause::TpaAccept => "teleport request",
        TeleportCause::Home => "home",
        TeleportCause::Warp => "warp",
        TeleportCause::Spawn => "spawn",
        TeleportCause::Back => "previous location",
    }
}

/// Chat text for a notification, with `name` resolving player ids.
pub fn render(notification: &Notification, name: impl Fn(PlayerId) -> String) -> TextComponent {
    match notification {
        Notification::WarmupStarted { delay, cause } => branding::info(format!(
            "Teleporting to {} in {}. Don't move.",
            cause_label(*cause),
            format_cooldown(*delay)
        )),
        Notification::WarmupCanceled { .. } => {
            branding::failure("Teleport canceled because you moved.")
        }
        Notification::Teleported { cause } => {
            branding::success(format!("Teleported to {}.", cause_label(*cause)))
        }
        Notification::Denied { reason } => branding::failure(branding::sentence(reason)),
        Notification::TpaSent { target, direction } => {
            let text = match direction {
                TpaDirection::To => format!("Request sent to {}.", name(*target)),
                TpaDirection::Here => {
                    format!("Asked {} to teleport to you.", name(*target))
                }
            };
            branding::success(text)
        }
        Notification::TpaReceived {
            requester,
            direction,
            expires_in,
        } => {
            let what = match direction {
                TpaDirection::To => "wants to teleport to you",
                TpaDirection::Here => "wants you to teleport to them",
            };
            branding::brand(
                TextComponent::text(format!("{} {what}. ", name(*requester)))
                    .color_named(NamedColor::Yellow)
                    .add_child(
                        TextComponent::text("/tpaccept").color_named(NamedColor::Green),
                    )
                    .add_child(TextComponent::text(" or ").color_named(NamedColor::Yellow))
                    .add_child(TextComponent::text("/tpdeny").color_named(NamedColor::Red))
                    .add_child(
                        TextComponent::text(format!(
                            " ({} left)",
                            format_cooldown(*expires_in)
                        ))
                        .color_named(NamedColor::Gray),
                    ),
            )
        }
        Notification::TpaAccepted { by } => {
            branding::success(format!("{} accepted your request.", name(*by)))
        }
        Notification::TpaAcceptedByYou { requester } => {
            branding::success(format!("Accepted the request from {}.", name(*requester)))
        }
        Notification::TpaDenied { by } => {
            branding::failure(format!("{} denied your request.", name(*by)))
        }
        Notification::TpaDeniedByYou { requester } => {
            branding::info(format!("Denied the request from {}.", name(*requester)))
        }
        Notification::TpaExpired { target } => {
            branding::info(format!("Your request to {} expired.", name(*target)))
        }
        Notification::TpaExpiredIncoming { requester } => {
            branding::info(format!("The request from {} expired.", name(*requester)))
        }
        Notification::TpaCanceled { requester } => {
            branding::info(format!("{} withdrew their request.", name(*requester)))
        }
        Notification::TpaVoided { other } => branding::info(format!(
            "{} left, so your teleport request was dropped.",
            name(*other)
        )),
    }
}

/// Renders notifications and delivers them from a single task, so a player
/// always reads them in the order they were raised.
pub struct PumpkinNotifier {
    online: Arc<OnlinePlayers>,
    outbox: mpsc::UnboundedSender<(Arc<Player>, TextComponent)>,
}

impl PumpkinNotifier {
    pub fn new(online: Arc<OnlinePlayers>) -> Self {
        let (outbox, mut inbox) = mpsc::unbounded_channel::<(Arc<Player>, TextComponent)>();
        online.spawn(async move {
            while let Some((recipient, message)) = inbox.recv().await {
                recipient.send_system_message(&message).await;
            }
        });
        Self { online, outbox }
    }
}

impl Notifier for PumpkinNotifier {
    fn notify(&self, player: PlayerId, notification: Notification) {
        let Some(recipient) = self.online.get(player) else {
            return;
        };
        let message = render(&notification, |id| self.online.name_of(id));
        if self.outbox.send((recipient, message)).is_err() {
            log::debug!("message delivery stopped; dropping notice for {player}");
        }
    }
}
