use std::sync::Arc;

use pumpkin::net::ClientPlatform;
use pumpkin::plugin::events::player::player_chat::PlayerChatEvent;
use pumpkin::plugin::events::player::player_join::PlayerJoinEvent;
use pumpkin::plugin::events::player::player_leave::PlayerLeaveEvent;
use pumpkin::plugin::events::player::player_move::PlayerMoveEvent;
use pumpkin::plugin::{BoxFuture, Cancellable, EventHandler};
use pumpkin::server::Server;
use pumpkin_protocol::bedrock::server::text::SText;
use pumpkin_protocol::java::client::play::CSystemChatMessage;
use pumpkin_util::text::TextComponent;

use super::online::OnlinePlayers;
use crate::Essentials;
use crate::model::{Location, Position};

pub struct JoinHandler {
    pub essentials: Arc<Essentials>,
    pub online: Arc<OnlinePlayers>,
}

impl EventHandler<PlayerJoinEvent> for JoinHandler {
    fn handle_blocking<'a>(
        &'a self,
        _server: &'a Arc<Server>,
        event: &'a mut PlayerJoinEvent,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.online.insert(Arc::clone(&event.player));
            self.essentials.join(event.player.gameprofile.id).await;
        })
    }
}

pub struct LeaveHandler {
    pub essentials: Arc<Essentials>,
    pub online: Arc<OnlinePlayers>,
}

impl EventHandler<PlayerLeaveEvent> for LeaveHandler {
    fn handle_blocking<'a>(
        &'a self,
        _server: &'a Arc<Server>,
        event: &'a mut PlayerLeaveEvent,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let id = event.player.gameprofile.id;
            // Counterparts are told while the name still resolves.
            self.essentials.cancel_sessions(id);
            self.online.remove(id);
            self.essentials.unload(id).await;
        })
    }
}

pub struct MoveHandler {
    pub essentials: Arc<Essentials>,
}

impl EventHandler<PlayerMoveEvent> for MoveHandler {
    fn handle_blocking<'a>(
        &'a self,
        _server: &'a Arc<Server>,
        event: &'a mut PlayerMoveEvent,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if event.cancelled() {
                return;
            }
            let to = Location::new(
                event.player.world().dimension.minecraft_name,
                Position::new(event.to.x, event.to.y, event.to.z),
            );
            self.essentials
                .on_move(event.player.gameprofile.id, &to);
        })
    }
}

pub struct ChatHandler {
    pub essentials: Arc<Essentials>,
}

impl EventHandler<PlayerChatEvent> for ChatHandler {
    fn handle_blocking<'a>(
        &'a self,
        _server: &'a Arc<Server>,
        event: &'a mut PlayerChatEvent,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if event.cancelled() {
                return;
            }

            let name = event.player.gameprofile.name.clone();
            let line = self.essentials.chat.render(
                self.essentials.groups.as_ref(),
                event.player.gameprofile.id,
                &name,
                &event.message,
            );
            let text = TextComponent::text(line);
            let je_packet = CSystemChatMessage::new(&text, false);
            let be_packet = SText::new(text.clone().get_text(), name);

            event.set_cancelled(true);

            if event.recipients.is_empty() {
                let world = event.player.world();
                world.broadcast_editioned(&je_packet, &be_packet).await;
                return;
            }

            for recipient in &event.recipients {
                match &recipient.client {
                    ClientPlatform::Java(client) => {
                        client.enqueue_packet(&je_packet).await;
                    }
                    ClientPlatform::Bedrock(client) => {
                        client.send_game_packet(&be_packet).await;
                    }
                }
            }
        })
    }
}
