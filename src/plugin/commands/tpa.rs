use std::sync::Arc;

use pumpkin::command::{
    CommandExecutor, CommandResult, CommandSender,
    args::{Arg, ConsumedArgs, simple::SimpleArgConsumer},
    tree::CommandTree,
    tree::builder::{argument, require},
};
use pumpkin::server::Server;

use crate::Essentials;
use crate::model::{PlayerId, TpaDirection};
use crate::plugin::branding;

const ARG_PLAYER: &str = "player";

/// Looks up the named player's uuid, telling the sender when nobody matches.
async fn named_player(
    sender: &CommandSender,
    server: &Server,
    args: &ConsumedArgs<'_>,
) -> Option<PlayerId> {
    let Some(Arg::Simple(name)) = args.get(ARG_PLAYER) else {
        return None;
    };
    match server.get_player_by_name(name).await {
        Some(player) => Some(player.gameprofile.id),
        None => {
            sender
                .send_message(branding::failure(format!("{name} is not online.")))
                .await;
            None
        }
    }
}

struct RequestExecutor {
    essentials: Arc<Essentials>,
    direction: TpaDirection,
}

impl CommandExecutor for RequestExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let Some(target) = named_player(sender, server, args).await else {
                return Ok(());
            };
            // Rejections reach the player as notifications.
            let _ = self.essentials.requests.send_request(
                player.gameprofile.id,
                target,
                self.direction,
            );
            Ok(())
        })
    }
}

struct AcceptExecutor {
    essentials: Arc<Essentials>,
    named: bool,
}

impl CommandExecutor for AcceptExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let requester = if self.named {
                let Some(requester) = named_player(sender, server, args).await else {
                    return Ok(());
                };
                Some(requester)
            } else {
                None
            };
            let _ = self
                .essentials
                .requests
                .accept(player.gameprofile.id, requester);
            Ok(())
        })
    }
}

struct DenyExecutor {
    essentials: Arc<Essentials>,
    named: bool,
}

impl CommandExecutor for DenyExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let requester = if self.named {
                let Some(requester) = named_player(sender, server, args).await else {
                    return Ok(());
                };
                Some(requester)
            } else {
                None
            };
            if self
                .essentials
                .requests
                .deny(player.gameprofile.id, requester)
                .is_none()
            {
                sender
                    .send_message(branding::info("You have no pending teleport request."))
                    .await;
            }
            Ok(())
        })
    }
}

struct CancelExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for CancelExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let Some(target) = named_player(sender, server, args).await else {
                return Ok(());
            };
            let msg = if self
                .essentials
                .requests
                .cancel(player.gameprofile.id, target)
            {
                branding::success("Request withdrawn.")
            } else {
                branding::info("You have no pending request to that player.")
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

pub fn tpa_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["tpa"], "Ask to teleport to a player.").then(
        require(|sender| sender.is_player()).then(
            argument(ARG_PLAYER, SimpleArgConsumer).execute(RequestExecutor {
                essentials,
                direction: TpaDirection::To,
            }),
        ),
    )
}

pub fn tpahere_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["tpahere"], "Ask a player to teleport to you.").then(
        require(|sender| sender.is_player()).then(
            argument(ARG_PLAYER, SimpleArgConsumer).execute(RequestExecutor {
                essentials,
                direction: TpaDirection::Here,
            }),
        ),
    )
}

pub fn tpaccept_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["tpaccept", "tpyes"], "Accept a teleport request.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_PLAYER, SimpleArgConsumer).execute(AcceptExecutor {
                essentials: Arc::clone(&essentials),
                named: true,
            }))
            .execute(AcceptExecutor {
                essentials,
                named: false,
            }),
    )
}

pub fn tpdeny_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["tpdeny", "tpno"], "Deny a teleport request.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_PLAYER, SimpleArgConsumer).execute(DenyExecutor {
                essentials: Arc::clone(&essentials),
                named: true,
            }))
            .execute(DenyExecutor {
                essentials,
                named: false,
            }),
    )
}

pub fn tpacancel_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["tpacancel"], "Withdraw a teleport request.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_PLAYER, SimpleArgConsumer).execute(CancelExecutor { essentials })),
    )
}
