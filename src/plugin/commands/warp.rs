use std::sync::Arc;

use pumpkin::command::{
    CommandExecutor, CommandResult, CommandSender,
    args::{Arg, ConsumedArgs, simple::SimpleArgConsumer},
    tree::CommandTree,
    tree::builder::{argument, require},
};
use pumpkin::server::Server;
use pumpkin_util::text::TextComponent;

use crate::Essentials;
use crate::error::{ErrorKind, WarpError};
use crate::plugin::branding;
use crate::plugin::online::location_of;

const ARG_NAME: &str = "name";

fn warp_error(err: &WarpError) -> TextComponent {
    let text = branding::sentence(&err.to_string());
    match err.kind() {
        ErrorKind::Validation => branding::failure(text),
        ErrorKind::Policy => branding::info(text),
    }
}

struct WarpExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for WarpExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        _server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let Some(Arg::Simple(name)) = args.get(ARG_NAME) else {
                return Ok(());
            };
            // Failures are already reported to the player.
            let _ = self.essentials.warp(player.gameprofile.id, name);
            Ok(())
        })
    }
}

struct WarpsExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for WarpsExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        _server: &'a Server,
        _args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let names = self.essentials.warps.names();
            let msg = if names.is_empty() {
                branding::info("No warps have been set.")
            } else {
                branding::info(format!("Warps: {}", names.join(", ")))
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct SetWarpExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for SetWarpExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        _server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let Some(Arg::Simple(name)) = args.get(ARG_NAME) else {
                return Ok(());
            };
            let name = name.to_ascii_lowercase();
            let msg = match self.essentials.warps.set_warp(&name, location_of(&player)) {
                Ok(true) => branding::success(format!("Warp {name} created.")),
                Ok(false) => branding::success(format!("Warp {name} moved here.")),
                Err(err) => warp_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct DelWarpExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for DelWarpExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        _server: &'a Server,
        args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(Arg::Simple(name)) = args.get(ARG_NAME) else {
                return Ok(());
            };
            let name = name.to_ascii_lowercase();
            let msg = match self.essentials.warps.delete_warp(&name) {
                Ok(()) => branding::success(format!("Warp {name} deleted.")),
                Err(err) => warp_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct SpawnExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for SpawnExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        _server: &'a Server,
        _args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let _ = self.essentials.spawn(player.gameprofile.id);
            Ok(())
        })
    }
}

struct SetSpawnExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for SetSpawnExecutor {
    fn execute<'a>(
        &'a self,
        sender: &'a CommandSender,
        _server: &'a Server,
        _args: &'a ConsumedArgs<'a>,
    ) -> CommandResult<'a> {
        Box::pin(async move {
            let Some(player) = sender.as_player() else {
                return Ok(());
            };
            let location = location_of(&player);
            let msg = match self.essentials.warps.set_spawn(location.clone()) {
                Ok(()) => branding::success(format!("Spawn set to {location}.")),
                Err(err) => warp_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

pub fn warp_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["warp"], "Teleport to a warp.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_NAME, SimpleArgConsumer).execute(WarpExecutor { essentials })),
    )
}

pub fn warps_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["warps"], "List the server's warps.").execute(WarpsExecutor { essentials })
}

pub fn setwarp_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["setwarp"], "Create or move a warp where you stand.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_NAME, SimpleArgConsumer).execute(SetWarpExecutor { essentials })),
    )
}

pub fn delwarp_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["delwarp"], "Delete a warp.")
        .then(argument(ARG_NAME, SimpleArgConsumer).execute(DelWarpExecutor { essentials }))
}

pub fn spawn_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["spawn"], "Teleport to the server spawn.")
        .then(require(|sender| sender.is_player()).execute(SpawnExecutor { essentials }))
}

pub fn setspawn_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["setspawn"], "Set the server spawn where you stand.")
        .then(require(|sender| sender.is_player()).execute(SetSpawnExecutor { essentials }))
}
