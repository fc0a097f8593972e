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
use crate::error::{ErrorKind, HomeError};
use crate::model::TeleportCause;
use crate::plugin::branding;
use crate::plugin::online::location_of;
use crate::teleport::Destination;

const ARG_NAME: &str = "name";
const DEFAULT_HOME: &str = "home";

fn home_name<'a>(args: &'a ConsumedArgs<'a>) -> &'a str {
    match args.get(ARG_NAME) {
        Some(Arg::Simple(name)) => name,
        _ => DEFAULT_HOME,
    }
}

/// Bad input in red, refusals by a rule in yellow.
fn home_error(err: &HomeError) -> TextComponent {
    let text = branding::sentence(&err.to_string());
    match err.kind() {
        ErrorKind::Validation => branding::failure(text),
        ErrorKind::Policy => branding::info(text),
    }
}

struct HomeExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for HomeExecutor {
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
            let id = player.gameprofile.id;
            match self.essentials.homes.home(id, home_name(args)) {
                Ok(location) => {
                    let _ = self.essentials.teleport(
                        id,
                        Destination::Location(location),
                        TeleportCause::Home,
                    );
                }
                Err(err) => sender.send_message(home_error(&err)).await,
            }
            Ok(())
        })
    }
}

struct SetHomeExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for SetHomeExecutor {
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
            let name = home_name(args);
            let msg = match self.essentials.homes.set_home(
                player.gameprofile.id,
                name,
                location_of(&player),
            ) {
                Ok(()) => branding::success(format!("Home {} set.", name.to_ascii_lowercase())),
                Err(err) => home_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct DelHomeExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for DelHomeExecutor {
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
            let name = home_name(args);
            let msg = match self.essentials.homes.delete_home(player.gameprofile.id, name) {
                Ok(()) => branding::success(format!("Home {} deleted.", name.to_ascii_lowercase())),
                Err(err) => home_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct HomesExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for HomesExecutor {
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
            let msg = match self.essentials.homes.homes(player.gameprofile.id) {
                Ok(names) if names.is_empty() => branding::info("You have no homes yet."),
                Ok(names) => branding::info(format!(
                    "Homes ({}/{}): {}",
                    names.len(),
                    self.essentials.config.max_homes,
                    names.join(", ")
                )),
                Err(err) => home_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

pub fn home_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["home"], "Teleport to one of your homes.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_NAME, SimpleArgConsumer).execute(HomeExecutor {
                essentials: Arc::clone(&essentials),
            }))
            .execute(HomeExecutor { essentials }),
    )
}

pub fn sethome_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["sethome"], "Set a home where you stand.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_NAME, SimpleArgConsumer).execute(SetHomeExecutor {
                essentials: Arc::clone(&essentials),
            }))
            .execute(SetHomeExecutor { essentials }),
    )
}

pub fn delhome_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["delhome"], "Delete one of your homes.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_NAME, SimpleArgConsumer).execute(DelHomeExecutor { essentials })),
    )
}

pub fn homes_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["homes"], "List your homes.")
        .then(require(|sender| sender.is_player()).execute(HomesExecutor { essentials }))
}
