use std::sync::Arc;

use pumpkin::command::{
    CommandExecutor, CommandResult, CommandSender, args::ConsumedArgs, tree::CommandTree,
    tree::builder::require,
};
use pumpkin::server::Server;

use crate::Essentials;

struct BackExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for BackExecutor {
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
            self.essentials.back(player.gameprofile.id);
            Ok(())
        })
    }
}

pub fn back_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["back"], "Return to your previous location.")
        .then(require(|sender| sender.is_player()).execute(BackExecutor { essentials }))
}
