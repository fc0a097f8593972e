use std::sync::Arc;

use pumpkin::command::{
    CommandExecutor, CommandResult, CommandSender,
    args::{
        Arg, ConsumedArgs, FindArg, bounded_num::BoundedNumArgumentConsumer,
        simple::SimpleArgConsumer,
    },
    tree::CommandTree,
    tree::builder::{argument, require},
};
use pumpkin::entity::player::Player;
use pumpkin::server::Server;
use pumpkin_data::item::Item;
use pumpkin_util::text::TextComponent;
use pumpkin_world::item::ItemStack;

use crate::Essentials;
use crate::config::{KitDefinition, KitItem};
use crate::cooldown::{format_cooldown, kit_category};
use crate::error::KitError;
use crate::kits::Kit;
use crate::plugin::branding;

const ARG_NAME: &str = "name";
const ARG_COOLDOWN: &str = "cooldown";

fn cooldown_consumer() -> BoundedNumArgumentConsumer<i64> {
    BoundedNumArgumentConsumer::new().name(ARG_COOLDOWN).min(0)
}

fn kit_error(err: &KitError) -> TextComponent {
    branding::failure(branding::sentence(&err.to_string()))
}

fn item_from_id(id: &str, count: u8) -> Option<ItemStack> {
    let registry_key = id.strip_prefix("minecraft:").unwrap_or(id);
    let item = Item::from_registry_key(registry_key)?;
    Some(ItemStack::new(count, item))
}

/// Puts the kit into free main-inventory slots. Returns (given, skipped).
async fn give_kit(player: &Player, kit: &Kit) -> (usize, usize) {
    let inventory = player.inventory();
    if kit.replace {
        for slot in &inventory.main_inventory {
            *slot.lock().await = ItemStack::EMPTY.clone();
        }
    }

    let mut given = 0usize;
    let mut skipped = 0usize;
    let mut slots = inventory.main_inventory.iter();
    'items: for entry in &kit.items {
        let Some(stack) = item_from_id(&entry.id, entry.count) else {
            log::warn!("kit {} names unknown item {}", kit.id, entry.id);
            skipped += 1;
            continue;
        };
        for slot in slots.by_ref() {
            let mut slot_lock = slot.lock().await;
            if slot_lock.is_empty() {
                *slot_lock = stack;
                given += 1;
                continue 'items;
            }
        }
        skipped += 1;
    }
    (given, skipped)
}

struct KitExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for KitExecutor {
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

            let kit = match self.essentials.kits.claim(player.gameprofile.id, name) {
                Ok(kit) => kit,
                Err(err) => {
                    sender.send_message(kit_error(&err)).await;
                    return Ok(());
                }
            };

            let (given, skipped) = give_kit(&player, &kit).await;
            let msg = if skipped > 0 {
                branding::success(format!(
                    "Received kit {} ({given} items, {skipped} skipped).",
                    kit.display_name
                ))
            } else {
                branding::success(format!("Received kit {} ({given} items).", kit.display_name))
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct KitsExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for KitsExecutor {
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
            let cooldowns = &self.essentials.cooldowns;
            let lines: Vec<String> = self
                .essentials
                .kits
                .names()
                .into_iter()
                .map(|id| {
                    let left = cooldowns
                        .remaining(player.gameprofile.id, &kit_category(&id))
                        .unwrap_or_default();
                    format!("{id} ({})", format_cooldown(left))
                })
                .collect();

            let msg = if lines.is_empty() {
                branding::info("No kits are configured.")
            } else {
                branding::info(format!("Kits: {}", lines.join(", ")))
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct CreateKitExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for CreateKitExecutor {
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
            let Ok(Ok(cooldown)) = BoundedNumArgumentConsumer::<i64>::find_arg(args, ARG_COOLDOWN)
            else {
                return Ok(());
            };

            let mut items = Vec::new();
            for slot in &player.inventory().main_inventory {
                let stack = slot.lock().await;
                if stack.is_empty() {
                    continue;
                }
                items.push(KitItem {
                    id: format!("minecraft:{}", stack.item.registry_key),
                    count: stack.item_count,
                });
            }
            if items.is_empty() {
                sender
                    .send_message(branding::info("Your inventory is empty; nothing to save."))
                    .await;
                return Ok(());
            }

            let count = items.len();
            let definition = KitDefinition {
                cooldown_seconds: cooldown.max(0) as u64,
                items,
                ..KitDefinition::default()
            };
            let name = name.to_ascii_lowercase();
            let msg = match self.essentials.kits.create(&name, definition) {
                Ok(true) => branding::success(format!("Created kit {name} ({count} items).")),
                Ok(false) => branding::success(format!("Updated kit {name} ({count} items).")),
                Err(err) => kit_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

struct DelKitExecutor {
    essentials: Arc<Essentials>,
}

impl CommandExecutor for DelKitExecutor {
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
            let msg = match self.essentials.kits.delete(&name) {
                Ok(()) => branding::success(format!("Deleted kit {name}.")),
                Err(err) => kit_error(&err),
            };
            sender.send_message(msg).await;
            Ok(())
        })
    }
}

pub fn createkit_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["createkit"], "Create a kit from your inventory.").then(
        require(|sender| sender.is_player()).then(
            argument(ARG_NAME, SimpleArgConsumer).then(
                argument(ARG_COOLDOWN, cooldown_consumer())
                    .execute(CreateKitExecutor { essentials }),
            ),
        ),
    )
}

pub fn delkit_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["delkit"], "Delete a kit created in game.")
        .then(argument(ARG_NAME, SimpleArgConsumer).execute(DelKitExecutor { essentials }))
}

pub fn kit_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["kit"], "Receive a kit.").then(
        require(|sender| sender.is_player())
            .then(argument(ARG_NAME, SimpleArgConsumer).execute(KitExecutor { essentials })),
    )
}

pub fn kits_command_tree(essentials: Arc<Essentials>) -> CommandTree {
    CommandTree::new(["kits"], "List kits and their cooldowns.")
        .then(require(|sender| sender.is_player()).execute(KitsExecutor { essentials }))
}
