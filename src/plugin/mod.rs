//! Pumpkin glue: event handlers, command trees and chat rendering on top of
//! [`Essentials`].

use std::sync::Arc;

use pumpkin::plugin::events::player::player_chat::PlayerChatEvent;
use pumpkin::plugin::events::player::player_join::PlayerJoinEvent;
use pumpkin::plugin::events::player::player_leave::PlayerLeaveEvent;
use pumpkin::plugin::events::player::player_move::PlayerMoveEvent;
use pumpkin::plugin::{
    Context, EventPriority, PLUGIN_API_VERSION, Plugin, PluginFuture, PluginMetadata,
};
use pumpkin_util::permission::{Permission, PermissionDefault, PermissionLvl};
use tokio::runtime::Handle;

mod branding;
mod commands;
mod handlers;
mod online;
mod render;

use crate::Essentials;
use crate::config;
use crate::groups;
use crate::scheduler::Scheduler;
use handlers::{ChatHandler, JoinHandler, LeaveHandler, MoveHandler};
use online::OnlinePlayers;
use render::PumpkinNotifier;

const PERMISSION_TPA: &str = "JinxEssentials:tpa";
const PERMISSION_HOME: &str = "JinxEssentials:home";
const PERMISSION_BACK: &str = "JinxEssentials:back";
const PERMISSION_KIT: &str = "JinxEssentials:kit";
const PERMISSION_KIT_ADMIN: &str = "JinxEssentials:kit.admin";
const PERMISSION_WARP: &str = "JinxEssentials:warp";
const PERMISSION_WARP_ADMIN: &str = "JinxEssentials:warp.admin";

#[derive(Default)]
struct EssentialsPlugin {
    essentials: Option<Arc<Essentials>>,
}

impl Plugin for EssentialsPlugin {
    fn on_load(&mut self, server: Arc<Context>) -> PluginFuture<'_, Result<(), String>> {
        Box::pin(async move {
            let data_dir = server.get_data_folder();
            let config = config::load_or_create(&data_dir).map_err(|e| e.to_string())?;
            let scheduler = Scheduler::dedicated().map_err(|e| e.to_string())?;

            let online = Arc::new(OnlinePlayers::new(
                Arc::clone(&server.server),
                Handle::current(),
            ));
            let group_provider = groups::provider_from_config(&config);
            let essentials = Essentials::open(
                config,
                &data_dir,
                Arc::clone(&online) as _,
                Arc::new(PumpkinNotifier::new(Arc::clone(&online))),
                group_provider,
                scheduler,
            )
            .map_err(|e| e.to_string())?;

            for (node, description, default) in [
                (PERMISSION_TPA, "Send and answer teleport requests.", PermissionDefault::Allow),
                (PERMISSION_HOME, "Set and use homes.", PermissionDefault::Allow),
                (PERMISSION_BACK, "Return to your previous location.", PermissionDefault::Allow),
                (PERMISSION_KIT, "Use kits.", PermissionDefault::Allow),
                (PERMISSION_WARP, "Use warps and /spawn.", PermissionDefault::Allow),
                (
                    PERMISSION_KIT_ADMIN,
                    "Create and delete kits.",
                    PermissionDefault::Op(PermissionLvl::Two),
                ),
                (
                    PERMISSION_WARP_ADMIN,
                    "Set and delete warps and the spawn point.",
                    PermissionDefault::Op(PermissionLvl::Two),
                ),
            ] {
                server
                    .register_permission(Permission::new(node, description, default))
                    .await
                    .ok();
            }

            let e = &essentials;
            for tree in [
                commands::tpa_command_tree(Arc::clone(e)),
                commands::tpahere_command_tree(Arc::clone(e)),
                commands::tpaccept_command_tree(Arc::clone(e)),
                commands::tpdeny_command_tree(Arc::clone(e)),
                commands::tpacancel_command_tree(Arc::clone(e)),
            ] {
                server.register_command(tree, PERMISSION_TPA).await;
            }
            for tree in [
                commands::home_command_tree(Arc::clone(e)),
                commands::sethome_command_tree(Arc::clone(e)),
                commands::delhome_command_tree(Arc::clone(e)),
                commands::homes_command_tree(Arc::clone(e)),
            ] {
                server.register_command(tree, PERMISSION_HOME).await;
            }
            server
                .register_command(commands::back_command_tree(Arc::clone(e)), PERMISSION_BACK)
                .await;
            server
                .register_command(commands::kit_command_tree(Arc::clone(e)), PERMISSION_KIT)
                .await;
            server
                .register_command(commands::kits_command_tree(Arc::clone(e)), PERMISSION_KIT)
                .await;
            for tree in [
                commands::createkit_command_tree(Arc::clone(e)),
                commands::delkit_command_tree(Arc::clone(e)),
            ] {
                server.register_command(tree, PERMISSION_KIT_ADMIN).await;
            }
            for tree in [
                commands::warp_command_tree(Arc::clone(e)),
                commands::warps_command_tree(Arc::clone(e)),
                commands::spawn_command_tree(Arc::clone(e)),
            ] {
                server.register_command(tree, PERMISSION_WARP).await;
            }
            for tree in [
                commands::setwarp_command_tree(Arc::clone(e)),
                commands::delwarp_command_tree(Arc::clone(e)),
                commands::setspawn_command_tree(Arc::clone(e)),
            ] {
                server.register_command(tree, PERMISSION_WARP_ADMIN).await;
            }

            server
                .register_event::<PlayerJoinEvent, _>(
                    Arc::new(JoinHandler {
                        essentials: Arc::clone(e),
                        online: Arc::clone(&online),
                    }),
                    EventPriority::Normal,
                    true,
                )
                .await;
            server
                .register_event::<PlayerLeaveEvent, _>(
                    Arc::new(LeaveHandler {
                        essentials: Arc::clone(e),
                        online: Arc::clone(&online),
                    }),
                    EventPriority::Normal,
                    true,
                )
                .await;
            server
                .register_event::<PlayerMoveEvent, _>(
                    Arc::new(MoveHandler {
                        essentials: Arc::clone(e),
                    }),
                    EventPriority::Normal,
                    true,
                )
                .await;
            server
                .register_event::<PlayerChatEvent, _>(
                    Arc::new(ChatHandler {
                        essentials: Arc::clone(e),
                    }),
                    EventPriority::Lowest,
                    true,
                )
                .await;

            log::info!(
                "JinxEssentials loaded ({} kits, {} warps, data in {})",
                essentials.kits.names().len(),
                essentials.warps.names().len(),
                data_dir.display()
            );
            self.essentials = Some(essentials);
            Ok(())
        })
    }

    fn on_unload(&mut self, _server: Arc<Context>) -> PluginFuture<'_, Result<(), String>> {
        Box::pin(async move {
            if let Some(essentials) = self.essentials.take() {
                essentials.shutdown().await;
            }
            Ok(())
        })
    }
}

#[unsafe(no_mangle)]
pub static METADATA: PluginMetadata<'static> = PluginMetadata {
    name: "JinxEssentials",
    version: env!("CARGO_PKG_VERSION"),
    authors: env!("CARGO_PKG_AUTHORS"),
    description: env!("CARGO_PKG_DESCRIPTION"),
};

#[unsafe(no_mangle)]
pub static PUMPKIN_API_VERSION: u32 = PLUGIN_API_VERSION;

#[unsafe(no_mangle)]
pub fn plugin() -> Box<dyn Plugin> {
    Box::new(EssentialsPlugin::default())
}
