mod back;
mod home;
mod kit;
mod tpa;
mod warp;

pub use back::back_command_tree;
pub use home::{delhome_command_tree, home_command_tree, homes_command_tree, sethome_command_tree};
pub use kit::{createkit_command_tree, delkit_command_tree, kit_command_tree, kits_command_tree};
pub use tpa::{
    tpa_command_tree, tpacancel_command_tree, tpaccept_command_tree, tpahere_command_tree,
    tpdeny_command_tree,
};
pub use warp::{
    delwarp_command_tree, setspawn_command_tree, setwarp_command_tree, spawn_command_tree,
    warp_command_tree, warps_command_tree,
};
