//! D-Bus integration for Venus OS
//!
//! This module exports the optimizer as a `com.victronenergy.BusItem` tree
//! and gives the controller read/write access to other services over one
//! long-lived connection.

mod items;
mod root;
mod service;
mod shared;
mod util;

pub use items::BusItem;
pub use root::{RootBus, TreeNode};
pub use service::DbusService;
pub use shared::DbusSharedState;
pub use util::format_text_value;
