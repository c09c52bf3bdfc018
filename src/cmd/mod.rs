//! CLI command implementations.
//!
//! | Module  | Commands handled                               |
//! |---------|------------------------------------------------|
//! | `serve` | `Serve`, `Init`                                |
//! | `data`  | `Import`, `Export`, `NotifyOverdue`            |

pub mod data;
pub mod serve;

pub use data::{cmd_export, cmd_import, cmd_notify_overdue};
pub use serve::{cmd_init, cmd_serve};
