//! Built-in event handlers
//!
//! - [`lifecycle`]: `connection` and `disconnect`, driving the connection directory
//! - [`playlist`]: the `playlist` operations

pub mod lifecycle;
pub mod playlist;

use crate::dispatch::EventTable;
use crate::error::Result;
use crate::state::HubContext;

/// Install every built-in handler
pub fn register_all(table: &mut EventTable<HubContext>) -> Result<()> {
    lifecycle::register(table)?;
    playlist::register(table)?;
    Ok(())
}
