//! Renderer contract consumed by PRINT.
//!
//! The engine does not render anything itself. PRINT hands the accepted
//! row contexts to an [`EntryRenderer`] together with the display context
//! carried by the table, forwarded unchanged.

use crate::error::Result;
use crate::tables::Row;

/// Number formatting options carried by a table and forwarded to
/// renderers. The engine does not interpret these.
#[derive(Debug, Clone, Default)]
pub struct DisplayContext {
    /// Whether to group digits with commas.
    pub commas: bool,
    /// Fixed number of fractional digits, if any.
    pub precision: Option<u32>,
}

/// Receives the entries accepted by a PRINT statement.
pub trait EntryRenderer {
    /// Renders one batch of accepted entries.
    ///
    /// # Errors
    ///
    /// Implementations may fail on their output channel.
    fn render(&mut self, entries: &[Row], dcontext: &DisplayContext) -> Result<()>;
}

/// A renderer that discards everything. Installed by default on new
/// connections.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl EntryRenderer for NullRenderer {
    fn render(&mut self, _entries: &[Row], _dcontext: &DisplayContext) -> Result<()> {
        Ok(())
    }
}
