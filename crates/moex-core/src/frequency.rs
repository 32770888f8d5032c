//! Sampling frequency for derived return tables.

use serde::{Deserialize, Serialize};

/// Row spacing of a return table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnFrequency {
    /// One row per trading session.
    #[default]
    Daily,
    /// One row per calendar month, anchored on the as-of day of month.
    Monthly,
}

impl ReturnFrequency {
    /// Returns true if rows are spaced by calendar months rather than sessions.
    #[must_use]
    pub const fn is_calendar_based(&self) -> bool {
        matches!(self, Self::Monthly)
    }
}
