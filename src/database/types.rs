// src/database/types.rs

/// What to do when a reading's (location, source timestamp) key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Leave the stored reading untouched and report [`InsertOutcome::Skipped`]
    #[default]
    Skip,
    /// Report the duplicate as an error
    Fail,
}

/// Result of inserting a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Skipped,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}
