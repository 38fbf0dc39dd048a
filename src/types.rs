//! Index and schema types shared across the engine.

/// Index of a table within the database. Stable for the schema lifetime,
/// except that removing a table moves the last table into the vacated slot.
pub type TableNdx = usize;

/// Index of a column within its table.
pub type ColNdx = usize;

/// 0-based index of a row within its table. Stable only between structural
/// mutations of that table. The row domain is 63 bits; cell encodings
/// reserve one bit for tagging.
pub type RowNdx = usize;

/// Whether severing the last strong incoming edge of a target row triggers
/// cascading deletion of that row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkKind {
    Strong,
    Weak,
}

impl LinkKind {
    pub fn is_weak(self) -> bool {
        matches!(self, LinkKind::Weak)
    }

    pub fn is_strong(self) -> bool {
        matches!(self, LinkKind::Strong)
    }
}
