//! Singular forward link column: one optional target row per origin row,
//! stored one-shifted so that zero means null.

use crate::error::{LinkError, Result};
use crate::types::{ColNdx, LinkKind, RowNdx, TableNdx};

use super::arena::Arena;
use super::backlink::BacklinkColumn;
use super::cell::{link_target, link_word};

#[derive(Debug)]
pub(crate) struct LinkColumn {
    cells: Vec<u64>,
    pub target_table: TableNdx,
    pub backlink_col: ColNdx,
    pub kind: LinkKind,
}

impl LinkColumn {
    pub fn new(target_table: TableNdx, backlink_col: ColNdx, kind: LinkKind, num_rows: usize) -> Self {
        Self {
            cells: vec![0; num_rows],
            target_table,
            backlink_col,
            kind,
        }
    }

    /// Rebuilds a column from raw cell words, for the snapshot reader.
    pub fn from_words(
        target_table: TableNdx,
        backlink_col: ColNdx,
        kind: LinkKind,
        cells: Vec<u64>,
    ) -> Self {
        Self {
            cells,
            target_table,
            backlink_col,
            kind,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn word(&self, row: RowNdx) -> Result<u64> {
        self.cells
            .get(row)
            .copied()
            .ok_or_else(|| LinkError::range(row, self.cells.len()))
    }

    pub fn get(&self, row: RowNdx) -> Result<Option<RowNdx>> {
        Ok(link_target(self.word(row)?))
    }

    /// Writes `new_target`, maintaining the paired backlink column, and
    /// returns the prior target. The old backlink is removed before the cell
    /// is rewritten and the new backlink added last, so a failure partway
    /// leaves no half-recorded edge.
    pub fn set(
        &mut self,
        row: RowNdx,
        new_target: Option<RowNdx>,
        backlinks: &mut BacklinkColumn,
        arena: &mut Arena,
    ) -> Result<Option<RowNdx>> {
        let old_target = self.get(row)?;
        if let Some(old) = old_target {
            backlinks.remove_one(arena, old, row)?;
        }
        self.cells[row] = link_word(new_target);
        if let Some(new) = new_target {
            backlinks.add(arena, new, row)?;
        }
        Ok(old_target)
    }

    pub fn insert_null_cells(&mut self, at: usize, n: usize) {
        for i in 0..n {
            self.cells.insert(at + i, 0);
        }
    }

    /// Clears the cell without touching the backlink side. Invoked by the
    /// backlink column when the target row is going away.
    pub fn nullify(&mut self, row: RowNdx) -> Result<()> {
        if row >= self.cells.len() {
            return Err(LinkError::range(row, self.cells.len()));
        }
        self.cells[row] = 0;
        Ok(())
    }

    /// Rewrites the cell from `old` to `new`. Invoked by the backlink column
    /// when the target row index shifts; the cell must currently hold `old`.
    pub fn retarget(&mut self, row: RowNdx, old: RowNdx, new: RowNdx) -> Result<()> {
        if self.word(row)? != link_word(Some(old)) {
            return Err(LinkError::InvariantViolation(
                "forward cell does not hold the retargeted row",
            ));
        }
        self.cells[row] = link_word(Some(new));
        Ok(())
    }

    /// Rewrites the cell so that target `a` becomes `b` and vice versa.
    /// Invoked by the backlink side during target-row swaps.
    pub fn swap_target(&mut self, row: RowNdx, a: RowNdx, b: RowNdx) -> Result<()> {
        let word = self.word(row)?;
        if word == link_word(Some(a)) {
            self.cells[row] = link_word(Some(b));
        } else if word == link_word(Some(b)) {
            self.cells[row] = link_word(Some(a));
        }
        Ok(())
    }

    pub fn erase_cell_words(&mut self, at: usize, n: usize) {
        self.cells.drain(at..at + n);
    }

    pub fn move_last_cell_over(&mut self, row: RowNdx) {
        let word = self.cells.pop().expect("column not empty");
        if row < self.cells.len() {
            self.cells[row] = word;
        }
    }

    pub fn swap_cell_words(&mut self, i: RowNdx, j: RowNdx) {
        self.cells.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_maintains_reciprocal_backlinks() -> Result<()> {
        let mut arena = Arena::new();
        let mut links = LinkColumn::new(1, 0, LinkKind::Strong, 2);
        let mut backlinks = BacklinkColumn::new(0, 0, 3);

        assert_eq!(links.set(0, Some(2), &mut backlinks, &mut arena)?, None);
        assert_eq!(links.get(0)?, Some(2));
        assert_eq!(backlinks.count(&arena, 2)?, 1);

        assert_eq!(links.set(0, Some(1), &mut backlinks, &mut arena)?, Some(2));
        assert_eq!(backlinks.count(&arena, 2)?, 0);
        assert_eq!(backlinks.count(&arena, 1)?, 1);

        assert_eq!(links.set(0, None, &mut backlinks, &mut arena)?, Some(1));
        assert_eq!(backlinks.count(&arena, 1)?, 0);
        assert_eq!(links.get(0)?, None);
        Ok(())
    }

    #[test]
    fn null_is_encoded_as_zero() -> Result<()> {
        let mut arena = Arena::new();
        let mut links = LinkColumn::new(0, 0, LinkKind::Weak, 1);
        let mut backlinks = BacklinkColumn::new(0, 0, 1);
        assert_eq!(links.word(0)?, 0);
        links.set(0, Some(0), &mut backlinks, &mut arena)?;
        assert_eq!(links.word(0)?, 1);
        Ok(())
    }

    #[test]
    fn retarget_requires_matching_cell() {
        let mut links = LinkColumn::new(0, 0, LinkKind::Weak, 1);
        assert!(matches!(
            links.retarget(0, 4, 2),
            Err(LinkError::InvariantViolation(_))
        ));
    }

    #[test]
    fn swap_target_rewrites_either_direction() -> Result<()> {
        let mut arena = Arena::new();
        let mut links = LinkColumn::new(0, 0, LinkKind::Weak, 2);
        let mut backlinks = BacklinkColumn::new(0, 0, 8);
        links.set(0, Some(4), &mut backlinks, &mut arena)?;
        links.set(1, Some(6), &mut backlinks, &mut arena)?;
        links.swap_target(0, 4, 6)?;
        links.swap_target(1, 4, 6)?;
        assert_eq!(links.get(0)?, Some(6));
        assert_eq!(links.get(1)?, Some(4));
        Ok(())
    }
}
