//! Backlink column: per target row, the multiset of origin rows that
//! currently reference it through one specific forward column.
//!
//! A set of size one is stored inline in the cell word with the low bit as
//! tag; larger sets live in an arena store. Transitions between the two
//! representations are the column's responsibility, including freeing the
//! backing store when the set collapses back to one entry.

use smallvec::SmallVec;

use crate::error::{LinkError, Result};
use crate::types::{ColNdx, RowNdx, TableNdx};

use super::arena::Arena;
use super::cell::BacklinkCell;
use super::int_store::IntStore;

pub(crate) type RowBuf = SmallVec<[RowNdx; 8]>;

#[derive(Debug)]
pub(crate) struct BacklinkColumn {
    cells: Vec<u64>,
    pub origin_table: TableNdx,
    pub origin_col: ColNdx,
}

impl BacklinkColumn {
    pub fn new(origin_table: TableNdx, origin_col: ColNdx, num_rows: usize) -> Self {
        Self {
            cells: vec![0; num_rows],
            origin_table,
            origin_col,
        }
    }

    /// Rebuilds a column from raw cell words, for the snapshot reader.
    pub fn from_words(origin_table: TableNdx, origin_col: ColNdx, cells: Vec<u64>) -> Self {
        Self {
            cells,
            origin_table,
            origin_col,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn word(&self, target_row: RowNdx) -> Result<u64> {
        self.cells
            .get(target_row)
            .copied()
            .ok_or_else(|| LinkError::range(target_row, self.cells.len()))
    }

    pub fn cell(&self, target_row: RowNdx) -> Result<BacklinkCell> {
        Ok(BacklinkCell::from_word(self.word(target_row)?))
    }

    fn set_cell(&mut self, target_row: RowNdx, cell: BacklinkCell) {
        self.cells[target_row] = cell.word();
    }

    /// Appends one occurrence of `origin_row` to the cell at `target_row`,
    /// promoting the representation as needed. The store is allocated before
    /// the cell word changes, so an allocation failure leaves the cell
    /// untouched.
    pub fn add(&mut self, arena: &mut Arena, target_row: RowNdx, origin_row: RowNdx) -> Result<()> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => {
                self.set_cell(target_row, BacklinkCell::Inline(origin_row));
            }
            BacklinkCell::Inline(prior) => {
                let mut store = IntStore::create(1, prior as u64);
                store.add(origin_row as u64);
                let r = arena.alloc(store)?;
                self.set_cell(target_row, BacklinkCell::Store(r));
            }
            BacklinkCell::Store(r) => {
                arena.get_mut(r)?.add(origin_row as u64);
            }
        }
        Ok(())
    }

    /// Removes exactly one occurrence of `origin_row`. A store that falls to
    /// one entry is freed and its survivor re-inlined into the cell word.
    pub fn remove_one(
        &mut self,
        arena: &mut Arena,
        target_row: RowNdx,
        origin_row: RowNdx,
    ) -> Result<()> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => Err(LinkError::InvariantViolation(
                "removing backlink from empty cell",
            )),
            BacklinkCell::Inline(origin) => {
                if origin != origin_row {
                    return Err(LinkError::InvariantViolation(
                        "inline backlink does not match removed origin",
                    ));
                }
                self.set_cell(target_row, BacklinkCell::Empty);
                Ok(())
            }
            BacklinkCell::Store(r) => {
                let store = arena.get_mut(r)?;
                let ndx = store.find_first(origin_row as u64).ok_or(
                    LinkError::InvariantViolation("backlink to remove not found in store"),
                )?;
                store.erase(ndx)?;
                if store.size() == 1 {
                    let survivor = store.get(0)? as RowNdx;
                    arena.free(r)?;
                    self.set_cell(target_row, BacklinkCell::Inline(survivor));
                }
                Ok(())
            }
        }
    }

    pub fn count(&self, arena: &Arena, target_row: RowNdx) -> Result<usize> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => Ok(0),
            BacklinkCell::Inline(_) => Ok(1),
            BacklinkCell::Store(r) => Ok(arena.get(r)?.size()),
        }
    }

    pub fn get_nth(&self, arena: &Arena, target_row: RowNdx, n: usize) -> Result<RowNdx> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => Err(LinkError::range(n, 0)),
            BacklinkCell::Inline(origin) => {
                if n != 0 {
                    return Err(LinkError::range(n, 1));
                }
                Ok(origin)
            }
            BacklinkCell::Store(r) => Ok(arena.get(r)?.get(n)? as RowNdx),
        }
    }

    /// Replaces the first occurrence of `old_origin` with `new_origin`.
    pub fn rename_origin(
        &mut self,
        arena: &mut Arena,
        target_row: RowNdx,
        old_origin: RowNdx,
        new_origin: RowNdx,
    ) -> Result<()> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => Err(LinkError::InvariantViolation(
                "renaming origin in empty backlink cell",
            )),
            BacklinkCell::Inline(origin) => {
                if origin != old_origin {
                    return Err(LinkError::InvariantViolation(
                        "inline backlink does not match renamed origin",
                    ));
                }
                self.set_cell(target_row, BacklinkCell::Inline(new_origin));
                Ok(())
            }
            BacklinkCell::Store(r) => {
                let store = arena.get_mut(r)?;
                let ndx = store.find_first(old_origin as u64).ok_or(
                    LinkError::InvariantViolation("origin to rename not found in store"),
                )?;
                store.set(ndx, new_origin as u64)
            }
        }
    }

    /// Within one cell, rewrites every occurrence of `a` to `b` and vice
    /// versa. Used when two origin rows swap places.
    pub fn swap_origins(
        &mut self,
        arena: &mut Arena,
        target_row: RowNdx,
        a: RowNdx,
        b: RowNdx,
    ) -> Result<()> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => Err(LinkError::InvariantViolation(
                "swapping origins in empty backlink cell",
            )),
            BacklinkCell::Inline(origin) => {
                if origin == a {
                    self.set_cell(target_row, BacklinkCell::Inline(b));
                } else if origin == b {
                    self.set_cell(target_row, BacklinkCell::Inline(a));
                }
                Ok(())
            }
            BacklinkCell::Store(r) => {
                let store = arena.get_mut(r)?;
                for ndx in 0..store.size() {
                    let origin = store.get(ndx)? as RowNdx;
                    if origin == a {
                        store.set(ndx, b as u64)?;
                    } else if origin == b {
                        store.set(ndx, a as u64)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Calls `consume` for every origin occurrence in the cell. With `drain`
    /// the backing store is freed and the cell reset to empty afterwards,
    /// for erase paths that are dismantling the cell anyway.
    pub fn for_each(
        &mut self,
        arena: &mut Arena,
        target_row: RowNdx,
        drain: bool,
        mut consume: impl FnMut(RowNdx),
    ) -> Result<()> {
        match self.cell(target_row)? {
            BacklinkCell::Empty => {}
            BacklinkCell::Inline(origin) => {
                consume(origin);
                if drain {
                    self.set_cell(target_row, BacklinkCell::Empty);
                }
            }
            BacklinkCell::Store(r) => {
                for origin in arena.get(r)?.iter() {
                    consume(origin as RowNdx);
                }
                if drain {
                    arena.free(r)?;
                    self.set_cell(target_row, BacklinkCell::Empty);
                }
            }
        }
        Ok(())
    }

    /// Read-only snapshot of every origin occurrence in the cell.
    pub fn origins(&self, arena: &Arena, target_row: RowNdx) -> Result<RowBuf> {
        let mut out = RowBuf::new();
        match self.cell(target_row)? {
            BacklinkCell::Empty => {}
            BacklinkCell::Inline(origin) => out.push(origin),
            BacklinkCell::Store(r) => {
                out.extend(arena.get(r)?.iter().map(|v| v as RowNdx));
            }
        }
        Ok(out)
    }

    /// Frees every backing store in `range` and resets the cells to empty.
    pub fn clear_cells(&mut self, arena: &mut Arena, range: std::ops::Range<usize>) -> Result<()> {
        for row in range {
            if let BacklinkCell::Store(r) = self.cell(row)? {
                arena.free(r)?;
            }
            self.cells[row] = 0;
        }
        Ok(())
    }

    pub fn insert_cells(&mut self, at: usize, n: usize) {
        for i in 0..n {
            self.cells.insert(at + i, 0);
        }
    }

    /// Removes `n` cell words starting at `at`. The caller must have drained
    /// the cells first.
    pub fn erase_cell_words(&mut self, at: usize, n: usize) {
        self.cells.drain(at..at + n);
    }

    /// Moves the last cell word into `row` and shortens the column.
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
    use crate::store::cell::BacklinkCell;

    fn column() -> (BacklinkColumn, Arena) {
        (BacklinkColumn::new(0, 0, 4), Arena::new())
    }

    #[test]
    fn add_promotes_inline_to_store() -> Result<()> {
        let (mut col, mut arena) = column();
        col.add(&mut arena, 1, 10)?;
        assert_eq!(col.cell(1)?, BacklinkCell::Inline(10));
        col.add(&mut arena, 1, 11)?;
        assert!(matches!(col.cell(1)?, BacklinkCell::Store(_)));
        assert_eq!(col.count(&arena, 1)?, 2);
        assert_eq!(col.get_nth(&arena, 1, 0)?, 10);
        assert_eq!(col.get_nth(&arena, 1, 1)?, 11);
        Ok(())
    }

    #[test]
    fn remove_demotes_store_to_inline_and_frees_it() -> Result<()> {
        let (mut col, mut arena) = column();
        col.add(&mut arena, 2, 5)?;
        col.add(&mut arena, 2, 6)?;
        assert_eq!(arena.live_stores(), 1);
        col.remove_one(&mut arena, 2, 5)?;
        assert_eq!(col.cell(2)?, BacklinkCell::Inline(6));
        assert_eq!(arena.live_stores(), 0);
        col.remove_one(&mut arena, 2, 6)?;
        assert_eq!(col.cell(2)?, BacklinkCell::Empty);
        Ok(())
    }

    #[test]
    fn remove_missing_origin_is_an_invariant_violation() {
        let (mut col, mut arena) = column();
        assert!(matches!(
            col.remove_one(&mut arena, 0, 3),
            Err(LinkError::InvariantViolation(_))
        ));
        col.add(&mut arena, 0, 1).unwrap();
        assert!(matches!(
            col.remove_one(&mut arena, 0, 3),
            Err(LinkError::InvariantViolation(_))
        ));
    }

    #[test]
    fn duplicate_origins_keep_multiplicity() -> Result<()> {
        let (mut col, mut arena) = column();
        col.add(&mut arena, 0, 7)?;
        col.add(&mut arena, 0, 7)?;
        col.add(&mut arena, 0, 7)?;
        assert_eq!(col.count(&arena, 0)?, 3);
        col.remove_one(&mut arena, 0, 7)?;
        assert_eq!(col.count(&arena, 0)?, 2);
        col.remove_one(&mut arena, 0, 7)?;
        assert_eq!(col.cell(0)?, BacklinkCell::Inline(7));
        Ok(())
    }

    #[test]
    fn swap_origins_rewrites_both_directions_once() -> Result<()> {
        let (mut col, mut arena) = column();
        col.add(&mut arena, 0, 1)?;
        col.add(&mut arena, 0, 2)?;
        col.add(&mut arena, 0, 1)?;
        col.swap_origins(&mut arena, 0, 1, 2)?;
        let origins = col.origins(&arena, 0)?;
        assert_eq!(origins.as_slice(), &[2, 1, 2]);
        Ok(())
    }

    #[test]
    fn drain_for_each_frees_the_store() -> Result<()> {
        let (mut col, mut arena) = column();
        col.add(&mut arena, 3, 8)?;
        col.add(&mut arena, 3, 9)?;
        let mut seen = Vec::new();
        col.for_each(&mut arena, 3, true, |o| seen.push(o))?;
        assert_eq!(seen, vec![8, 9]);
        assert_eq!(col.cell(3)?, BacklinkCell::Empty);
        assert_eq!(arena.live_stores(), 0);
        Ok(())
    }

    #[test]
    fn clear_cells_resets_a_range() -> Result<()> {
        let (mut col, mut arena) = column();
        col.add(&mut arena, 0, 1)?;
        col.add(&mut arena, 1, 2)?;
        col.add(&mut arena, 1, 3)?;
        col.clear_cells(&mut arena, 0..2)?;
        assert_eq!(col.count(&arena, 0)?, 0);
        assert_eq!(col.count(&arena, 1)?, 0);
        assert_eq!(arena.live_stores(), 0);
        Ok(())
    }
}
