//! Link-list column: an ordered sequence of target rows per origin row,
//! plus the registry of live [`LinkView`] accessors onto its cells.
//!
//! An empty list has no backing store at all; the cell word stays zero until
//! the first insert. The registry keeps at most one live view per origin row,
//! sorted by row, and is what keeps outstanding views pointing at the right
//! cell while rows shift underneath them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{LinkError, Result};
use crate::types::{ColNdx, LinkKind, RowNdx, TableNdx};

use super::arena::{Arena, StoreRef};
use super::backlink::RowBuf;
use super::cell::list_cell_ref;
use super::int_store::IntStore;
use super::view::LinkView;

#[derive(Debug)]
pub(crate) struct LinkListColumn {
    cells: Vec<u64>,
    pub target_table: TableNdx,
    pub backlink_col: ColNdx,
    pub kind: LinkKind,
    pub accessors: AccessorRegistry,
}

impl LinkListColumn {
    pub fn new(target_table: TableNdx, backlink_col: ColNdx, kind: LinkKind, num_rows: usize) -> Self {
        Self {
            cells: vec![0; num_rows],
            target_table,
            backlink_col,
            kind,
            accessors: AccessorRegistry::new(),
        }
    }

    /// Rebuilds a column from raw cell words, for the snapshot reader. The
    /// accessor registry starts empty; views never survive a restore.
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
            accessors: AccessorRegistry::new(),
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

    pub fn cell_ref(&self, row: RowNdx) -> Result<Option<StoreRef>> {
        list_cell_ref(self.word(row)?)
    }

    pub fn is_degenerate(&self, row: RowNdx) -> Result<bool> {
        Ok(self.cell_ref(row)?.is_none())
    }

    pub fn list_len(&self, arena: &Arena, row: RowNdx) -> Result<usize> {
        match self.cell_ref(row)? {
            None => Ok(0),
            Some(r) => Ok(arena.get(r)?.size()),
        }
    }

    pub fn target_at(&self, arena: &Arena, row: RowNdx, ndx: usize) -> Result<RowNdx> {
        match self.cell_ref(row)? {
            None => Err(LinkError::range(ndx, 0)),
            Some(r) => Ok(arena.get(r)?.get(ndx)? as RowNdx),
        }
    }

    /// Read-only snapshot of the listed target rows.
    pub fn targets(&self, arena: &Arena, row: RowNdx) -> Result<RowBuf> {
        let mut out = RowBuf::new();
        if let Some(r) = self.cell_ref(row)? {
            out.extend(arena.get(r)?.iter().map(|v| v as RowNdx));
        }
        Ok(out)
    }

    /// Returns the cell's backing store, allocating it on first use. The
    /// allocation happens before the cell word is rewritten.
    pub fn ensure_store(&mut self, arena: &mut Arena, row: RowNdx) -> Result<StoreRef> {
        if let Some(r) = self.cell_ref(row)? {
            return Ok(r);
        }
        let r = arena.alloc(IntStore::new())?;
        self.cells[row] = r;
        Ok(r)
    }

    /// Frees the backing store, if any, and resets the cell to degenerate.
    pub fn free_cell(&mut self, arena: &mut Arena, row: RowNdx) -> Result<()> {
        if let Some(r) = self.cell_ref(row)? {
            arena.free(r)?;
            self.cells[row] = 0;
        }
        Ok(())
    }

    /// Collapses the cell back to the degenerate representation once its
    /// list has become empty.
    pub fn release_if_empty(&mut self, arena: &mut Arena, row: RowNdx) -> Result<()> {
        if let Some(r) = self.cell_ref(row)? {
            if arena.get(r)?.is_empty() {
                arena.free(r)?;
                self.cells[row] = 0;
            }
        }
        Ok(())
    }

    pub fn insert_cells(&mut self, at: usize, n: usize) {
        for i in 0..n {
            self.cells.insert(at + i, 0);
        }
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

struct AccessorEntry {
    row: RowNdx,
    view: Weak<LinkView>,
}

impl std::fmt::Debug for AccessorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorEntry")
            .field("row", &self.row)
            .field("live", &(self.view.strong_count() > 0))
            .finish()
    }
}

/// Registry of live views for one column, sorted by origin row with no
/// duplicate rows. Dropped views leave expired weak entries (tombstones)
/// behind; a shared flag records that some may exist, and each mutator
/// prunes them best-effort before adjusting.
#[derive(Debug)]
pub(crate) struct AccessorRegistry {
    entries: Vec<AccessorEntry>,
    tombstones: Arc<AtomicBool>,
}

impl AccessorRegistry {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            tombstones: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tombstone_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.tombstones)
    }

    /// Drops expired entries. After this call fresh tombstones may still
    /// appear; removal is merely best-effort compaction.
    pub fn prune(&mut self) {
        if !self.tombstones.swap(false, Ordering::AcqRel) {
            return;
        }
        self.entries.retain(|e| e.view.strong_count() > 0);
    }

    fn lower_bound(&self, row: RowNdx) -> usize {
        self.entries.partition_point(|e| e.row < row)
    }

    /// The live view registered for `row`, if any.
    pub fn lookup(&self, row: RowNdx) -> Option<Arc<LinkView>> {
        let pos = self.lower_bound(row);
        let entry = self.entries.get(pos)?;
        if entry.row != row {
            return None;
        }
        entry.view.upgrade()
    }

    /// Registers `view` for `row`, replacing a tombstone in place when one
    /// occupies the slot.
    pub fn install(&mut self, row: RowNdx, view: &Arc<LinkView>) {
        let pos = self.lower_bound(row);
        if let Some(entry) = self.entries.get_mut(pos) {
            if entry.row == row {
                entry.view = Arc::downgrade(view);
                return;
            }
        }
        self.entries.insert(
            pos,
            AccessorEntry {
                row,
                view: Arc::downgrade(view),
            },
        );
    }

    /// Shifts entries at rows `at..` up by `n` inserted rows.
    pub fn adj_insert_rows(&mut self, at: RowNdx, n: usize) {
        self.prune();
        let start = self.lower_bound(at);
        for entry in &mut self.entries[start..] {
            entry.row += n;
            if let Some(view) = entry.view.upgrade() {
                view.set_row(entry.row);
            }
        }
        self.debug_check();
    }

    /// Detaches views in the erased range and shifts the entries above down.
    pub fn adj_erase_rows(&mut self, at: RowNdx, n: usize) {
        self.prune();
        let erased_begin = self.lower_bound(at);
        let erased_end = self.lower_bound(at + n);
        for entry in &self.entries[erased_begin..erased_end] {
            if let Some(view) = entry.view.upgrade() {
                view.detach_only();
            }
        }
        for entry in &mut self.entries[erased_end..] {
            entry.row -= n;
            if let Some(view) = entry.view.upgrade() {
                view.set_row(entry.row);
            }
        }
        self.entries.drain(erased_begin..erased_end);
        self.debug_check();
    }

    /// The row at `from` (the last row) replaces `to`: the `to` view is
    /// detached and tombstoned, the `from` view re-indexed to `to` and its
    /// entry moved back into sorted position.
    pub fn adj_move_over(&mut self, from: RowNdx, to: RowNdx) {
        self.prune();
        let to_pos = self.lower_bound(to);
        let mut to_found = false;
        if let Some(entry) = self.entries.get_mut(to_pos) {
            if entry.row == to {
                to_found = true;
                if let Some(view) = entry.view.upgrade() {
                    view.detach_only();
                    entry.view = Weak::new();
                    self.tombstones.store(true, Ordering::Release);
                }
            }
        }
        if from == to {
            self.debug_check();
            return;
        }

        let from_pos = self.lower_bound(from);
        if from_pos < self.entries.len() && self.entries[from_pos].row == from {
            self.entries[from_pos].row = to;
            if let Some(view) = self.entries[from_pos].view.upgrade() {
                view.set_row(to);
            }
            if to_found {
                self.entries[to_pos].row = from;
                self.entries.swap(to_pos, from_pos);
            } else if from_pos < to_pos {
                self.entries[from_pos..to_pos].rotate_left(1);
            } else {
                self.entries[to_pos..=from_pos].rotate_right(1);
            }
        }
        self.debug_check();
    }

    /// Swaps the registrations for rows `i` and `j`.
    pub fn adj_swap(&mut self, i: RowNdx, j: RowNdx) {
        self.prune();
        let pos_i = self.lower_bound(i);
        let view_i = self
            .entries
            .get(pos_i)
            .filter(|e| e.row == i)
            .and_then(|e| e.view.upgrade());
        let pos_j = self.lower_bound(j);
        let view_j = self
            .entries
            .get(pos_j)
            .filter(|e| e.row == j)
            .and_then(|e| e.view.upgrade());

        match (view_i, view_j) {
            (Some(view_i), Some(view_j)) => {
                view_i.set_row(j);
                view_j.set_row(i);
                let weak_i = std::mem::replace(&mut self.entries[pos_i].view, Weak::new());
                let weak_j = std::mem::replace(&mut self.entries[pos_j].view, weak_i);
                self.entries[pos_i].view = weak_j;
            }
            (Some(view_i), None) => {
                self.entries[pos_i].row = j;
                view_i.set_row(j);
                if pos_i < pos_j {
                    self.entries[pos_i..pos_j].rotate_left(1);
                } else {
                    self.entries[pos_j..=pos_i].rotate_right(1);
                }
            }
            (None, Some(view_j)) => {
                self.entries[pos_j].row = i;
                view_j.set_row(i);
                if pos_j < pos_i {
                    self.entries[pos_j..pos_i].rotate_left(1);
                } else {
                    self.entries[pos_i..=pos_j].rotate_right(1);
                }
            }
            (None, None) => {}
        }
        self.debug_check();
    }

    /// Detaches every live view and empties the registry.
    pub fn detach_all(&mut self) {
        for entry in &self.entries {
            if let Some(view) = entry.view.upgrade() {
                view.detach_only();
            }
        }
        self.entries.clear();
    }

    /// Re-points every live view at a new owning table index. Used when the
    /// whole table moves to a different slot.
    pub fn rehome_views(&mut self, table: TableNdx) {
        for entry in &self.entries {
            if let Some(view) = entry.view.upgrade() {
                view.set_table(table);
            }
        }
    }

    /// Checks the sorted-and-unique invariant, ignoring nothing: tombstones
    /// keep their row slot until pruned.
    pub fn is_sorted_unique(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].row < w[1].row)
    }

    /// Rows of live entries, for integrity checks.
    pub fn live_rows(&self) -> Vec<RowNdx> {
        self.entries
            .iter()
            .filter(|e| e.view.strong_count() > 0)
            .map(|e| e.row)
            .collect()
    }

    fn debug_check(&self) {
        debug_assert!(self.is_sorted_unique());
    }
}
