//! Live handle onto one link-list cell.
//!
//! A view addresses its cell by (table, column, origin row); the owning
//! column's accessor registry rewrites that address whenever rows shift, so
//! the handle keeps pointing at the same logical list across structural
//! mutations. Once the row, column, or database disappears the view is
//! detached for good and every operation fails with `DetachedAccessor`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::db::GraphCore;
use crate::error::{LinkError, Result};
use crate::replication::ListAddr;
use crate::types::{ColNdx, RowNdx, TableNdx};

pub struct LinkView {
    core: Weak<GraphCore>,
    state: Mutex<ViewState>,
    tombstones: Arc<AtomicBool>,
}

#[derive(Clone, Copy, Debug)]
struct ViewState {
    table: TableNdx,
    col: ColNdx,
    row: RowNdx,
    attached: bool,
}

impl LinkView {
    pub(crate) fn make(
        core: &Arc<GraphCore>,
        table: TableNdx,
        col: ColNdx,
        row: RowNdx,
        tombstones: Arc<AtomicBool>,
    ) -> Arc<LinkView> {
        Arc::new(LinkView {
            core: Arc::downgrade(core),
            state: Mutex::new(ViewState {
                table,
                col,
                row,
                attached: true,
            }),
            tombstones,
        })
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached && self.core.strong_count() > 0
    }

    /// Current index of the origin row this view is bound to.
    pub fn origin_row(&self) -> Result<RowNdx> {
        let state = self.state.lock();
        if !state.attached {
            return Err(LinkError::DetachedAccessor);
        }
        Ok(state.row)
    }

    pub fn origin_table(&self) -> Result<TableNdx> {
        let state = self.state.lock();
        if !state.attached {
            return Err(LinkError::DetachedAccessor);
        }
        Ok(state.table)
    }

    pub fn origin_column(&self) -> Result<ColNdx> {
        let state = self.state.lock();
        if !state.attached {
            return Err(LinkError::DetachedAccessor);
        }
        Ok(state.col)
    }

    pub fn target_table(&self) -> Result<TableNdx> {
        self.with_inner(|inner, t, c, _| inner.list_target_table(t, c))
    }

    pub fn len(&self) -> Result<usize> {
        self.with_inner(|inner, t, c, r| inner.list_len(t, c, r))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Target row listed at `ndx`.
    pub fn get(&self, ndx: usize) -> Result<RowNdx> {
        self.with_inner(|inner, t, c, r| inner.list_target_at(t, c, r, ndx))
    }

    /// Index of the first link to `target`, if present.
    pub fn find(&self, target: RowNdx) -> Result<Option<usize>> {
        self.with_inner(|inner, t, c, r| inner.list_find(t, c, r, target))
    }

    pub fn insert(&self, ndx: usize, target: RowNdx) -> Result<()> {
        self.with_inner(|inner, t, c, r| inner.list_insert(t, c, r, ndx, target))
    }

    /// Appends a link to `target`.
    pub fn add(&self, target: RowNdx) -> Result<()> {
        self.with_inner(|inner, t, c, r| {
            let len = inner.list_len(t, c, r)?;
            inner.list_insert(t, c, r, len, target)
        })
    }

    pub fn set(&self, ndx: usize, target: RowNdx) -> Result<()> {
        self.with_inner(|inner, t, c, r| inner.list_set(t, c, r, ndx, target))
    }

    pub fn remove(&self, ndx: usize) -> Result<()> {
        self.with_inner(|inner, t, c, r| inner.list_erase(t, c, r, ndx))
    }

    /// Reorders the list so the link at `from` sits at `to`. No backlink
    /// changes; equal indexes are a no-op.
    pub fn move_link(&self, from: usize, to: usize) -> Result<()> {
        self.with_inner(|inner, t, c, r| inner.list_move(t, c, r, from, to))
    }

    /// Swaps two links. Equal indexes are a no-op; the pair is canonicalized
    /// so downstream consumers always observe the smaller index first.
    pub fn swap(&self, a: usize, b: usize) -> Result<()> {
        self.with_inner(|inner, t, c, r| inner.list_swap(t, c, r, a, b))
    }

    pub fn clear(&self) -> Result<()> {
        self.with_inner(|inner, t, c, r| inner.list_clear(t, c, r))
    }

    /// Erases the target row listed at `ndx` from the target table, which
    /// transitively unlinks it here and everywhere else.
    pub fn delete_target(&self, ndx: usize) -> Result<()> {
        self.with_inner(|inner, t, c, r| {
            let target = inner.list_target_at(t, c, r, ndx)?;
            let target_table = inner.list_target_table(t, c)?;
            inner.remove_row_cascade(target_table, target)
        })
    }

    /// Erases every listed target row from the target table.
    pub fn remove_all_targets(&self) -> Result<()> {
        loop {
            let core = self.core.upgrade().ok_or(LinkError::DetachedAccessor)?;
            let mut inner = core.inner.lock();
            let (t, c, r) = self.location()?;
            if inner.list_len(t, c, r)? == 0 {
                return Ok(());
            }
            let target = inner.list_target_at(t, c, r, 0)?;
            let target_table = inner.list_target_table(t, c)?;
            inner.remove_row_cascade(target_table, target)?;
        }
    }

    fn location(&self) -> Result<(TableNdx, ColNdx, RowNdx)> {
        let state = self.state.lock();
        if !state.attached {
            return Err(LinkError::DetachedAccessor);
        }
        Ok((state.table, state.col, state.row))
    }

    fn with_inner<R>(
        &self,
        f: impl FnOnce(&mut crate::db::GraphInner, TableNdx, ColNdx, RowNdx) -> Result<R>,
    ) -> Result<R> {
        let core = self.core.upgrade().ok_or(LinkError::DetachedAccessor)?;
        let mut inner = core.inner.lock();
        let (t, c, r) = self.location()?;
        f(&mut inner, t, c, r)
    }

    pub(crate) fn set_row(&self, row: RowNdx) {
        self.state.lock().row = row;
    }

    pub(crate) fn set_table(&self, table: TableNdx) {
        self.state.lock().table = table;
    }

    /// One-way transition out of the attached state. The registry entry is
    /// the caller's to clean up.
    pub(crate) fn detach_only(&self) {
        self.state.lock().attached = false;
    }
}

impl std::fmt::Debug for LinkView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LinkView")
            .field("table", &state.table)
            .field("col", &state.col)
            .field("row", &state.row)
            .field("attached", &state.attached)
            .finish()
    }
}

impl Drop for LinkView {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if !state.attached {
            return;
        }
        self.tombstones.store(true, Ordering::Release);
        if let Some(core) = self.core.upgrade() {
            // try_lock: dropping the last handle from inside a mutation
            // callback must not deadlock; the tombstone flag already
            // guarantees the registry entry gets reaped.
            if let Some(mut inner) = core.inner.try_lock() {
                let addr = ListAddr {
                    table: state.table,
                    col: state.col,
                    row: state.row,
                };
                inner.notify_view_destroyed(addr);
            }
        }
    }
}
