//! Database facade over the link-graph engine.
//!
//! [`LinkGraph`] owns the table vector and store arena behind a shared
//! handle; [`crate::LinkView`] accessors hold weak references back to it, so
//! dropping the graph detaches every outstanding view. All public mutators
//! are synchronous and atomic with respect to other callers on the same
//! instance.

mod cascade;
mod inner;
mod lists;
mod rows;
mod schema;
mod snapshot;
mod verify;

use std::sync::Arc;

use parking_lot::Mutex;

pub(crate) use inner::GraphInner;

use crate::error::Result;
use crate::replication::{CascadeObserver, Replication};
use crate::store::arena::Arena;
use crate::store::LinkView;
use crate::types::{ColNdx, LinkKind, RowNdx, TableNdx};

/// Physical representation of one backlink cell: empty word, tagged-inline
/// single origin, or arena-backed store of origins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BacklinkShape {
    Empty,
    Inline(RowNdx),
    Store(Vec<RowNdx>),
}

pub(crate) struct GraphCore {
    pub(crate) inner: Mutex<GraphInner>,
}

/// An in-memory database image holding typed tables whose link columns keep
/// reciprocal backlinks, live list views, and cascade-delete semantics.
pub struct LinkGraph {
    core: Arc<GraphCore>,
}

impl Default for LinkGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkGraph {
    pub fn new() -> Self {
        Self {
            core: Arc::new(GraphCore {
                inner: Mutex::new(GraphInner::new()),
            }),
        }
    }

    /// A graph whose arena refuses to allocate more than `limit` backing
    /// stores. Mutations that hit the limit fail with `AllocationFailure`
    /// and leave the store unchanged.
    pub fn with_store_limit(limit: usize) -> Self {
        Self {
            core: Arc::new(GraphCore {
                inner: Mutex::new(GraphInner::with_arena(Arena::with_capacity_limit(limit))),
            }),
        }
    }

    /// Installs the replication sink. It observes every semantic link
    /// mutation before the reciprocal bookkeeping runs.
    pub fn set_replication(&self, sink: Box<dyn Replication>) {
        self.core.inner.lock().repl = Some(sink);
    }

    /// Installs the cascade observer and thereby turns on link-nullification
    /// tracking. The observer must not call back into this graph.
    pub fn set_cascade_observer(&self, observer: Box<dyn CascadeObserver>) {
        self.core.inner.lock().observer = Some(observer);
    }

    // ---- schema ----

    pub fn add_table(&self, name: &str) -> TableNdx {
        self.core.inner.lock().add_table(name)
    }

    pub fn table_count(&self) -> usize {
        self.core.inner.lock().table_count()
    }

    pub fn table_name(&self, t: TableNdx) -> Result<String> {
        Ok(self.core.inner.lock().table_name(t)?.to_owned())
    }

    /// Removes a table, moving the last table into the vacated slot. Fails
    /// with `CrossTableLinkTarget` while another table links into it.
    pub fn remove_table(&self, t: TableNdx) -> Result<()> {
        self.core.inner.lock().remove_table(t)
    }

    /// Adds a singular link column to `origin` pointing into `target`, with
    /// its paired backlink column, and returns the new column's index.
    pub fn add_link_column(
        &self,
        origin: TableNdx,
        name: &str,
        target: TableNdx,
        kind: LinkKind,
    ) -> Result<ColNdx> {
        self.core.inner.lock().add_link_column(origin, name, target, kind)
    }

    pub fn add_link_list_column(
        &self,
        origin: TableNdx,
        name: &str,
        target: TableNdx,
        kind: LinkKind,
    ) -> Result<ColNdx> {
        self.core
            .inner
            .lock()
            .add_link_list_column(origin, name, target, kind)
    }

    // ---- rows ----

    pub fn table_size(&self, t: TableNdx) -> Result<usize> {
        self.core.inner.lock().table_size(t)
    }

    /// Appends `n` empty rows.
    pub fn add_rows(&self, t: TableNdx, n: usize) -> Result<()> {
        self.core.inner.lock().add_rows(t, n)
    }

    /// Shifts `n` empty rows in at `at`. Link-target tables are append-only.
    pub fn insert_rows(&self, t: TableNdx, at: RowNdx, n: usize) -> Result<()> {
        self.core.inner.lock().insert_rows(t, at, n)
    }

    /// Erases `n` rows starting at `at`, shifting the tail down. On a
    /// link-target table only the tail may be erased.
    pub fn erase_rows(&self, t: TableNdx, at: RowNdx, n: usize) -> Result<()> {
        self.core.inner.lock().erase_rows(t, at, n)
    }

    /// Removes `row` by moving the last row into its place, cascading into
    /// strong-linked orphans. The full plan is reported to the cascade
    /// observer before storage changes.
    pub fn move_last_over(&self, t: TableNdx, row: RowNdx) -> Result<()> {
        self.core.inner.lock().remove_row_cascade(t, row)
    }

    /// Cascade-aware removal of `row`; alias of [`LinkGraph::move_last_over`]
    /// kept for call sites that emphasize the recursive semantics.
    pub fn remove_recursive(&self, t: TableNdx, row: RowNdx) -> Result<()> {
        self.core.inner.lock().remove_row_cascade(t, row)
    }

    pub fn swap_rows(&self, t: TableNdx, i: RowNdx, j: RowNdx) -> Result<()> {
        self.core.inner.lock().swap_rows(t, i, j)
    }

    /// Removes every row of `t`. The cleared table's own rows are not
    /// enumerated to the observer; nullified incoming links and strong
    /// orphans in other tables are.
    pub fn clear_table(&self, t: TableNdx) -> Result<()> {
        self.core.inner.lock().clear_table(t)
    }

    // ---- singular links ----

    /// Sets a singular link and returns the prior target. A strong column
    /// that orphans its previous target triggers a cascade.
    pub fn set_link(
        &self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        target: Option<RowNdx>,
    ) -> Result<Option<RowNdx>> {
        self.core.inner.lock().set_link(t, c, row, target)
    }

    pub fn get_link(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<Option<RowNdx>> {
        self.core.inner.lock().get_link(t, c, row)
    }

    /// Shorthand for `set_link(.., None)`.
    pub fn nullify_link(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<Option<RowNdx>> {
        self.core.inner.lock().set_link(t, c, row, None)
    }

    // ---- link lists ----

    /// The live view onto one link-list cell. At most one view exists per
    /// cell; repeated lookups return the same handle while it lives.
    pub fn link_list(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<Arc<LinkView>> {
        let mut inner = self.core.inner.lock();
        inner.list_schema(t, c)?;
        inner.check_row(t, row)?;
        let col = inner.table_mut(t)?.cols[c].data.as_list_mut()?;
        col.accessors.prune();
        if let Some(view) = col.accessors.lookup(row) {
            return Ok(view);
        }
        let flag = col.accessors.tombstone_flag();
        let view = LinkView::make(&self.core, t, c, row, flag);
        col.accessors.install(row, &view);
        Ok(view)
    }

    /// Whether the list cell at `(t, c, row)` is in the degenerate empty
    /// representation (cell word zero, no backing store).
    pub fn link_list_is_degenerate(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<bool> {
        self.core.inner.lock().list_is_degenerate(t, c, row)
    }

    // ---- backlink introspection ----

    /// Total number of incoming edges to `row`, across all link columns.
    pub fn backlink_count(&self, t: TableNdx, row: RowNdx) -> Result<usize> {
        self.core.inner.lock().backlink_count_total(t, row)
    }

    /// Incoming edges whose forward column is strong.
    pub fn strong_backlink_count(&self, t: TableNdx, row: RowNdx) -> Result<usize> {
        self.core.inner.lock().strong_backlink_count(t, row)
    }

    /// Incoming edges to `row` from one specific forward column.
    pub fn backlink_count_from(
        &self,
        t: TableNdx,
        row: RowNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
    ) -> Result<usize> {
        self.core
            .inner
            .lock()
            .backlink_count_from(t, row, origin_table, origin_col)
    }

    /// The `n`-th origin row referencing `row` through one forward column.
    pub fn backlink_from(
        &self,
        t: TableNdx,
        row: RowNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
        n: usize,
    ) -> Result<RowNdx> {
        self.core
            .inner
            .lock()
            .backlink_from(t, row, origin_table, origin_col, n)
    }

    /// Physical representation of one backlink cell.
    pub fn backlink_shape(
        &self,
        t: TableNdx,
        row: RowNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
    ) -> Result<BacklinkShape> {
        self.core
            .inner
            .lock()
            .backlink_shape(t, row, origin_table, origin_col)
    }

    // ---- integrity & persistence ----

    /// Walks every invariant: cell word discipline, reciprocity, accessor
    /// registry order, arena accounting.
    pub fn verify(&self) -> Result<()> {
        self.core.inner.lock().verify()
    }

    /// Serializes the image so a reader with no prior in-memory state
    /// observes the documented byte-level cell invariants.
    pub fn snapshot(&self) -> Vec<u8> {
        self.core.inner.lock().snapshot()
    }

    /// Reconstructs a graph from a snapshot image and re-validates every
    /// invariant. Views never survive a restore.
    pub fn restore(bytes: &[u8]) -> Result<LinkGraph> {
        let inner = GraphInner::restore(bytes)?;
        inner.verify()?;
        Ok(Self {
            core: Arc::new(GraphCore {
                inner: Mutex::new(inner),
            }),
        })
    }
}
