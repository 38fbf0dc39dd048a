//! Orphan-collection planner.
//!
//! Removing a row (or clearing a list or a table) runs in three stages:
//! a pure scan computes the complete removal plan, the plan is handed to the
//! cascade observer untouched, and only then does the apply stage mutate
//! storage. The scan walks strong-link reachability depth-first, counting
//! every edge it intends to sever so that "no strong backlinks left" can be
//! decided without touching a single cell.
//!
//! Scheduled rows are removed in reverse `(table, row)` order; within a
//! table the highest row index goes first, so the move-last-over that fills
//! each hole can never pick a row that is itself scheduled.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::Result;
use crate::replication::{CascadeNotification, LinkNullification, RowLocation};
use crate::store::arena::Arena;
use crate::store::backlink::BacklinkColumn;
use crate::types::{ColNdx, LinkKind, RowNdx, TableNdx};

use super::inner::{ColumnData, GraphInner};

/// One forward edge, keyed by its origin coordinates and target row. The
/// origin column determines the target table.
type EdgeKey = (TableNdx, ColNdx, RowNdx, RowNdx);

/// Shared state bag of one cascade run.
pub(crate) struct CascadeState {
    /// Rows scheduled for removal, sorted by `(table, row)`, no duplicates.
    pub rows: Vec<RowLocation>,
    /// Nullifications to report, in discovery order.
    pub links: Vec<LinkNullification>,
    /// Retained for generality; every current entry point leaves it set.
    pub only_strong_links: bool,
    /// Set by table clear so the cascade does not treat the clearing table
    /// as an orphan of itself.
    pub stop_on_table: Option<TableNdx>,
    /// Set by list clear so recursion cannot re-enter the clearing cell.
    pub stop_on_list: Option<(TableNdx, ColNdx, RowNdx)>,
    pub track_link_nullifications: bool,
    /// Multiplicity of each edge the plan severs.
    severed: FxHashMap<EdgeKey, usize>,
    /// Strong edges the plan severs, per target row.
    severed_strong: FxHashMap<(TableNdx, RowNdx), usize>,
}

impl CascadeState {
    pub fn new(track_link_nullifications: bool) -> Self {
        Self {
            rows: Vec::new(),
            links: Vec::new(),
            only_strong_links: true,
            stop_on_table: None,
            stop_on_list: None,
            track_link_nullifications,
            severed: FxHashMap::default(),
            severed_strong: FxHashMap::default(),
        }
    }

    pub fn is_scheduled(&self, table: TableNdx, row: RowNdx) -> bool {
        self.rows.binary_search(&RowLocation { table, row }).is_ok()
    }

    pub fn schedule(&mut self, table: TableNdx, row: RowNdx) {
        let loc = RowLocation { table, row };
        if let Err(pos) = self.rows.binary_search(&loc) {
            self.rows.insert(pos, loc);
        }
    }

    fn sever(
        &mut self,
        origin_table: TableNdx,
        origin_col: ColNdx,
        origin_row: RowNdx,
        target_table: TableNdx,
        target_row: RowNdx,
        kind: LinkKind,
    ) {
        *self
            .severed
            .entry((origin_table, origin_col, origin_row, target_row))
            .or_insert(0) += 1;
        if kind.is_strong() {
            *self
                .severed_strong
                .entry((target_table, target_row))
                .or_insert(0) += 1;
        }
    }

    fn severed_count(&self, edge: &EdgeKey) -> usize {
        self.severed.get(edge).copied().unwrap_or(0)
    }

    fn strong_severed(&self, target_table: TableNdx, target_row: RowNdx) -> usize {
        self.severed_strong
            .get(&(target_table, target_row))
            .copied()
            .unwrap_or(0)
    }

    fn notification(&self) -> CascadeNotification {
        CascadeNotification {
            rows: self.rows.clone(),
            links: self.links.clone(),
        }
    }
}

/// Records a nullification entry for every incoming occurrence of
/// `target_row` that the plan has not already severed. Occurrences are
/// consumed earliest-first per edge.
fn record_remaining_incoming(
    state: &mut CascadeState,
    col: &BacklinkColumn,
    arena: &Arena,
    target_row: RowNdx,
) -> Result<()> {
    let origins = col.origins(arena, target_row)?;
    let mut skip: FxHashMap<RowNdx, usize> = FxHashMap::default();
    for &origin in &origins {
        skip.entry(origin).or_insert_with(|| {
            state.severed_count(&(col.origin_table, col.origin_col, origin, target_row))
        });
    }
    for origin in origins {
        let remaining_skips = skip.get_mut(&origin).expect("seeded above");
        if *remaining_skips > 0 {
            *remaining_skips -= 1;
            continue;
        }
        if state.track_link_nullifications {
            state.links.push(LinkNullification {
                origin_table: col.origin_table,
                origin_col: col.origin_col,
                origin_row: origin,
                old_target_row: target_row,
            });
        }
    }
    Ok(())
}

impl GraphInner {
    /// Cascade-aware removal of one row: plan, notify, apply.
    pub(crate) fn remove_row_cascade(&mut self, t: TableNdx, row: RowNdx) -> Result<()> {
        self.check_row(t, row)?;
        let mut state = CascadeState::new(self.observer.is_some());
        state.schedule(t, row);
        self.scan_cascade_row(&mut state, t, row)?;
        self.emit_notification(&state);
        self.apply_cascade(&state)
    }

    /// Entry point for a strong column that just orphaned `row` (its last
    /// strong backlink is gone but the row itself was not removed).
    pub(crate) fn cascade_remove_orphan(&mut self, t: TableNdx, row: RowNdx) -> Result<()> {
        self.remove_row_cascade(t, row)
    }

    /// Strong-column list clear: every listed target is an orphan candidate,
    /// with recursion pinned away from the clearing cell.
    pub(crate) fn cascade_list_clear(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        target_table: TableNdx,
    ) -> Result<()> {
        let mut state = CascadeState::new(self.observer.is_some());
        state.stop_on_list = Some((t, c, row));
        let targets = self.column(t, c)?.data.as_list()?.targets(&self.arena, row)?;
        for &target in &targets {
            state.sever(t, c, row, target_table, target, LinkKind::Strong);
        }
        for &target in &targets {
            if state.is_scheduled(target_table, target) {
                continue;
            }
            if self.strong_backlink_count(target_table, target)?
                == state.strong_severed(target_table, target)
            {
                state.schedule(target_table, target);
                self.scan_cascade_row(&mut state, target_table, target)?;
            }
        }
        self.emit_notification(&state);
        self.with_list_pair(t, c, |list, backlinks, arena| {
            for target in list.targets(arena, row)? {
                backlinks.remove_one(arena, target, row)?;
            }
            list.free_cell(arena, row)
        })?;
        self.apply_cascade(&state)
    }

    /// Depth-first scan of one scheduled row: sever its outgoing edges,
    /// recurse into strong targets left without strong backlinks, then
    /// enumerate whatever incoming edges will survive only as
    /// nullifications.
    pub(crate) fn scan_cascade_row(
        &self,
        state: &mut CascadeState,
        t: TableNdx,
        row: RowNdx,
    ) -> Result<()> {
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(col) => {
                    if let Some(target) = col.get(row)? {
                        self.scan_forward_edge(state, t, c, row, col.target_table, target, col.kind)?;
                    }
                }
                ColumnData::List(col) => {
                    if state.stop_on_list == Some((t, c, row)) {
                        continue;
                    }
                    let target_table = col.target_table;
                    let kind = col.kind;
                    for target in col.targets(&self.arena, row)? {
                        self.scan_forward_edge(state, t, c, row, target_table, target, kind)?;
                    }
                }
                ColumnData::Backlink(col) => {
                    record_remaining_incoming(state, col, &self.arena, row)?;
                }
            }
        }
        Ok(())
    }

    fn scan_forward_edge(
        &self,
        state: &mut CascadeState,
        origin_table: TableNdx,
        origin_col: ColNdx,
        origin_row: RowNdx,
        target_table: TableNdx,
        target_row: RowNdx,
        kind: LinkKind,
    ) -> Result<()> {
        state.sever(origin_table, origin_col, origin_row, target_table, target_row, kind);
        if kind.is_weak() && state.only_strong_links {
            return Ok(());
        }
        if state.stop_on_table == Some(target_table) {
            return Ok(());
        }
        if state.is_scheduled(target_table, target_row) {
            return Ok(());
        }
        if self.strong_backlink_count(target_table, target_row)?
            == state.strong_severed(target_table, target_row)
        {
            state.schedule(target_table, target_row);
            self.scan_cascade_row(state, target_table, target_row)?;
        }
        Ok(())
    }

    /// Table-clear scan: per forward column, sever every edge, then walk the
    /// cells again for strong orphan candidates outside the clearing table;
    /// finally enumerate surviving incoming edges of every row.
    pub(crate) fn scan_table_clear(&self, state: &mut CascadeState, t: TableNdx) -> Result<()> {
        let size = self.table(t)?.num_rows;
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            let schema = match self.forward_schema(t, c) {
                Ok(schema) => schema,
                Err(_) => continue,
            };
            for row in 0..size {
                for target in self.forward_targets(t, c, row)? {
                    state.sever(t, c, row, schema.target_table, target, schema.kind);
                }
            }
            if schema.kind.is_weak() && state.only_strong_links {
                continue;
            }
            if state.stop_on_table == Some(schema.target_table) {
                continue;
            }
            for row in 0..size {
                for target in self.forward_targets(t, c, row)? {
                    if state.is_scheduled(schema.target_table, target) {
                        continue;
                    }
                    if self.strong_backlink_count(schema.target_table, target)?
                        == state.strong_severed(schema.target_table, target)
                    {
                        state.schedule(schema.target_table, target);
                        self.scan_cascade_row(state, schema.target_table, target)?;
                    }
                }
            }
        }
        for c in 0..ncols {
            if let ColumnData::Backlink(col) = &self.column(t, c)?.data {
                for row in 0..size {
                    record_remaining_incoming(state, col, &self.arena, row)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn emit_notification(&mut self, state: &CascadeState) {
        trace!(rows = state.rows.len(), links = state.links.len(), "cascade planned");
        if let Some(observer) = self.observer.as_mut() {
            let notification = state.notification();
            observer.on_cascade(&notification);
        }
    }

    /// Severs the planned rows' outgoing edges, then removes the rows in
    /// reverse sorted order.
    pub(crate) fn apply_cascade(&mut self, state: &CascadeState) -> Result<()> {
        for loc in &state.rows {
            self.sever_outgoing(loc.table, loc.row, state.stop_on_list)?;
        }
        for loc in state.rows.iter().rev() {
            self.do_move_last_over(loc.table, loc.row)?;
        }
        Ok(())
    }

    /// Removes the reciprocal backlink of every outgoing edge of `row` and
    /// resets the forward cells, skipping a pinned list cell that the clear
    /// path dismantles itself.
    pub(crate) fn sever_outgoing(
        &mut self,
        t: TableNdx,
        row: RowNdx,
        pinned: Option<(TableNdx, ColNdx, RowNdx)>,
    ) -> Result<()> {
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            let is_list = match &self.column(t, c)?.data {
                ColumnData::Link(_) => false,
                ColumnData::List(_) => true,
                ColumnData::Backlink(_) => continue,
            };
            if pinned == Some((t, c, row)) {
                continue;
            }
            for target in self.forward_targets(t, c, row)? {
                self.backlink_remove_one(t, c, target, row)?;
            }
            if is_list {
                self.with_list(t, c, |list, arena| list.free_cell(arena, row))?;
            } else {
                self.with_link(t, c, |links, _| links.nullify(row))?;
            }
        }
        Ok(())
    }
}
