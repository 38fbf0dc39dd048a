//! Structural row mutations: insert, erase, move-last-over, swap, clear.
//!
//! Tables that are the target of any link column are append-only and shed
//! rows through move-last-over; mid-table shifts are reserved for tables
//! whose rows nothing points at, where only origin renumbering is needed.

use tracing::debug;

use crate::error::{LinkError, Result};
use crate::types::{ColNdx, RowNdx, TableNdx};

use super::cascade::CascadeState;
use super::inner::{ColumnData, GraphInner};

impl GraphInner {
    pub(crate) fn has_backlink_cols(&self, t: TableNdx) -> Result<bool> {
        Ok(self
            .table(t)?
            .cols
            .iter()
            .any(|c| matches!(c.data, ColumnData::Backlink(_))))
    }

    pub(crate) fn add_rows(&mut self, t: TableNdx, n: usize) -> Result<()> {
        let size = self.table(t)?.num_rows;
        self.insert_rows(t, size, n)
    }

    /// Shifts `n` fresh rows in at `at`. Every forward cell starts null and
    /// every list cell degenerate; origin rows moving up have their
    /// reciprocal backlinks renamed before any cell moves.
    pub(crate) fn insert_rows(&mut self, t: TableNdx, at: RowNdx, n: usize) -> Result<()> {
        let size = self.table(t)?.num_rows;
        if at > size {
            return Err(LinkError::range(at, size));
        }
        if n == 0 {
            return Ok(());
        }
        if at < size && self.has_backlink_cols(t)? {
            return Err(LinkError::IllegalCombination(
                "rows can only be appended to a table that is the target of links",
            ));
        }
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(_) => {
                    for row in (at..size).rev() {
                        for target in self.forward_targets(t, c, row)? {
                            self.backlink_rename(t, c, target, row, row + n)?;
                        }
                    }
                    self.with_link(t, c, |links, _| {
                        links.insert_null_cells(at, n);
                        Ok(())
                    })?;
                }
                ColumnData::List(_) => {
                    for row in (at..size).rev() {
                        for target in self.forward_targets(t, c, row)? {
                            self.backlink_rename(t, c, target, row, row + n)?;
                        }
                    }
                    self.with_list(t, c, |list, _| {
                        list.insert_cells(at, n);
                        list.accessors.adj_insert_rows(at, n);
                        Ok(())
                    })?;
                }
                ColumnData::Backlink(_) => {
                    self.with_backlink(t, c, |col, _| {
                        col.insert_cells(at, n);
                        Ok(())
                    })?;
                }
            }
        }
        self.table_mut(t)?.num_rows += n;
        Ok(())
    }

    /// Erases `n` rows starting at `at`. On a link-target table only the
    /// tail may be erased, and each tail row goes through the cascade-aware
    /// removal path; otherwise surviving origin rows shift down with their
    /// backlinks renamed.
    pub(crate) fn erase_rows(&mut self, t: TableNdx, at: RowNdx, n: usize) -> Result<()> {
        let size = self.table(t)?.num_rows;
        if at + n > size {
            return Err(LinkError::range(at + n, size));
        }
        if n == 0 {
            return Ok(());
        }
        if self.has_backlink_cols(t)? {
            if at + n != size {
                return Err(LinkError::IllegalCombination(
                    "rows of a link target table can only be erased from the tail",
                ));
            }
            for _ in 0..n {
                // A cascade may have taken further rows of this table with it.
                let size = self.table(t)?.num_rows;
                if size == 0 {
                    break;
                }
                self.remove_row_cascade(t, size - 1)?;
            }
            return Ok(());
        }
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(_) => {
                    for row in at..at + n {
                        for target in self.forward_targets(t, c, row)? {
                            self.backlink_remove_one(t, c, target, row)?;
                        }
                    }
                    for row in at + n..size {
                        for target in self.forward_targets(t, c, row)? {
                            self.backlink_rename(t, c, target, row, row - n)?;
                        }
                    }
                    self.with_link(t, c, |links, _| {
                        links.erase_cell_words(at, n);
                        Ok(())
                    })?;
                }
                ColumnData::List(_) => {
                    for row in at..at + n {
                        for target in self.forward_targets(t, c, row)? {
                            self.backlink_remove_one(t, c, target, row)?;
                        }
                        self.with_list(t, c, |list, arena| list.free_cell(arena, row))?;
                    }
                    for row in at + n..size {
                        for target in self.forward_targets(t, c, row)? {
                            self.backlink_rename(t, c, target, row, row - n)?;
                        }
                    }
                    self.with_list(t, c, |list, _| {
                        list.erase_cell_words(at, n);
                        list.accessors.adj_erase_rows(at, n);
                        Ok(())
                    })?;
                }
                ColumnData::Backlink(_) => unreachable!("checked by has_backlink_cols"),
            }
        }
        self.table_mut(t)?.num_rows -= n;
        Ok(())
    }

    /// Physical move-last-over of one row whose outgoing links have already
    /// been severed by the cascade apply stage. Incoming links are nullified
    /// here, and forward cells pointing at the moved last row retargeted.
    pub(crate) fn do_move_last_over(&mut self, t: TableNdx, row: RowNdx) -> Result<()> {
        let size = self.table(t)?.num_rows;
        if row >= size {
            return Err(LinkError::range(row, size));
        }
        let last = size - 1;
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(_) => {
                    if row != last {
                        for target in self.forward_targets(t, c, last)? {
                            self.backlink_rename(t, c, target, last, row)?;
                        }
                    }
                    self.with_link(t, c, |links, _| {
                        links.move_last_cell_over(row);
                        Ok(())
                    })?;
                }
                ColumnData::List(_) => {
                    if row != last {
                        for target in self.forward_targets(t, c, last)? {
                            self.backlink_rename(t, c, target, last, row)?;
                        }
                    }
                    self.with_list(t, c, |list, _| {
                        list.move_last_cell_over(row);
                        list.accessors.adj_move_over(last, row);
                        Ok(())
                    })?;
                }
                ColumnData::Backlink(_) => {
                    let (origin_table, origin_col) = {
                        let col = self.column(t, c)?.data.as_backlink()?;
                        (col.origin_table, col.origin_col)
                    };
                    let incoming = self
                        .column(t, c)?
                        .data
                        .as_backlink()?
                        .origins(&self.arena, row)?;
                    self.with_backlink(t, c, |col, arena| {
                        col.for_each(arena, row, true, |_| {})
                    })?;
                    for origin in incoming {
                        self.nullify_forward(origin_table, origin_col, origin, row)?;
                    }
                    if row != last {
                        let moved_incoming = self
                            .column(t, c)?
                            .data
                            .as_backlink()?
                            .origins(&self.arena, last)?;
                        for origin in moved_incoming {
                            self.retarget_forward(origin_table, origin_col, origin, last, row)?;
                        }
                    }
                    self.with_backlink(t, c, |col, _| {
                        col.move_last_cell_over(row);
                        Ok(())
                    })?;
                }
            }
        }
        self.table_mut(t)?.num_rows -= 1;
        Ok(())
    }

    /// Swaps two rows. Snapshots the affected unique targets and origins
    /// first, then renames both directions, then swaps the cell words; a
    /// cell listing the same row twice is still visited exactly once.
    pub(crate) fn swap_rows(&mut self, t: TableNdx, i: RowNdx, j: RowNdx) -> Result<()> {
        self.check_row(t, i)?;
        self.check_row(t, j)?;
        if i == j {
            return Ok(());
        }
        let ncols = self.table(t)?.cols.len();

        let mut forward_updates: Vec<(ColNdx, Vec<RowNdx>)> = Vec::new();
        let mut backlink_updates: Vec<(TableNdx, ColNdx, Vec<RowNdx>)> = Vec::new();
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(_) | ColumnData::List(_) => {
                    let mut targets: Vec<RowNdx> = self.forward_targets(t, c, i)?.into_vec();
                    targets.extend(self.forward_targets(t, c, j)?);
                    targets.sort_unstable();
                    targets.dedup();
                    forward_updates.push((c, targets));
                }
                ColumnData::Backlink(col) => {
                    let mut origins: Vec<RowNdx> = col.origins(&self.arena, i)?.into_vec();
                    origins.extend(col.origins(&self.arena, j)?);
                    origins.sort_unstable();
                    origins.dedup();
                    backlink_updates.push((col.origin_table, col.origin_col, origins));
                }
            }
        }

        for (c, targets) in &forward_updates {
            for &target in targets {
                self.backlink_swap_origins(t, *c, target, i, j)?;
            }
        }
        for (origin_table, origin_col, origins) in &backlink_updates {
            for &origin in origins {
                self.swap_forward_targets(*origin_table, *origin_col, origin, i, j)?;
            }
        }

        for c in 0..ncols {
            match &mut self.table_mut(t)?.cols[c].data {
                ColumnData::Link(col) => col.swap_cell_words(i, j),
                ColumnData::List(col) => {
                    col.swap_cell_words(i, j);
                    col.accessors.adj_swap(i, j);
                }
                ColumnData::Backlink(col) => col.swap_cell_words(i, j),
            }
        }
        Ok(())
    }

    /// Removes every row. The clearing table's own rows never enter the
    /// notification, but strong orphans in other tables cascade normally and
    /// surviving incoming links are nullified (and reported).
    pub(crate) fn clear_table(&mut self, t: TableNdx) -> Result<()> {
        let size = self.table(t)?.num_rows;
        debug!(table = t, rows = size, "clearing table");
        let mut state = CascadeState::new(self.observer.is_some());
        state.stop_on_table = Some(t);
        self.scan_table_clear(&mut state, t)?;
        self.emit_notification(&state);

        for loc in &state.rows {
            self.sever_outgoing(loc.table, loc.row, None)?;
        }

        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            if let Ok(schema) = self.forward_schema(t, c) {
                let backlink_len = self
                    .table(schema.target_table)?
                    .cols
                    .get(schema.backlink_col)
                    .ok_or(LinkError::InvariantViolation("backlink column missing"))?
                    .data
                    .as_backlink()?
                    .len();
                self.with_backlink(schema.target_table, schema.backlink_col, |col, arena| {
                    col.clear_cells(arena, 0..backlink_len)
                })?;
            }
        }
        for c in 0..ncols {
            if !matches!(self.column(t, c)?.data, ColumnData::Backlink(_)) {
                continue;
            }
            let (origin_table, origin_col) = {
                let col = self.column(t, c)?.data.as_backlink()?;
                (col.origin_table, col.origin_col)
            };
            for row in 0..size {
                let incoming = self
                    .column(t, c)?
                    .data
                    .as_backlink()?
                    .origins(&self.arena, row)?;
                self.with_backlink(t, c, |col, arena| col.for_each(arena, row, true, |_| {}))?;
                for origin in incoming {
                    self.nullify_forward(origin_table, origin_col, origin, row)?;
                }
            }
        }
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(_) => {
                    self.with_link(t, c, |links, _| {
                        links.erase_cell_words(0, size);
                        Ok(())
                    })?;
                }
                ColumnData::List(_) => {
                    for row in 0..size {
                        self.with_list(t, c, |list, arena| list.free_cell(arena, row))?;
                    }
                    self.with_list(t, c, |list, _| {
                        list.accessors.detach_all();
                        list.erase_cell_words(0, size);
                        Ok(())
                    })?;
                }
                ColumnData::Backlink(_) => {
                    self.with_backlink(t, c, |col, _| {
                        col.erase_cell_words(0, size);
                        Ok(())
                    })?;
                }
            }
        }
        self.table_mut(t)?.num_rows = 0;

        for loc in state.rows.iter().rev() {
            self.do_move_last_over(loc.table, loc.row)?;
        }
        Ok(())
    }
}
