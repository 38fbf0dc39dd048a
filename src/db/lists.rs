//! Link-list cell operations, reached through [`crate::LinkView`] handles.
//!
//! Every mutator validates first, then emits its replication event, then
//! performs backlink bookkeeping and the cell mutation. The `nullify`,
//! `retarget`, and `swap_targets` entry points are the backlink-initiated
//! callbacks used while target rows are being removed or renumbered; they
//! touch the forward cell only, never the backlink side.

use crate::error::{LinkError, Result};
use crate::replication::ListAddr;
use crate::store::arena::Arena;
use crate::store::link::LinkColumn;
use crate::store::link_list::LinkListColumn;
use crate::types::{ColNdx, RowNdx, TableNdx};

use super::inner::{ColumnData, GraphInner};

impl GraphInner {
    pub(crate) fn list_target_table(&self, t: TableNdx, c: ColNdx) -> Result<TableNdx> {
        Ok(self.list_schema(t, c)?.target_table)
    }

    pub(crate) fn list_len(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<usize> {
        self.list_schema(t, c)?;
        self.check_row(t, row)?;
        self.column(t, c)?.data.as_list()?.list_len(&self.arena, row)
    }

    pub(crate) fn list_target_at(
        &self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        ndx: usize,
    ) -> Result<RowNdx> {
        self.list_schema(t, c)?;
        self.check_row(t, row)?;
        self.column(t, c)?
            .data
            .as_list()?
            .target_at(&self.arena, row, ndx)
    }

    pub(crate) fn list_find(
        &self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        target: RowNdx,
    ) -> Result<Option<usize>> {
        self.list_schema(t, c)?;
        self.check_row(t, row)?;
        let col = self.column(t, c)?.data.as_list()?;
        match col.cell_ref(row)? {
            None => Ok(None),
            Some(r) => Ok(self.arena.get(r)?.find_first(target as u64)),
        }
    }

    pub(crate) fn list_is_degenerate(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<bool> {
        self.list_schema(t, c)?;
        self.check_row(t, row)?;
        self.column(t, c)?.data.as_list()?.is_degenerate(row)
    }

    pub(crate) fn list_insert(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        ndx: usize,
        target: RowNdx,
    ) -> Result<()> {
        let schema = self.list_schema(t, c)?;
        self.check_row(t, row)?;
        self.check_row(schema.target_table, target)?;
        let len = self.list_len(t, c, row)?;
        if ndx > len {
            return Err(LinkError::range(ndx, len));
        }
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_insert(ListAddr { table: t, col: c, row }, ndx, target);
        }
        self.with_list_pair(t, c, |list, backlinks, arena| {
            let store = list.ensure_store(arena, row)?;
            arena.get_mut(store)?.insert(ndx, target as u64)?;
            backlinks.add(arena, target, row)
        })
    }

    pub(crate) fn list_set(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        ndx: usize,
        target: RowNdx,
    ) -> Result<()> {
        let schema = self.list_schema(t, c)?;
        self.check_row(t, row)?;
        self.check_row(schema.target_table, target)?;
        let len = self.list_len(t, c, row)?;
        if ndx >= len {
            return Err(LinkError::range(ndx, len));
        }
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_set(ListAddr { table: t, col: c, row }, ndx, target);
        }
        let old = self.with_list_pair(t, c, |list, backlinks, arena| {
            let store = list
                .cell_ref(row)?
                .ok_or(LinkError::InvariantViolation("setting link in degenerate cell"))?;
            let old = arena.get(store)?.get(ndx)? as RowNdx;
            backlinks.remove_one(arena, old, row)?;
            backlinks.add(arena, target, row)?;
            arena.get_mut(store)?.set(ndx, target as u64)?;
            Ok(old)
        })?;
        if schema.kind.is_strong() && self.strong_backlink_count(schema.target_table, old)? == 0 {
            self.cascade_remove_orphan(schema.target_table, old)?;
        }
        Ok(())
    }

    pub(crate) fn list_erase(&mut self, t: TableNdx, c: ColNdx, row: RowNdx, ndx: usize) -> Result<()> {
        let schema = self.list_schema(t, c)?;
        self.check_row(t, row)?;
        let len = self.list_len(t, c, row)?;
        if ndx >= len {
            return Err(LinkError::range(ndx, len));
        }
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_erase(ListAddr { table: t, col: c, row }, ndx);
        }
        let old = self.with_list_pair(t, c, |list, backlinks, arena| {
            let store = list
                .cell_ref(row)?
                .ok_or(LinkError::InvariantViolation("erasing link from degenerate cell"))?;
            let old = arena.get_mut(store)?.erase(ndx)? as RowNdx;
            backlinks.remove_one(arena, old, row)?;
            list.release_if_empty(arena, row)?;
            Ok(old)
        })?;
        if schema.kind.is_strong() && self.strong_backlink_count(schema.target_table, old)? == 0 {
            self.cascade_remove_orphan(schema.target_table, old)?;
        }
        Ok(())
    }

    pub(crate) fn list_move(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        from: usize,
        to: usize,
    ) -> Result<()> {
        self.list_schema(t, c)?;
        self.check_row(t, row)?;
        let len = self.list_len(t, c, row)?;
        if from >= len {
            return Err(LinkError::range(from, len));
        }
        if to >= len {
            return Err(LinkError::range(to, len));
        }
        if from == to {
            return Ok(());
        }
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_move(ListAddr { table: t, col: c, row }, from, to);
        }
        self.with_list(t, c, |list, arena| {
            let store = list
                .cell_ref(row)?
                .ok_or(LinkError::InvariantViolation("moving link in degenerate cell"))?;
            let store = arena.get_mut(store)?;
            let value = store.erase(from)?;
            store.insert(to, value)
        })
    }

    pub(crate) fn list_swap(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        a: usize,
        b: usize,
    ) -> Result<()> {
        self.list_schema(t, c)?;
        self.check_row(t, row)?;
        let len = self.list_len(t, c, row)?;
        if a >= len {
            return Err(LinkError::range(a, len));
        }
        if b >= len {
            return Err(LinkError::range(b, len));
        }
        if a == b {
            return Ok(());
        }
        // Downstream consumers of the event stream rely on the smaller
        // index coming first.
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_swap(ListAddr { table: t, col: c, row }, a, b);
        }
        self.with_list(t, c, |list, arena| {
            let store = list
                .cell_ref(row)?
                .ok_or(LinkError::InvariantViolation("swapping links in degenerate cell"))?;
            let store = arena.get_mut(store)?;
            let value_a = store.get(a)?;
            let value_b = store.get(b)?;
            store.set(a, value_b)?;
            store.set(b, value_a)
        })
    }

    pub(crate) fn list_clear(&mut self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<()> {
        let schema = self.list_schema(t, c)?;
        self.check_row(t, row)?;
        if self.column(t, c)?.data.as_list()?.is_degenerate(row)? {
            return Ok(());
        }
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_clear(ListAddr { table: t, col: c, row });
        }
        if schema.kind.is_weak() {
            return self.with_list_pair(t, c, |list, backlinks, arena| {
                for target in list.targets(arena, row)? {
                    backlinks.remove_one(arena, target, row)?;
                }
                list.free_cell(arena, row)
            });
        }
        self.cascade_list_clear(t, c, row, schema.target_table)
    }

    /// Erases the first link to `old_target`. Invoked by the backlink side
    /// while the target row is being removed externally.
    pub(crate) fn list_nullify(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        old_target: RowNdx,
    ) -> Result<()> {
        let pos = self
            .list_find(t, c, row, old_target)?
            .ok_or(LinkError::InvariantViolation("nullified link not present in list"))?;
        if let Some(repl) = self.repl.as_mut() {
            repl.link_list_nullify(ListAddr { table: t, col: c, row }, pos);
        }
        self.with_list(t, c, |list, arena| {
            let store = list
                .cell_ref(row)?
                .ok_or(LinkError::InvariantViolation("nullifying link in degenerate cell"))?;
            arena.get_mut(store)?.erase(pos)?;
            list.release_if_empty(arena, row)
        })
    }

    /// Rewrites the first link to `old` so it points at `new`. Invoked when
    /// the target row index shifts; callers repeat the call once per
    /// occurrence.
    pub(crate) fn list_retarget(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        old: RowNdx,
        new: RowNdx,
    ) -> Result<()> {
        self.with_list(t, c, |list, arena| {
            let store = list
                .cell_ref(row)?
                .ok_or(LinkError::InvariantViolation("retargeting link in degenerate cell"))?;
            let store = arena.get_mut(store)?;
            let pos = store
                .find_first(old as u64)
                .ok_or(LinkError::InvariantViolation("retargeted link not present in list"))?;
            store.set(pos, new as u64)
        })
    }

    /// Rewrites every occurrence of `a` to `b` and vice versa within one
    /// cell. Invoked by the backlink side during target-row swaps.
    pub(crate) fn list_swap_targets(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        a: RowNdx,
        b: RowNdx,
    ) -> Result<()> {
        self.with_list(t, c, |list, arena| {
            let Some(store) = list.cell_ref(row)? else {
                return Ok(());
            };
            let store = arena.get_mut(store)?;
            for ndx in 0..store.size() {
                let value = store.get(ndx)? as RowNdx;
                if value == a {
                    store.set(ndx, b as u64)?;
                } else if value == b {
                    store.set(ndx, a as u64)?;
                }
            }
            Ok(())
        })
    }

    // ---- forward-cell callbacks dispatched over the column kind ----

    /// Breaks the forward edge `(t, c, origin_row) -> old_target` from the
    /// backlink side: the forward cell loses the edge, the backlink cell is
    /// the caller's to drain.
    pub(crate) fn nullify_forward(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        origin_row: RowNdx,
        old_target: RowNdx,
    ) -> Result<()> {
        match &self.column(t, c)?.data {
            ColumnData::Link(_) => {
                if let Some(repl) = self.repl.as_mut() {
                    repl.nullify_link(t, c, origin_row);
                }
                self.with_link(t, c, |links, _| links.nullify(origin_row))
            }
            ColumnData::List(_) => self.list_nullify(t, c, origin_row, old_target),
            ColumnData::Backlink(_) => {
                Err(LinkError::InvariantViolation("nullify routed to backlink column"))
            }
        }
    }

    pub(crate) fn retarget_forward(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        origin_row: RowNdx,
        old: RowNdx,
        new: RowNdx,
    ) -> Result<()> {
        match &self.column(t, c)?.data {
            ColumnData::Link(_) => self.with_link(t, c, |links, _| links.retarget(origin_row, old, new)),
            ColumnData::List(_) => self.list_retarget(t, c, origin_row, old, new),
            ColumnData::Backlink(_) => {
                Err(LinkError::InvariantViolation("retarget routed to backlink column"))
            }
        }
    }

    pub(crate) fn swap_forward_targets(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        origin_row: RowNdx,
        a: RowNdx,
        b: RowNdx,
    ) -> Result<()> {
        match &self.column(t, c)?.data {
            ColumnData::Link(_) => {
                self.with_link(t, c, |links, _| links.swap_target(origin_row, a, b))
            }
            ColumnData::List(_) => self.list_swap_targets(t, c, origin_row, a, b),
            ColumnData::Backlink(_) => {
                Err(LinkError::InvariantViolation("target swap routed to backlink column"))
            }
        }
    }

    pub(crate) fn with_list<R>(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        f: impl FnOnce(&mut LinkListColumn, &mut Arena) -> Result<R>,
    ) -> Result<R> {
        let GraphInner { tables, arena, .. } = self;
        let table = tables
            .get_mut(t)
            .ok_or(LinkError::InvariantViolation("list table missing"))?;
        let col = table
            .cols
            .get_mut(c)
            .ok_or(LinkError::InvariantViolation("list column missing"))?;
        f(col.data.as_list_mut()?, arena)
    }

    pub(crate) fn with_link<R>(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        f: impl FnOnce(&mut LinkColumn, &mut Arena) -> Result<R>,
    ) -> Result<R> {
        let GraphInner { tables, arena, .. } = self;
        let table = tables
            .get_mut(t)
            .ok_or(LinkError::InvariantViolation("link table missing"))?;
        let col = table
            .cols
            .get_mut(c)
            .ok_or(LinkError::InvariantViolation("link column missing"))?;
        f(col.data.as_link_mut()?, arena)
    }
}
