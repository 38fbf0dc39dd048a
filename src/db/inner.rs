//! Interior state of a [`crate::LinkGraph`]: the table vector, the shared
//! store arena, and the observation sinks. All mutation routing lives here
//! or in the sibling modules' `impl GraphInner` blocks.

use crate::error::{LinkError, Result};
use crate::replication::{CascadeObserver, ListAddr, Replication};
use crate::store::arena::Arena;
use crate::store::backlink::{BacklinkColumn, RowBuf};
use crate::store::cell::BacklinkCell;
use crate::store::link::LinkColumn;
use crate::store::link_list::LinkListColumn;
use crate::types::{ColNdx, LinkKind, RowNdx, TableNdx};

use super::BacklinkShape;

pub struct GraphInner {
    pub(crate) tables: Vec<Table>,
    pub(crate) arena: Arena,
    pub(crate) repl: Option<Box<dyn Replication>>,
    pub(crate) observer: Option<Box<dyn CascadeObserver>>,
}

pub(crate) struct Table {
    pub name: String,
    pub num_rows: usize,
    /// Columns below this index are user-visible link columns; backlink
    /// columns occupy the tail region.
    pub public_count: usize,
    pub cols: Vec<Column>,
}

pub(crate) struct Column {
    pub name: String,
    pub data: ColumnData,
}

pub(crate) enum ColumnData {
    Link(LinkColumn),
    List(LinkListColumn),
    Backlink(BacklinkColumn),
}

impl ColumnData {
    pub fn as_link_mut(&mut self) -> Result<&mut LinkColumn> {
        match self {
            ColumnData::Link(col) => Ok(col),
            _ => Err(LinkError::InvariantViolation("column kind mismatch")),
        }
    }

    pub fn as_list(&self) -> Result<&LinkListColumn> {
        match self {
            ColumnData::List(col) => Ok(col),
            _ => Err(LinkError::InvariantViolation("column kind mismatch")),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut LinkListColumn> {
        match self {
            ColumnData::List(col) => Ok(col),
            _ => Err(LinkError::InvariantViolation("column kind mismatch")),
        }
    }

    pub fn as_backlink(&self) -> Result<&BacklinkColumn> {
        match self {
            ColumnData::Backlink(col) => Ok(col),
            _ => Err(LinkError::InvariantViolation("column kind mismatch")),
        }
    }

    pub fn as_backlink_mut(&mut self) -> Result<&mut BacklinkColumn> {
        match self {
            ColumnData::Backlink(col) => Ok(col),
            _ => Err(LinkError::InvariantViolation("column kind mismatch")),
        }
    }
}

/// Schema of one forward column, read out before taking mutable borrows.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ForwardSchema {
    pub target_table: TableNdx,
    pub backlink_col: ColNdx,
    pub kind: LinkKind,
    pub is_list: bool,
}

pub(crate) fn two_tables_mut(tables: &mut [Table], a: usize, b: usize) -> (&mut Table, &mut Table) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = tables.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = tables.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

pub(crate) fn two_cols_mut(cols: &mut [Column], a: usize, b: usize) -> (&mut Column, &mut Column) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = cols.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = cols.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

impl GraphInner {
    pub(crate) fn new() -> Self {
        Self {
            tables: Vec::new(),
            arena: Arena::new(),
            repl: None,
            observer: None,
        }
    }

    pub(crate) fn with_arena(arena: Arena) -> Self {
        Self {
            tables: Vec::new(),
            arena,
            repl: None,
            observer: None,
        }
    }

    pub(crate) fn table(&self, t: TableNdx) -> Result<&Table> {
        self.tables
            .get(t)
            .ok_or_else(|| LinkError::range(t, self.tables.len()))
    }

    pub(crate) fn table_mut(&mut self, t: TableNdx) -> Result<&mut Table> {
        let len = self.tables.len();
        self.tables.get_mut(t).ok_or_else(|| LinkError::range(t, len))
    }

    pub(crate) fn check_row(&self, t: TableNdx, row: RowNdx) -> Result<()> {
        let size = self.table(t)?.num_rows;
        if row >= size {
            return Err(LinkError::range(row, size));
        }
        Ok(())
    }

    pub(crate) fn column(&self, t: TableNdx, c: ColNdx) -> Result<&Column> {
        let table = self.table(t)?;
        table
            .cols
            .get(c)
            .ok_or_else(|| LinkError::range(c, table.cols.len()))
    }

    /// Schema of a forward (link or link-list) column.
    pub(crate) fn forward_schema(&self, t: TableNdx, c: ColNdx) -> Result<ForwardSchema> {
        match &self.column(t, c)?.data {
            ColumnData::Link(col) => Ok(ForwardSchema {
                target_table: col.target_table,
                backlink_col: col.backlink_col,
                kind: col.kind,
                is_list: false,
            }),
            ColumnData::List(col) => Ok(ForwardSchema {
                target_table: col.target_table,
                backlink_col: col.backlink_col,
                kind: col.kind,
                is_list: true,
            }),
            ColumnData::Backlink(_) => {
                Err(LinkError::IllegalCombination("column is not a link column"))
            }
        }
    }

    pub(crate) fn singular_schema(&self, t: TableNdx, c: ColNdx) -> Result<ForwardSchema> {
        let schema = self.forward_schema(t, c)?;
        if schema.is_list {
            return Err(LinkError::IllegalCombination(
                "column is a link list, not a single link",
            ));
        }
        Ok(schema)
    }

    pub(crate) fn list_schema(&self, t: TableNdx, c: ColNdx) -> Result<ForwardSchema> {
        let schema = self.forward_schema(t, c)?;
        if !schema.is_list {
            return Err(LinkError::IllegalCombination(
                "column is a single link, not a link list",
            ));
        }
        Ok(schema)
    }

    /// All target occurrences of one forward cell, singular or list.
    pub(crate) fn forward_targets(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<RowBuf> {
        match &self.column(t, c)?.data {
            ColumnData::Link(col) => {
                let mut buf = RowBuf::new();
                if let Some(target) = col.get(row)? {
                    buf.push(target);
                }
                Ok(buf)
            }
            ColumnData::List(col) => col.targets(&self.arena, row),
            ColumnData::Backlink(_) => {
                Err(LinkError::IllegalCombination("column is not a link column"))
            }
        }
    }

    pub(crate) fn with_backlink<R>(
        &mut self,
        target_table: TableNdx,
        backlink_col: ColNdx,
        f: impl FnOnce(&mut BacklinkColumn, &mut Arena) -> Result<R>,
    ) -> Result<R> {
        let GraphInner { tables, arena, .. } = self;
        let table = tables
            .get_mut(target_table)
            .ok_or(LinkError::InvariantViolation("backlink table missing"))?;
        let col = table
            .cols
            .get_mut(backlink_col)
            .ok_or(LinkError::InvariantViolation("backlink column missing"))?;
        f(col.data.as_backlink_mut()?, arena)
    }

    /// Runs `f` with the forward column at `(t, c)`, its paired backlink
    /// column, and the arena all mutably borrowed.
    pub(crate) fn with_link_pair<R>(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        f: impl FnOnce(&mut LinkColumn, &mut BacklinkColumn, &mut Arena) -> Result<R>,
    ) -> Result<R> {
        let schema = self.singular_schema(t, c)?;
        let GraphInner { tables, arena, .. } = self;
        if t == schema.target_table {
            let table = &mut tables[t];
            let (fwd, back) = two_cols_mut(&mut table.cols, c, schema.backlink_col);
            f(fwd.data.as_link_mut()?, back.data.as_backlink_mut()?, arena)
        } else {
            let (origin, target) = two_tables_mut(tables, t, schema.target_table);
            f(
                origin.cols[c].data.as_link_mut()?,
                target.cols[schema.backlink_col].data.as_backlink_mut()?,
                arena,
            )
        }
    }

    pub(crate) fn with_list_pair<R>(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        f: impl FnOnce(&mut LinkListColumn, &mut BacklinkColumn, &mut Arena) -> Result<R>,
    ) -> Result<R> {
        let schema = self.list_schema(t, c)?;
        let GraphInner { tables, arena, .. } = self;
        if t == schema.target_table {
            let table = &mut tables[t];
            let (fwd, back) = two_cols_mut(&mut table.cols, c, schema.backlink_col);
            f(fwd.data.as_list_mut()?, back.data.as_backlink_mut()?, arena)
        } else {
            let (origin, target) = two_tables_mut(tables, t, schema.target_table);
            f(
                origin.cols[c].data.as_list_mut()?,
                target.cols[schema.backlink_col].data.as_backlink_mut()?,
                arena,
            )
        }
    }

    /// Removes one reciprocal backlink of the forward edge
    /// `(t, c, origin_row) -> target_row`.
    pub(crate) fn backlink_remove_one(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        target_row: RowNdx,
        origin_row: RowNdx,
    ) -> Result<()> {
        let schema = self.forward_schema(t, c)?;
        self.with_backlink(schema.target_table, schema.backlink_col, |col, arena| {
            col.remove_one(arena, target_row, origin_row)
        })
    }

    /// Renames the origin of one reciprocal backlink when origin rows shift.
    pub(crate) fn backlink_rename(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        target_row: RowNdx,
        old_origin: RowNdx,
        new_origin: RowNdx,
    ) -> Result<()> {
        let schema = self.forward_schema(t, c)?;
        self.with_backlink(schema.target_table, schema.backlink_col, |col, arena| {
            col.rename_origin(arena, target_row, old_origin, new_origin)
        })
    }

    pub(crate) fn backlink_swap_origins(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        target_row: RowNdx,
        a: RowNdx,
        b: RowNdx,
    ) -> Result<()> {
        let schema = self.forward_schema(t, c)?;
        self.with_backlink(schema.target_table, schema.backlink_col, |col, arena| {
            col.swap_origins(arena, target_row, a, b)
        })
    }

    // ---- singular link operations ----

    pub(crate) fn get_link(&self, t: TableNdx, c: ColNdx, row: RowNdx) -> Result<Option<RowNdx>> {
        self.check_row(t, row)?;
        match &self.column(t, c)?.data {
            ColumnData::Link(col) => col.get(row),
            ColumnData::List(_) => Err(LinkError::IllegalCombination(
                "column is a link list, not a single link",
            )),
            ColumnData::Backlink(_) => {
                Err(LinkError::IllegalCombination("column is not a link column"))
            }
        }
    }

    /// Sets a singular link, returning the prior target. Emits the
    /// replication event before any bookkeeping, and seeds a cascade when a
    /// strong column orphans its previous target.
    pub(crate) fn set_link(
        &mut self,
        t: TableNdx,
        c: ColNdx,
        row: RowNdx,
        target: Option<RowNdx>,
    ) -> Result<Option<RowNdx>> {
        let schema = self.singular_schema(t, c)?;
        self.check_row(t, row)?;
        if let Some(target_row) = target {
            self.check_row(schema.target_table, target_row)?;
        }
        if let Some(repl) = self.repl.as_mut() {
            repl.set_link(t, c, row, target);
        }
        let old = self.with_link_pair(t, c, |links, backlinks, arena| {
            links.set(row, target, backlinks, arena)
        })?;
        if schema.kind.is_strong() {
            if let Some(old_target) = old {
                if self.strong_backlink_count(schema.target_table, old_target)? == 0 {
                    self.cascade_remove_orphan(schema.target_table, old_target)?;
                }
            }
        }
        Ok(old)
    }

    // ---- backlink introspection ----

    fn backlink_cols(&self, t: TableNdx) -> Result<impl Iterator<Item = &BacklinkColumn>> {
        Ok(self.table(t)?.cols.iter().filter_map(|c| match &c.data {
            ColumnData::Backlink(col) => Some(col),
            _ => None,
        }))
    }

    pub(crate) fn backlink_count_total(&self, t: TableNdx, row: RowNdx) -> Result<usize> {
        self.check_row(t, row)?;
        let mut total = 0;
        for col in self.backlink_cols(t)? {
            total += col.count(&self.arena, row)?;
        }
        Ok(total)
    }

    /// Number of incoming edges whose forward column is strong. Weak edges
    /// never keep a row alive.
    pub(crate) fn strong_backlink_count(&self, t: TableNdx, row: RowNdx) -> Result<usize> {
        self.check_row(t, row)?;
        let mut total = 0;
        for col in self.backlink_cols(t)? {
            let origin_schema = self.forward_schema(col.origin_table, col.origin_col)?;
            if origin_schema.kind.is_strong() {
                total += col.count(&self.arena, row)?;
            }
        }
        Ok(total)
    }

    pub(crate) fn backlink_col_ndx(
        &self,
        t: TableNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
    ) -> Result<ColNdx> {
        self.table(t)?
            .cols
            .iter()
            .position(|c| match &c.data {
                ColumnData::Backlink(col) => {
                    col.origin_table == origin_table && col.origin_col == origin_col
                }
                _ => false,
            })
            .ok_or(LinkError::IllegalCombination(
                "table has no backlink column for that origin",
            ))
    }

    pub(crate) fn backlink_count_from(
        &self,
        t: TableNdx,
        row: RowNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
    ) -> Result<usize> {
        self.check_row(t, row)?;
        let b = self.backlink_col_ndx(t, origin_table, origin_col)?;
        self.column(t, b)?.data.as_backlink()?.count(&self.arena, row)
    }

    pub(crate) fn backlink_from(
        &self,
        t: TableNdx,
        row: RowNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
        n: usize,
    ) -> Result<RowNdx> {
        self.check_row(t, row)?;
        let b = self.backlink_col_ndx(t, origin_table, origin_col)?;
        self.column(t, b)?
            .data
            .as_backlink()?
            .get_nth(&self.arena, row, n)
    }

    /// Physical representation of one backlink cell, for inspection of the
    /// inline/store discipline.
    pub(crate) fn backlink_shape(
        &self,
        t: TableNdx,
        row: RowNdx,
        origin_table: TableNdx,
        origin_col: ColNdx,
    ) -> Result<BacklinkShape> {
        self.check_row(t, row)?;
        let b = self.backlink_col_ndx(t, origin_table, origin_col)?;
        let col = self.column(t, b)?.data.as_backlink()?;
        Ok(match col.cell(row)? {
            BacklinkCell::Empty => BacklinkShape::Empty,
            BacklinkCell::Inline(origin) => BacklinkShape::Inline(origin),
            BacklinkCell::Store(r) => BacklinkShape::Store(
                self.arena.get(r)?.iter().map(|v| v as RowNdx).collect(),
            ),
        })
    }

    pub(crate) fn notify_view_destroyed(&mut self, addr: ListAddr) {
        if let Some(repl) = self.repl.as_mut() {
            repl.on_list_view_destroyed(addr);
        }
    }
}
