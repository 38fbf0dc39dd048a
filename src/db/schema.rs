//! Schema operations: tables, link columns, and their paired backlink
//! columns.
//!
//! Every forward column owns exactly one backlink column appended to the
//! tail region of its target table. User-visible columns sit below
//! `public_count`, so adding a forward column never disturbs a public
//! index, only the tail; the few stored tail references are fixed up here.

use tracing::debug;

use crate::error::{LinkError, Result};
use crate::store::backlink::BacklinkColumn;
use crate::store::link::LinkColumn;
use crate::store::link_list::LinkListColumn;
use crate::types::{ColNdx, LinkKind, TableNdx};

use super::inner::{Column, ColumnData, GraphInner, Table};

impl GraphInner {
    pub(crate) fn add_table(&mut self, name: &str) -> TableNdx {
        self.tables.push(Table {
            name: name.to_owned(),
            num_rows: 0,
            public_count: 0,
            cols: Vec::new(),
        });
        self.tables.len() - 1
    }

    pub(crate) fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub(crate) fn table_size(&self, t: TableNdx) -> Result<usize> {
        Ok(self.table(t)?.num_rows)
    }

    pub(crate) fn table_name(&self, t: TableNdx) -> Result<&str> {
        Ok(&self.table(t)?.name)
    }

    pub(crate) fn add_link_column(
        &mut self,
        origin: TableNdx,
        name: &str,
        target: TableNdx,
        kind: LinkKind,
    ) -> Result<ColNdx> {
        self.add_forward_column(origin, name, target, kind, false)
    }

    pub(crate) fn add_link_list_column(
        &mut self,
        origin: TableNdx,
        name: &str,
        target: TableNdx,
        kind: LinkKind,
    ) -> Result<ColNdx> {
        self.add_forward_column(origin, name, target, kind, true)
    }

    fn add_forward_column(
        &mut self,
        origin: TableNdx,
        name: &str,
        target: TableNdx,
        kind: LinkKind,
        is_list: bool,
    ) -> Result<ColNdx> {
        self.table(origin)?;
        self.table(target)?;

        // The forward column lands at the end of the origin's public region,
        // shifting its backlink tail up by one.
        let pos = self.table(origin)?.public_count;
        self.shift_backlink_refs(origin, pos, 1);

        let origin_rows = self.table(origin)?.num_rows;
        let data = if is_list {
            ColumnData::List(LinkListColumn::new(target, 0, kind, origin_rows))
        } else {
            ColumnData::Link(LinkColumn::new(target, 0, kind, origin_rows))
        };
        let origin_table = self.table_mut(origin)?;
        origin_table.cols.insert(
            pos,
            Column {
                name: name.to_owned(),
                data,
            },
        );
        origin_table.public_count += 1;

        let target_rows = self.table(target)?.num_rows;
        let backlink_col = self.table(target)?.cols.len();
        self.table_mut(target)?.cols.push(Column {
            name: String::new(),
            data: ColumnData::Backlink(BacklinkColumn::new(origin, pos, target_rows)),
        });

        match &mut self.table_mut(origin)?.cols[pos].data {
            ColumnData::Link(col) => col.backlink_col = backlink_col,
            ColumnData::List(col) => col.backlink_col = backlink_col,
            ColumnData::Backlink(_) => unreachable!("just inserted a forward column"),
        }
        Ok(pos)
    }

    /// Adjusts every stored `backlink_col` reference into `table`'s tail
    /// region at or above `from` by `delta` column slots.
    fn shift_backlink_refs(&mut self, table: TableNdx, from: ColNdx, delta: isize) {
        for tbl in &mut self.tables {
            for col in &mut tbl.cols {
                match &mut col.data {
                    ColumnData::Link(col) if col.target_table == table && col.backlink_col >= from => {
                        col.backlink_col = (col.backlink_col as isize + delta) as ColNdx;
                    }
                    ColumnData::List(col) if col.target_table == table && col.backlink_col >= from => {
                        col.backlink_col = (col.backlink_col as isize + delta) as ColNdx;
                    }
                    _ => {}
                }
            }
        }
    }

    /// Removes a table. Fails with `CrossTableLinkTarget` while any other
    /// table has a link column into it; self-links die with the table. The
    /// last table moves into the vacated slot, and every stored table
    /// reference plus every live view on the moved table is re-homed.
    pub(crate) fn remove_table(&mut self, t: TableNdx) -> Result<()> {
        self.table(t)?;
        for (ti, table) in self.tables.iter().enumerate() {
            if ti == t {
                continue;
            }
            for col in &table.cols {
                let targets_t = match &col.data {
                    ColumnData::Link(col) => col.target_table == t,
                    ColumnData::List(col) => col.target_table == t,
                    ColumnData::Backlink(_) => false,
                };
                if targets_t {
                    return Err(LinkError::CrossTableLinkTarget);
                }
            }
        }
        debug!(table = t, name = %self.table(t)?.name, "removing table");

        // Outbound pairs into other tables: drop the paired backlink column
        // from each target, freeing its stores. Descending order per target
        // keeps the collected indexes valid.
        let mut pairs: Vec<(TableNdx, ColNdx)> = self
            .table(t)?
            .cols
            .iter()
            .filter_map(|col| match &col.data {
                ColumnData::Link(col) if col.target_table != t => {
                    Some((col.target_table, col.backlink_col))
                }
                ColumnData::List(col) if col.target_table != t => {
                    Some((col.target_table, col.backlink_col))
                }
                _ => None,
            })
            .collect();
        pairs.sort_unstable_by(|a, b| b.cmp(a));
        for (target, backlink_col) in pairs {
            let len = self
                .column(target, backlink_col)?
                .data
                .as_backlink()?
                .len();
            self.with_backlink(target, backlink_col, |col, arena| {
                col.clear_cells(arena, 0..len)
            })?;
            self.table_mut(target)?.cols.remove(backlink_col);
            self.shift_backlink_refs(target, backlink_col + 1, -1);
        }

        // Free the removed table's own stores and detach its views.
        let num_rows = self.table(t)?.num_rows;
        let ncols = self.table(t)?.cols.len();
        for c in 0..ncols {
            match &self.column(t, c)?.data {
                ColumnData::Link(_) => {}
                ColumnData::List(_) => {
                    for row in 0..num_rows {
                        self.with_list(t, c, |list, arena| list.free_cell(arena, row))?;
                    }
                    self.with_list(t, c, |list, _| {
                        list.accessors.detach_all();
                        Ok(())
                    })?;
                }
                ColumnData::Backlink(_) => {
                    self.with_backlink(t, c, |col, arena| col.clear_cells(arena, 0..num_rows))?;
                }
            }
        }

        let last = self.tables.len() - 1;
        self.tables.swap_remove(t);
        if t != last {
            for tbl in &mut self.tables {
                for col in &mut tbl.cols {
                    match &mut col.data {
                        ColumnData::Link(col) => {
                            if col.target_table == last {
                                col.target_table = t;
                            }
                        }
                        ColumnData::List(col) => {
                            if col.target_table == last {
                                col.target_table = t;
                            }
                        }
                        ColumnData::Backlink(col) => {
                            if col.origin_table == last {
                                col.origin_table = t;
                            }
                        }
                    }
                }
            }
            for col in &mut self.tables[t].cols {
                if let ColumnData::List(col) = &mut col.data {
                    col.accessors.rehome_views(t);
                }
            }
        }
        Ok(())
    }
}
