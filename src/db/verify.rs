//! Full-image integrity check: cell word discipline, reciprocity between
//! forward and backlink columns, accessor registry order, and arena
//! accounting. Returns the first violation found.

use rustc_hash::FxHashMap;

use crate::error::{LinkError, Result};
use crate::store::arena::StoreRef;
use crate::store::cell::BacklinkCell;
use crate::types::{RowNdx, TableNdx};

use super::inner::{ColumnData, GraphInner};

impl GraphInner {
    pub(crate) fn verify(&self) -> Result<()> {
        let mut referenced_stores: Vec<StoreRef> = Vec::new();

        for (t, table) in self.tables.iter().enumerate() {
            for (c, column) in table.cols.iter().enumerate() {
                match &column.data {
                    ColumnData::Link(col) => {
                        if col.len() != table.num_rows {
                            return Err(LinkError::InvariantViolation(
                                "link column length disagrees with table size",
                            ));
                        }
                        self.verify_pairing(t, c, col.target_table, col.backlink_col)?;
                        let target_size = self.table(col.target_table)?.num_rows;
                        for row in 0..table.num_rows {
                            if let Some(target) = col.get(row)? {
                                if target >= target_size {
                                    return Err(LinkError::InvariantViolation(
                                        "dangling forward link",
                                    ));
                                }
                            }
                        }
                        self.verify_reciprocity(t, c, col.target_table, col.backlink_col)?;
                    }
                    ColumnData::List(col) => {
                        if col.len() != table.num_rows {
                            return Err(LinkError::InvariantViolation(
                                "link-list column length disagrees with table size",
                            ));
                        }
                        self.verify_pairing(t, c, col.target_table, col.backlink_col)?;
                        let target_size = self.table(col.target_table)?.num_rows;
                        for row in 0..table.num_rows {
                            if let Some(store) = col.cell_ref(row)? {
                                if !self.arena.contains(store) {
                                    return Err(LinkError::InvariantViolation(
                                        "link-list cell references a dead store",
                                    ));
                                }
                                if self.arena.get(store)?.is_empty() {
                                    return Err(LinkError::InvariantViolation(
                                        "empty link list kept a backing store",
                                    ));
                                }
                                referenced_stores.push(store);
                            }
                            for target in col.targets(&self.arena, row)? {
                                if target >= target_size {
                                    return Err(LinkError::InvariantViolation(
                                        "dangling link-list entry",
                                    ));
                                }
                            }
                        }
                        self.verify_reciprocity(t, c, col.target_table, col.backlink_col)?;
                        if !col.accessors.is_sorted_unique() {
                            return Err(LinkError::InvariantViolation(
                                "accessor registry out of order",
                            ));
                        }
                        for row in col.accessors.live_rows() {
                            if row >= table.num_rows {
                                return Err(LinkError::InvariantViolation(
                                    "live accessor bound to a dead row",
                                ));
                            }
                        }
                    }
                    ColumnData::Backlink(col) => {
                        if col.len() != table.num_rows {
                            return Err(LinkError::InvariantViolation(
                                "backlink column length disagrees with table size",
                            ));
                        }
                        let origin_size = self.table(col.origin_table)?.num_rows;
                        for row in 0..table.num_rows {
                            match col.cell(row)? {
                                BacklinkCell::Empty => {}
                                BacklinkCell::Inline(origin) => {
                                    if origin >= origin_size {
                                        return Err(LinkError::InvariantViolation(
                                            "dangling inline backlink",
                                        ));
                                    }
                                }
                                BacklinkCell::Store(store) => {
                                    if !self.arena.contains(store) {
                                        return Err(LinkError::InvariantViolation(
                                            "backlink cell references a dead store",
                                        ));
                                    }
                                    if self.arena.get(store)?.size() < 2 {
                                        return Err(LinkError::InvariantViolation(
                                            "store-form backlink cell holds fewer than two origins",
                                        ));
                                    }
                                    referenced_stores.push(store);
                                    for origin in col.origins(&self.arena, row)? {
                                        if origin >= origin_size {
                                            return Err(LinkError::InvariantViolation(
                                                "dangling backlink origin",
                                            ));
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        referenced_stores.sort_unstable();
        let before = referenced_stores.len();
        referenced_stores.dedup();
        if referenced_stores.len() != before {
            return Err(LinkError::InvariantViolation(
                "store referenced by more than one cell",
            ));
        }
        if referenced_stores.len() != self.arena.live_stores() {
            return Err(LinkError::InvariantViolation("leaked backing store"));
        }
        Ok(())
    }

    fn verify_pairing(
        &self,
        t: TableNdx,
        c: usize,
        target_table: TableNdx,
        backlink_col: usize,
    ) -> Result<()> {
        let peer = self.column(target_table, backlink_col)?.data.as_backlink()?;
        if peer.origin_table != t || peer.origin_col != c {
            return Err(LinkError::InvariantViolation(
                "forward and backlink columns disagree about their pairing",
            ));
        }
        Ok(())
    }

    /// The multiset of forward edges must equal the multiset recorded on the
    /// backlink side, multiplicity included.
    fn verify_reciprocity(
        &self,
        t: TableNdx,
        c: usize,
        target_table: TableNdx,
        backlink_col: usize,
    ) -> Result<()> {
        let mut forward: FxHashMap<(RowNdx, RowNdx), usize> = FxHashMap::default();
        for row in 0..self.table(t)?.num_rows {
            for target in self.forward_targets(t, c, row)? {
                *forward.entry((row, target)).or_insert(0) += 1;
            }
        }
        let mut backward: FxHashMap<(RowNdx, RowNdx), usize> = FxHashMap::default();
        let peer = self.column(target_table, backlink_col)?.data.as_backlink()?;
        for target in 0..self.table(target_table)?.num_rows {
            for origin in peer.origins(&self.arena, target)? {
                *backward.entry((origin, target)).or_insert(0) += 1;
            }
        }
        if forward != backward {
            return Err(LinkError::InvariantViolation(
                "forward links and backlinks are not reciprocal",
            ));
        }
        Ok(())
    }
}
