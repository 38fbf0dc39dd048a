//! Snapshot image codec.
//!
//! The image serializes every column's raw cell words plus the arena stores
//! keyed by their refs, so the byte-level cell discipline (one-shifted
//! forward cells, tagged-inline backlink cells, even store refs) is directly
//! observable by a reader with no prior in-memory state. Big-endian
//! throughout, length-prefixed, with a magic header.

use crate::error::{LinkError, Result};
use crate::store::arena::Arena;
use crate::store::backlink::BacklinkColumn;
use crate::store::int_store::IntStore;
use crate::store::link::LinkColumn;
use crate::store::link_list::LinkListColumn;
use crate::types::LinkKind;

use super::inner::{Column, ColumnData, GraphInner, Table};

const MAGIC: &[u8; 4] = b"ENLC";
const VERSION: u16 = 1;

const COL_TAG_LINK: u8 = 0;
const COL_TAG_LIST: u8 = 1;
const COL_TAG_BACKLINK: u8 = 2;

const KIND_STRONG: u8 = 0;
const KIND_WEAK: u8 = 1;

impl GraphInner {
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        put_u16(&mut out, VERSION);
        put_u32(&mut out, self.tables.len() as u32);
        for table in &self.tables {
            put_str(&mut out, &table.name);
            put_u64(&mut out, table.num_rows as u64);
            put_u32(&mut out, table.public_count as u32);
            put_u32(&mut out, table.cols.len() as u32);
            for column in &table.cols {
                match &column.data {
                    ColumnData::Link(col) => {
                        out.push(COL_TAG_LINK);
                        put_str(&mut out, &column.name);
                        out.push(kind_byte(col.kind));
                        put_u32(&mut out, col.target_table as u32);
                        put_u32(&mut out, col.backlink_col as u32);
                        put_words(&mut out, (0..col.len()).map(|r| col.word(r).unwrap_or(0)));
                    }
                    ColumnData::List(col) => {
                        out.push(COL_TAG_LIST);
                        put_str(&mut out, &column.name);
                        out.push(kind_byte(col.kind));
                        put_u32(&mut out, col.target_table as u32);
                        put_u32(&mut out, col.backlink_col as u32);
                        put_words(&mut out, (0..col.len()).map(|r| col.word(r).unwrap_or(0)));
                    }
                    ColumnData::Backlink(col) => {
                        out.push(COL_TAG_BACKLINK);
                        put_str(&mut out, &column.name);
                        out.push(KIND_STRONG);
                        put_u32(&mut out, col.origin_table as u32);
                        put_u32(&mut out, col.origin_col as u32);
                        put_words(&mut out, (0..col.len()).map(|r| col.word(r).unwrap_or(0)));
                    }
                }
            }
        }
        let refs: Vec<u64> = self.arena.refs().collect();
        put_u32(&mut out, refs.len() as u32);
        for r in refs {
            put_u64(&mut out, r);
            let store = self.arena.get(r).expect("ref came from the arena");
            put_u64(&mut out, store.size() as u64);
            for value in store.iter() {
                put_u64(&mut out, value);
            }
        }
        out
    }

    pub(crate) fn restore(bytes: &[u8]) -> Result<GraphInner> {
        let mut reader = Reader { buf: bytes, pos: 0 };
        if reader.take(4)? != MAGIC {
            return Err(LinkError::InvariantViolation("snapshot magic mismatch"));
        }
        if reader.u16()? != VERSION {
            return Err(LinkError::InvariantViolation("unsupported snapshot version"));
        }
        let table_count = reader.u32()? as usize;
        let mut tables = Vec::with_capacity(table_count);
        for _ in 0..table_count {
            let name = reader.string()?;
            let num_rows = reader.u64()? as usize;
            let public_count = reader.u32()? as usize;
            let col_count = reader.u32()? as usize;
            let mut cols = Vec::with_capacity(col_count);
            for _ in 0..col_count {
                let tag = reader.u8()?;
                let col_name = reader.string()?;
                let kind = match reader.u8()? {
                    KIND_STRONG => LinkKind::Strong,
                    KIND_WEAK => LinkKind::Weak,
                    _ => return Err(LinkError::InvariantViolation("bad link kind in snapshot")),
                };
                let peer_table = reader.u32()? as usize;
                let peer_col = reader.u32()? as usize;
                let cells = reader.words()?;
                if cells.len() != num_rows {
                    return Err(LinkError::InvariantViolation(
                        "snapshot column length disagrees with table size",
                    ));
                }
                let data = match tag {
                    COL_TAG_LINK => {
                        ColumnData::Link(LinkColumn::from_words(peer_table, peer_col, kind, cells))
                    }
                    COL_TAG_LIST => ColumnData::List(LinkListColumn::from_words(
                        peer_table, peer_col, kind, cells,
                    )),
                    COL_TAG_BACKLINK => {
                        ColumnData::Backlink(BacklinkColumn::from_words(peer_table, peer_col, cells))
                    }
                    _ => return Err(LinkError::InvariantViolation("bad column tag in snapshot")),
                };
                cols.push(Column {
                    name: col_name,
                    data,
                });
            }
            tables.push(Table {
                name,
                num_rows,
                public_count,
                cols,
            });
        }
        let mut arena = Arena::new();
        let store_count = reader.u32()? as usize;
        for _ in 0..store_count {
            let r = reader.u64()?;
            let len = reader.u64()? as usize;
            let mut store = IntStore::new();
            for _ in 0..len {
                store.add(reader.u64()?);
            }
            arena.adopt(r, store)?;
        }
        arena.rebuild_free_list();
        if reader.pos != bytes.len() {
            return Err(LinkError::InvariantViolation("trailing bytes in snapshot"));
        }
        let mut inner = GraphInner::with_arena(arena);
        inner.tables = tables;
        Ok(inner)
    }
}

fn kind_byte(kind: LinkKind) -> u8 {
    match kind {
        LinkKind::Strong => KIND_STRONG,
        LinkKind::Weak => KIND_WEAK,
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn put_words(out: &mut Vec<u8>, words: impl Iterator<Item = u64>) {
    let start = out.len();
    put_u64(out, 0);
    let mut count = 0u64;
    for word in words {
        put_u64(out, word);
        count += 1;
    }
    out[start..start + 8].copy_from_slice(&count.to_be_bytes());
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(LinkError::InvariantViolation("snapshot truncated"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| LinkError::InvariantViolation("snapshot string is not utf-8"))
    }

    fn words(&mut self) -> Result<Vec<u64>> {
        let count = self.u64()? as usize;
        let mut words = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            words.push(self.u64()?);
        }
        Ok(words)
    }
}
