//! Link-graph storage core of an embedded object database.
//!
//! Tables hold typed rows addressed by index; link columns (singular or
//! list-valued) store forward references into a target table, and every
//! forward edge keeps a reciprocal record in a hidden backlink column of the
//! target. The engine maintains that reciprocity across every mutation,
//! keeps live [`LinkView`] handles valid while rows are renumbered, and runs
//! a cascade planner that removes strong-linked orphans with cycle safety.
//!
//! ```
//! use enlace::{LinkGraph, LinkKind};
//!
//! let graph = LinkGraph::new();
//! let target = graph.add_table("target");
//! let origin = graph.add_table("origin");
//! let col = graph.add_link_list_column(origin, "refs", target, LinkKind::Weak).unwrap();
//! graph.add_rows(target, 3).unwrap();
//! graph.add_rows(origin, 1).unwrap();
//!
//! let refs = graph.link_list(origin, col, 0).unwrap();
//! refs.add(2).unwrap();
//! assert_eq!(graph.backlink_count(target, 2).unwrap(), 1);
//! graph.verify().unwrap();
//! ```

pub mod error;
pub mod replication;
pub mod store;
pub mod types;

pub(crate) mod db;

pub use db::{BacklinkShape, LinkGraph};
pub use error::{LinkError, Result};
pub use replication::{
    CascadeNotification, CascadeObserver, LinkNullification, ListAddr, Replication, RowLocation,
};
pub use store::LinkView;
pub use types::{ColNdx, LinkKind, RowNdx, TableNdx};
