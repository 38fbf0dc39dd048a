use std::sync::{Arc, Mutex};

use enlace::{
    CascadeNotification, CascadeObserver, LinkGraph, LinkKind, LinkNullification, RowLocation,
};

#[derive(Default)]
struct Recorder {
    notifications: Arc<Mutex<Vec<CascadeNotification>>>,
}

impl CascadeObserver for Recorder {
    fn on_cascade(&mut self, notification: &CascadeNotification) {
        self.notifications.lock().unwrap().push(notification.clone());
    }
}

fn install_recorder(graph: &LinkGraph) -> Arc<Mutex<Vec<CascadeNotification>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    graph.set_cascade_observer(Box::new(Recorder {
        notifications: Arc::clone(&log),
    }));
    log
}

fn row(table: usize, row: usize) -> RowLocation {
    RowLocation { table, row }
}

/// Strong and weak columns mixed: removing the origin row deletes both
/// strong targets, and the notification lists the weak breakages in
/// discovery order.
#[test]
fn cascade_notification_orders_rows_and_links() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let link = graph
        .add_link_column(origin, "link", target, LinkKind::Strong)
        .unwrap();
    let linklist = graph
        .add_link_list_column(origin, "linklist", target, LinkKind::Strong)
        .unwrap();
    let link2 = graph
        .add_link_column(origin, "link2", target, LinkKind::Weak)
        .unwrap();
    let linklist2 = graph
        .add_link_list_column(origin, "linklist2", target, LinkKind::Weak)
        .unwrap();
    graph.add_rows(target, 100).unwrap();
    graph.add_rows(origin, 26).unwrap();

    graph.set_link(origin, link, 20, Some(30)).unwrap();
    graph.link_list(origin, linklist, 20).unwrap().add(31).unwrap();
    graph.set_link(origin, link2, 25, Some(31)).unwrap();
    graph.link_list(origin, linklist2, 25).unwrap().add(30).unwrap();
    graph.verify().unwrap();

    let log = install_recorder(&graph);
    graph.move_last_over(origin, 20).unwrap();
    graph.verify().unwrap();

    let notifications = log.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    let note = &notifications[0];
    assert_eq!(
        note.rows,
        vec![row(target, 30), row(target, 31), row(origin, 20)]
    );
    assert_eq!(
        note.links,
        vec![
            LinkNullification {
                origin_table: origin,
                origin_col: linklist2,
                origin_row: 25,
                old_target_row: 30,
            },
            LinkNullification {
                origin_table: origin,
                origin_col: link2,
                origin_row: 25,
                old_target_row: 31,
            },
        ]
    );
    drop(notifications);

    assert_eq!(graph.table_size(target).unwrap(), 98);
    assert_eq!(graph.table_size(origin).unwrap(), 25);
    // Row 25 moved into slot 20 with both weak links nullified.
    assert_eq!(graph.get_link(origin, link2, 20).unwrap(), None);
    assert!(graph.link_list_is_degenerate(origin, linklist2, 20).unwrap());
}

/// Three rows in a strong self-link cycle: removing any one of them takes
/// the whole cycle down, with no nullifications to report.
#[test]
fn self_link_cycle_cascades_completely() {
    let graph = LinkGraph::new();
    let t = graph.add_table("t");
    let col = graph.add_link_column(t, "l", t, LinkKind::Strong).unwrap();
    graph.add_rows(t, 3).unwrap();
    graph.set_link(t, col, 0, Some(1)).unwrap();
    graph.set_link(t, col, 1, Some(2)).unwrap();
    graph.set_link(t, col, 2, Some(0)).unwrap();
    graph.verify().unwrap();

    let log = install_recorder(&graph);
    graph.remove_recursive(t, 0).unwrap();

    let notifications = log.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].rows, vec![row(t, 0), row(t, 1), row(t, 2)]);
    assert!(notifications[0].links.is_empty());
    drop(notifications);

    assert_eq!(graph.table_size(t).unwrap(), 0);
    graph.verify().unwrap();
}

/// A row kept alive by another strong edge survives the removal of one of
/// its origins.
#[test]
fn shared_strong_target_survives_one_origin() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let col = graph
        .add_link_column(origin, "ref", target, LinkKind::Strong)
        .unwrap();
    graph.add_rows(target, 1).unwrap();
    graph.add_rows(origin, 2).unwrap();
    graph.set_link(origin, col, 0, Some(0)).unwrap();
    graph.set_link(origin, col, 1, Some(0)).unwrap();

    graph.move_last_over(origin, 0).unwrap();
    assert_eq!(graph.table_size(target).unwrap(), 1);
    assert_eq!(graph.backlink_count(target, 0).unwrap(), 1);
    graph.verify().unwrap();

    graph.move_last_over(origin, 0).unwrap();
    assert_eq!(graph.table_size(target).unwrap(), 0);
    assert_eq!(graph.table_size(origin).unwrap(), 0);
    graph.verify().unwrap();
}

/// Overwriting a strong link orphans the prior target.
#[test]
fn set_link_cascades_into_orphaned_target() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let col = graph
        .add_link_column(origin, "ref", target, LinkKind::Strong)
        .unwrap();
    graph.add_rows(target, 3).unwrap();
    graph.add_rows(origin, 1).unwrap();
    graph.set_link(origin, col, 0, Some(1)).unwrap();

    let log = install_recorder(&graph);
    graph.set_link(origin, col, 0, Some(2)).unwrap();

    let notifications = log.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].rows, vec![row(target, 1)]);
    drop(notifications);

    // Row 2 moved into the vacated slot 1.
    assert_eq!(graph.table_size(target).unwrap(), 2);
    assert_eq!(graph.get_link(origin, col, 0).unwrap(), Some(1));
    assert_eq!(graph.backlink_count(target, 1).unwrap(), 1);
    graph.verify().unwrap();
}

/// Clearing a strong link list removes orphaned targets exactly once, even
/// with duplicates, and the pinned cell never re-enters the cascade.
#[test]
fn strong_list_clear_collects_orphans() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let col = graph
        .add_link_list_column(origin, "refs", target, LinkKind::Strong)
        .unwrap();
    graph.add_rows(target, 3).unwrap();
    graph.add_rows(origin, 1).unwrap();
    let list = graph.link_list(origin, col, 0).unwrap();
    list.add(0).unwrap();
    list.add(1).unwrap();
    list.add(1).unwrap();
    graph.verify().unwrap();

    let log = install_recorder(&graph);
    list.clear().unwrap();

    let notifications = log.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].rows, vec![row(target, 0), row(target, 1)]);
    assert!(notifications[0].links.is_empty());
    drop(notifications);

    assert_eq!(list.len().unwrap(), 0);
    assert!(graph.link_list_is_degenerate(origin, col, 0).unwrap());
    assert_eq!(graph.table_size(target).unwrap(), 1);
    graph.verify().unwrap();
}

/// Clearing a whole table reports no rows of its own, but still reports the
/// weak incoming links it nullified.
#[test]
fn table_clear_reports_nullified_incoming_links() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let link = graph
        .add_link_column(origin, "ref", target, LinkKind::Weak)
        .unwrap();
    let list = graph
        .add_link_list_column(origin, "refs", target, LinkKind::Weak)
        .unwrap();
    graph.add_rows(target, 3).unwrap();
    graph.add_rows(origin, 2).unwrap();
    graph.set_link(origin, link, 0, Some(2)).unwrap();
    graph.link_list(origin, list, 1).unwrap().add(0).unwrap();

    let log = install_recorder(&graph);
    graph.clear_table(target).unwrap();

    let notifications = log.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].rows.is_empty());
    assert_eq!(
        notifications[0].links,
        vec![
            LinkNullification {
                origin_table: origin,
                origin_col: link,
                origin_row: 0,
                old_target_row: 2,
            },
            LinkNullification {
                origin_table: origin,
                origin_col: list,
                origin_row: 1,
                old_target_row: 0,
            },
        ]
    );
    drop(notifications);

    assert_eq!(graph.table_size(target).unwrap(), 0);
    assert_eq!(graph.get_link(origin, link, 0).unwrap(), None);
    assert_eq!(graph.link_list(origin, list, 1).unwrap().len().unwrap(), 0);
    graph.verify().unwrap();
}

/// Clearing an origin table cascades into targets its strong links kept
/// alive, but never into the clearing table itself.
#[test]
fn table_clear_cascades_through_strong_links() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let col = graph
        .add_link_column(origin, "ref", target, LinkKind::Strong)
        .unwrap();
    graph.add_rows(target, 2).unwrap();
    graph.add_rows(origin, 2).unwrap();
    graph.set_link(origin, col, 0, Some(0)).unwrap();
    graph.set_link(origin, col, 1, Some(1)).unwrap();

    let log = install_recorder(&graph);
    graph.clear_table(origin).unwrap();

    let notifications = log.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].rows, vec![row(target, 0), row(target, 1)]);
    drop(notifications);

    assert_eq!(graph.table_size(origin).unwrap(), 0);
    assert_eq!(graph.table_size(target).unwrap(), 0);
    graph.verify().unwrap();
}

/// Duplicate list entries keep the target alive until the last occurrence
/// goes away.
#[test]
fn duplicate_list_entries_count_with_multiplicity() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let col = graph
        .add_link_list_column(origin, "refs", target, LinkKind::Strong)
        .unwrap();
    graph.add_rows(target, 1).unwrap();
    graph.add_rows(origin, 1).unwrap();
    let list = graph.link_list(origin, col, 0).unwrap();
    list.add(0).unwrap();
    list.add(0).unwrap();

    list.remove(0).unwrap();
    assert_eq!(graph.table_size(target).unwrap(), 1);
    assert_eq!(graph.backlink_count(target, 0).unwrap(), 1);

    list.remove(0).unwrap();
    assert_eq!(graph.table_size(target).unwrap(), 0);
    graph.verify().unwrap();
}

/// `delete_target` erases the row in the target table, which removes every
/// other reference to it as well.
#[test]
fn delete_target_removes_all_references() {
    let graph = LinkGraph::new();
    let target = graph.add_table("target");
    let origin = graph.add_table("origin");
    let list_col = graph
        .add_link_list_column(origin, "refs", target, LinkKind::Weak)
        .unwrap();
    let link_col = graph
        .add_link_column(origin, "ref", target, LinkKind::Weak)
        .unwrap();
    graph.add_rows(target, 3).unwrap();
    graph.add_rows(origin, 2).unwrap();
    let list = graph.link_list(origin, list_col, 0).unwrap();
    list.add(1).unwrap();
    list.add(2).unwrap();
    graph.set_link(origin, link_col, 1, Some(1)).unwrap();

    list.delete_target(0).unwrap();

    assert_eq!(graph.table_size(target).unwrap(), 2);
    // The deleted target was row 1; the list keeps only the link to the
    // former row 2, which moved into slot 1.
    assert_eq!(list.len().unwrap(), 1);
    assert_eq!(list.get(0).unwrap(), 1);
    assert_eq!(graph.get_link(origin, link_col, 1).unwrap(), None);
    graph.verify().unwrap();
}
