//! Integration tests for the navigator service
//!
//! Drives host events through a [`Navigator`] backed by SQLite and checks
//! what ends up in storage and what a fresh navigator restores.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;

use research_navigator::config::NavigatorConfig;
use research_navigator::history::{ItemDescriptor, NoteLinkKind, Relation, TreeFilter};
use research_navigator::storage::{SqliteStorage, Storage};
use research_navigator::Navigator;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 15, 0, 0).unwrap() + Duration::seconds(secs)
}

fn turing(id: i64, title: &str) -> ItemDescriptor {
    ItemDescriptor::new(id, title).with_creator("Alan", "Turing")
}

async fn persistent_navigator() -> (Navigator, Arc<SqliteStorage>) {
    let storage = Arc::new(
        SqliteStorage::new_in_memory()
            .await
            .expect("Failed to create in-memory storage"),
    );
    let navigator = Navigator::with_storage(NavigatorConfig::default(), storage.clone());
    (navigator, storage)
}

#[cfg(test)]
mod write_through_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_events_are_persisted() {
        let (navigator, storage) = persistent_navigator().await;

        navigator
            .item_selected(&turing(1, "On Computable Numbers"), at(0))
            .await
            .unwrap();
        let second = navigator
            .item_selected(&turing(2, "Computing Machinery and Intelligence"), at(2))
            .await
            .unwrap();
        assert_eq!(second.relation, Relation::Author);

        let sessions = storage.load_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);

        let nodes = storage.load_nodes(10).await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].parent_id, Some(nodes[0].id));
        assert_eq!(nodes[1].relation, Relation::Author);

        let visits = storage.get_session_visits(&sessions[0].id).await.unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[1].parent_item_id, Some(1));
    }

    #[tokio::test]
    async fn test_revisit_updates_stored_count() {
        let (navigator, storage) = persistent_navigator().await;
        let item = turing(1, "On Computable Numbers");

        navigator.item_selected(&item, at(0)).await.unwrap();
        navigator.item_selected(&item, at(1)).await.unwrap();
        navigator.item_selected(&item, at(2)).await.unwrap();

        let nodes = storage.load_nodes(10).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].visit_count, 3);
        assert_eq!(nodes[0].last_visit, at(2));
    }

    #[tokio::test]
    async fn test_annotation_and_tab_close_are_persisted() {
        let (navigator, storage) = persistent_navigator().await;
        let view = navigator
            .tab_opened("reader-1", &turing(1, "On Computable Numbers"), at(0))
            .await
            .unwrap();

        navigator
            .annotate(&view.id, Some("the halting problem"), Some(5))
            .await
            .unwrap();
        navigator.tab_closed("reader-1", at(30)).await.unwrap();

        let nodes = storage.load_nodes(10).await.unwrap();
        assert_eq!(nodes[0].notes, "the halting problem");
        assert_eq!(nodes[0].importance, 5);
        assert_eq!(nodes[0].closed_at, Some(at(30)));
    }

    #[tokio::test]
    async fn test_tab_selected_persists_visit() {
        let (navigator, storage) = persistent_navigator().await;
        let first = navigator
            .tab_opened("reader-1", &turing(1, "On Computable Numbers"), at(0))
            .await
            .unwrap();
        navigator
            .tab_opened("reader-2", &turing(2, "Computing Machinery"), at(60))
            .await
            .unwrap();

        navigator.tab_selected("reader-1", None, at(120)).await.unwrap();

        let nodes = storage.load_nodes(10).await.unwrap();
        let stored = nodes.iter().find(|n| n.id == first.id).unwrap();
        assert_eq!(stored.visit_count, 2);
        assert_eq!(stored.last_visit, at(120));

        let sessions = storage.load_sessions().await.unwrap();
        let visits = storage.get_session_visits(&sessions[0].id).await.unwrap();
        assert_eq!(visits.len(), 3);
        assert_eq!(visits[2].item_id, 1);
    }

    #[tokio::test]
    async fn test_note_links_are_persisted() {
        let (navigator, storage) = persistent_navigator().await;
        let view = navigator
            .item_selected(&turing(1, "On Computable Numbers"), at(0))
            .await
            .unwrap();

        navigator
            .link_note(70, None, NoteLinkKind::CreatedDuring, at(5))
            .await
            .unwrap();
        navigator
            .link_note(71, Some(&view.id), NoteLinkKind::Questions, at(6))
            .await
            .unwrap();
        navigator
            .link_note(70, Some(&view.id), NoteLinkKind::Summarizes, at(7))
            .await
            .unwrap();

        let links = storage.load_note_links().await.unwrap();
        assert_eq!(links.len(), 2);
        let relinked = links.iter().find(|l| l.note_id == 70).unwrap();
        assert_eq!(relinked.kind, NoteLinkKind::Summarizes);

        assert!(navigator.unlink_note(71, &view.id).await.unwrap());
        assert!(!navigator.unlink_note(71, &view.id).await.unwrap());
        assert_eq!(storage.load_note_links().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_session_is_persisted() {
        let (navigator, storage) = persistent_navigator().await;

        navigator.item_selected(&turing(1, "A"), at(0)).await;
        navigator.item_selected(&turing(2, "B"), at(40 * 60)).await;

        assert_eq!(storage.load_sessions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_empties_storage() {
        let (navigator, storage) = persistent_navigator().await;
        navigator.item_selected(&turing(1, "A"), at(0)).await;

        navigator
            .link_note(70, None, NoteLinkKind::Manual, at(1))
            .await
            .unwrap();

        navigator.clear().await;

        assert!(storage.load_note_links().await.unwrap().is_empty());
        assert!(storage.load_nodes(10).await.unwrap().is_empty());
        assert!(storage.load_sessions().await.unwrap().is_empty());
        assert!(navigator.tree(&TreeFilter::default()).await.is_empty());
    }
}

#[cfg(test)]
mod restore_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_restore_continues_live_session() {
        let (navigator, storage) = persistent_navigator().await;
        navigator.item_selected(&turing(1, "A"), at(0)).await;
        let last = navigator
            .item_selected(&turing(2, "B"), at(2))
            .await
            .unwrap();

        let restored = Navigator::with_storage(NavigatorConfig::default(), storage.clone());
        assert_eq!(restored.restore(at(3)).await.unwrap(), 2);

        let current = restored.current().await.unwrap();
        assert_eq!(current.id, last.id);

        // Still inside the navigation window: the next item chains on.
        let next = restored
            .item_selected(&turing(3, "C"), at(4))
            .await
            .unwrap();
        assert_eq!(next.parent_id, Some(last.id));
        assert_eq!(next.session_id, last.session_id);
        assert_eq!(storage.load_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_loads_note_links() {
        let (navigator, storage) = persistent_navigator().await;
        let view = navigator.item_selected(&turing(1, "A"), at(0)).await.unwrap();
        navigator
            .link_note(70, None, NoteLinkKind::InspiredBy, at(1))
            .await
            .unwrap();

        let restored = Navigator::with_storage(NavigatorConfig::default(), storage.clone());
        restored.restore(at(2)).await.unwrap();

        let links = restored.note_nodes(70).await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].node_id, view.id);
        assert_eq!(links[0].kind, NoteLinkKind::InspiredBy);
        assert_eq!(restored.note_stats(5).await.total, 1);
    }

    #[tokio::test]
    async fn test_restore_after_timeout_starts_fresh() {
        let (navigator, storage) = persistent_navigator().await;
        let old = navigator.item_selected(&turing(1, "A"), at(0)).await.unwrap();

        let restored = Navigator::with_storage(NavigatorConfig::default(), storage.clone());
        restored.restore(at(3 * 60 * 60)).await.unwrap();
        assert!(restored.current().await.is_none());

        let next = restored
            .item_selected(&turing(2, "B"), at(3 * 60 * 60))
            .await
            .unwrap();
        assert_ne!(next.session_id, old.session_id);
        assert!(next.parent_id.is_none());

        let sessions = restored.tree(&TreeFilter::default()).await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, next.session_id);
    }

    #[tokio::test]
    async fn test_restore_honours_limit() {
        let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
        let navigator = Navigator::with_storage(NavigatorConfig::default(), storage.clone());
        for i in 0..5 {
            navigator
                .item_selected(&ItemDescriptor::new(i, format!("Paper {}", i)), at(i * 60))
                .await;
        }

        let config = NavigatorConfig {
            restore_limit: 3,
            ..NavigatorConfig::default()
        };
        let restored = Navigator::with_storage(config, storage);
        assert_eq!(restored.restore(at(400)).await.unwrap(), 3);
        assert_eq!(restored.stats(10).await.total_nodes, 3);
    }
}

#[cfg(test)]
mod export_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_export_import_preserves_structure() {
        let source = Navigator::new(NavigatorConfig::default());
        let root = source.item_selected(&turing(1, "A"), at(0)).await.unwrap();
        source.item_selected(&turing(2, "B"), at(1)).await;
        source
            .annotate(&root.id, Some("start here"), None)
            .await
            .unwrap();

        let document = source.export().await.unwrap();

        let (target, storage) = persistent_navigator().await;
        assert_eq!(target.import(&document).await.unwrap(), 2);
        assert_eq!(target.import(&document).await.unwrap(), 0);

        let sessions = target.tree(&TreeFilter::default()).await;
        assert_eq!(sessions.len(), 1);
        let imported_root = &sessions[0].roots[0];
        assert_eq!(imported_root.id, root.id);
        assert_eq!(imported_root.notes, "start here");
        assert_eq!(imported_root.children[0].item_id, 2);

        assert_eq!(storage.load_nodes(10).await.unwrap().len(), 2);
        assert_eq!(storage.load_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_recommend_after_import() {
        let source = Navigator::new(NavigatorConfig::default());
        source
            .item_selected(
                &ItemDescriptor::new(1, "Lambda Calculus")
                    .with_creator("Alonzo", "Church")
                    .with_tags(["logic"]),
                at(0),
            )
            .await;
        source
            .item_selected(
                &ItemDescriptor::new(2, "Combinatory Logic")
                    .with_creator("Haskell", "Curry")
                    .with_tags(["logic"]),
                at(60),
            )
            .await;
        let document = source.export().await.unwrap();

        let target = Navigator::new(NavigatorConfig::default());
        target.import(&document).await.unwrap();

        let results = target.search("lambda", 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_id, 1);

        let recommendations = target.recommend(Some(&results[0].id), 5).await.unwrap();
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].item_id, 2);
        assert!(recommendations[0].reason.starts_with("Common tags"));
    }
}
