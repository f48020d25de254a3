//! Unit tests for history types and builder patterns.
//!
//! Covers relation parsing, creator formatting, item descriptor builders
//! and serialization of persisted records.

use super::*;
use chrono::TimeZone;
use serde_json::json;

// ============================================================================
// Relation tests
// ============================================================================

#[test]
fn test_relation_as_str_and_display() {
    assert_eq!(Relation::Author.as_str(), "author");
    assert_eq!(Relation::Temporal.to_string(), "temporal");
    assert_eq!(Relation::default(), Relation::Manual);
}

#[test]
fn test_relation_from_str_is_case_insensitive() {
    for relation in Relation::ALL {
        let upper = relation.as_str().to_uppercase();
        assert_eq!(upper.parse::<Relation>().unwrap(), relation);
    }
}

#[test]
fn test_relation_from_str_unknown() {
    let err = "sibling".parse::<Relation>().unwrap_err();
    assert_eq!(err, "Unknown relation: sibling");
}

#[test]
fn test_relation_serializes_snake_case() {
    assert_eq!(serde_json::to_value(Relation::Collection).unwrap(), json!("collection"));
    let parsed: Relation = serde_json::from_value(json!("tab")).unwrap();
    assert_eq!(parsed, Relation::Tab);
}

#[test]
fn test_relation_labels() {
    assert_eq!(Relation::Author.label(), "Same author");
    assert_eq!(Relation::Tab.label(), "Tab navigation");
}

// ============================================================================
// Session id tests
// ============================================================================

#[test]
fn test_session_ids_are_unique() {
    assert_ne!(SessionId::new(), SessionId::new());
}

#[test]
fn test_session_id_parse_round_trip() {
    let id = SessionId::new();
    let parsed: SessionId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert!("not-a-uuid".parse::<SessionId>().is_err());
}

// ============================================================================
// Creator and item tests
// ============================================================================

#[test]
fn test_creator_display_name() {
    assert_eq!(Creator::new("Ada", "Lovelace").display_name(), "Ada Lovelace");
    assert_eq!(Creator::new("", "Plato").display_name(), "Plato");
    assert!(Creator::new(" ", "").is_blank());
}

#[test]
fn test_item_descriptor_builder() {
    let item = ItemDescriptor::new(7, "Attention Is All You Need")
        .with_key("ABCD1234")
        .with_type("journalArticle")
        .with_creator("Ashish", "Vaswani")
        .with_creator("Noam", "Shazeer")
        .with_year("2017")
        .with_tags(["transformers", "nlp"])
        .with_collections([3])
        .with_related(["WXYZ"]);

    assert_eq!(item.id, Some(7));
    assert_eq!(item.key, "ABCD1234");
    assert_eq!(item.creators.len(), 2);
    assert_eq!(item.year.as_deref(), Some("2017"));
    assert_eq!(item.tags, vec!["transformers", "nlp"]);
    assert_eq!(item.collections, vec![3]);
    assert_eq!(item.related_item_keys, vec!["WXYZ"]);
    assert_eq!(item.creator_summary(), "Ashish Vaswani, Noam Shazeer");
}

#[test]
fn test_item_descriptor_trackable() {
    assert!(ItemDescriptor::new(1, "a").with_type("book").is_trackable());
    assert!(!ItemDescriptor::new(1, "a").with_type("note").is_trackable());
    assert!(!ItemDescriptor::new(1, "a").with_type("attachment").is_trackable());
}

#[test]
fn test_item_descriptor_deserialize_defaults() {
    let item: ItemDescriptor = serde_json::from_value(json!({"id": 5})).unwrap();
    assert_eq!(item.id, Some(5));
    assert!(item.title.is_empty());
    assert!(item.creators.is_empty());

    let no_id: ItemDescriptor = serde_json::from_value(json!({"title": "x"})).unwrap();
    assert!(no_id.id.is_none());
}

// ============================================================================
// NodeRecord tests
// ============================================================================

#[test]
fn test_node_record_deserialize_minimal() {
    let session = SessionId::new();
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let value = json!({
        "id": uuid::Uuid::new_v4(),
        "item_id": 42,
        "session_id": session,
        "created_at": ts,
        "last_visit": ts,
    });
    let record: NodeRecord = serde_json::from_value(value).unwrap();
    assert_eq!(record.item_id, 42);
    assert_eq!(record.visit_count, 1);
    assert_eq!(record.relation, Relation::Manual);
    assert!(record.parent_id.is_none());
    assert_eq!(record.session_id, session);
}

#[test]
fn test_node_record_omits_absent_closed_at() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let record = NodeRecord {
        id: uuid::Uuid::new_v4(),
        item_id: 1,
        parent_id: None,
        session_id: SessionId::new(),
        created_at: ts,
        last_visit: ts,
        visit_count: 1,
        relation: Relation::Tag,
        depth: 0,
        title: String::new(),
        creators: String::new(),
        year: String::new(),
        item_type: String::new(),
        item_key: String::new(),
        doi: String::new(),
        tags: vec![],
        notes: String::new(),
        importance: 0,
        closed_at: None,
    };
    let value = serde_json::to_value(&record).unwrap();
    assert!(value.get("closed_at").is_none());
    assert_eq!(value["relation"], json!("tag"));
}
