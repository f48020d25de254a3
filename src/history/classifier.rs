use super::{ItemDescriptor, Relation};

/// Classify how `to` relates to the previously viewed `from`.
///
/// Checks run in priority order and the first match wins: shared author,
/// shared tag, shared collection, then `from` listing `to` as related.
/// Two items with nothing in common are [`Relation::Temporal`]. A missing
/// or id-less descriptor on either side yields [`Relation::Manual`].
///
/// [`Relation::Citation`] is never inferred; hosts pass it explicitly.
pub fn classify(from: Option<&ItemDescriptor>, to: Option<&ItemDescriptor>) -> Relation {
    let (Some(from), Some(to)) = (from, to) else {
        return Relation::Manual;
    };
    if from.id.is_none() || to.id.is_none() {
        return Relation::Manual;
    }

    if shares_author(from, to) {
        Relation::Author
    } else if from.tags.iter().any(|tag| to.tags.contains(tag)) {
        Relation::Tag
    } else if from.collections.iter().any(|c| to.collections.contains(c)) {
        Relation::Collection
    } else if !to.key.is_empty() && from.related_item_keys.contains(&to.key) {
        Relation::Related
    } else {
        Relation::Temporal
    }
}

fn shares_author(from: &ItemDescriptor, to: &ItemDescriptor) -> bool {
    from.creators
        .iter()
        .filter(|c| !c.is_blank())
        .any(|a| {
            to.creators
                .iter()
                .any(|b| a.first_name == b.first_name && a.last_name == b.last_name)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64) -> ItemDescriptor {
        ItemDescriptor::new(id, format!("Item {}", id)).with_key(format!("KEY{}", id))
    }

    #[test]
    fn test_shared_author() {
        let a = item(1).with_creator("Marie", "Curie");
        let b = item(2).with_creator("Pierre", "Curie").with_creator("Marie", "Curie");
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Author);
    }

    #[test]
    fn test_author_requires_both_names() {
        let a = item(1).with_creator("Marie", "Curie");
        let b = item(2).with_creator("Pierre", "Curie");
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Temporal);
    }

    #[test]
    fn test_blank_creators_do_not_match() {
        let a = item(1).with_creator("", "");
        let b = item(2).with_creator("", "");
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Temporal);
    }

    #[test]
    fn test_author_beats_tag_and_collection() {
        let a = item(1)
            .with_creator("Alan", "Turing")
            .with_tags(["computability"])
            .with_collections([9]);
        let b = item(2)
            .with_creator("Alan", "Turing")
            .with_tags(["computability"])
            .with_collections([9]);
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Author);
    }

    #[test]
    fn test_tag_beats_collection() {
        let a = item(1).with_tags(["ml"]).with_collections([4]);
        let b = item(2).with_tags(["ml", "vision"]).with_collections([4]);
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Tag);
    }

    #[test]
    fn test_collection() {
        let a = item(1).with_collections([1, 2]);
        let b = item(2).with_collections([2, 3]);
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Collection);
    }

    #[test]
    fn test_related_is_directional() {
        let a = item(1).with_related(["KEY2"]);
        let b = item(2);
        assert_eq!(classify(Some(&a), Some(&b)), Relation::Related);
        assert_eq!(classify(Some(&b), Some(&a)), Relation::Temporal);
    }

    #[test]
    fn test_nothing_in_common_is_temporal() {
        assert_eq!(classify(Some(&item(1)), Some(&item(2))), Relation::Temporal);
    }

    #[test]
    fn test_missing_side_is_manual() {
        assert_eq!(classify(None, Some(&item(2))), Relation::Manual);
        assert_eq!(classify(Some(&item(1)), None), Relation::Manual);

        let no_id = ItemDescriptor {
            id: None,
            ..item(3)
        };
        assert_eq!(classify(Some(&no_id), Some(&item(2))), Relation::Manual);
    }

    #[test]
    fn test_never_infers_citation() {
        let a = item(1).with_related(["KEY2"]).with_tags(["x"]);
        let b = item(2).with_tags(["x"]);
        assert_ne!(classify(Some(&a), Some(&b)), Relation::Citation);
    }
}
