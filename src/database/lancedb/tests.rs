use super::*;

#[test]
fn hit_parses_recipe_id() {
    let hit = IndexHit {
        id: "42".to_string(),
        score: 0.9,
        distance: 0.1,
    };
    assert_eq!(hit.recipe_id(), Some(42));
}

#[test]
fn hit_with_malformed_id_yields_none() {
    for id in ["", "abc", "4.2", "recipe-7"] {
        let hit = IndexHit {
            id: id.to_string(),
            score: 0.5,
            distance: 0.5,
        };
        assert_eq!(hit.recipe_id(), None, "{:?} should not parse", id);
    }
}

#[test]
fn collection_info_serialization() {
    let info = CollectionInfo {
        name: "recipes".to_string(),
        rows: 3,
        dimension: Some(384),
    };

    let json = serde_json::to_value(&info).expect("can serialize json");
    assert_eq!(
        json,
        serde_json::json!({"name": "recipes", "rows": 3, "dimension": 384})
    );
}
