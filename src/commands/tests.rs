use super::*;
use crate::config::Config;

const SOUP: &str = r#"{
    "title": "Tomato soup",
    "difficulty": "easy",
    "cooking_time": 30,
    "steps": [
        {"step_number": 1, "blocks": [{"type": "text", "value": "Chop tomatoes"}]}
    ]
}"#;

#[test]
fn parse_single_recipe_object() {
    let recipes = parse_recipes(SOUP).expect("object should parse");

    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0].title, "Tomato soup");
    assert_eq!(recipes[0].id, None);
    assert_eq!(recipes[0].steps.len(), 1);
}

#[test]
fn parse_recipe_array_keeps_order() {
    let content = format!(
        r#"[{}, {{"id": 42, "title": "Salad", "difficulty": "medium"}}]"#,
        SOUP
    );
    let recipes = parse_recipes(&content).expect("array should parse");

    let titles: Vec<&str> = recipes.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Tomato soup", "Salad"]);
    assert_eq!(recipes[1].id, Some(42));
}

#[test]
fn parse_rejects_scalars_and_malformed_entries() {
    assert!(parse_recipes("42").is_err());
    assert!(parse_recipes("not json").is_err());

    let error = parse_recipes(r#"[{"title": "No difficulty"}]"#).expect_err("missing field");
    assert!(
        format!("{:#}", error).contains("position 0"),
        "unexpected error: {:#}",
        error
    );
}

#[test]
fn embed_request_uses_role_prefix() {
    let config = Config::default();
    let texts = vec!["tomato soup".to_string()];

    let passage = embed_request_for(&config, texts.clone(), EmbedRole::Passage);
    assert_eq!(passage.prefix.as_deref(), Some("passage:"));
    assert_eq!(passage.normalize, Some(true));

    let query = embed_request_for(&config, texts.clone(), EmbedRole::Query);
    assert_eq!(query.prefix.as_deref(), Some("query:"));

    let raw = embed_request_for(&config, texts, EmbedRole::Raw);
    assert_eq!(raw.prefix.as_deref(), Some(""));
    assert_eq!(raw.texts, vec!["tomato soup"]);
}

#[test]
fn init_config_writes_defaults_once() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    init_config(dir.path()).expect("init should succeed");
    let written = load_config(dir.path()).expect("config should load");
    assert_eq!(written.search, Config::default().search);

    std::fs::write(
        dir.path().join("config.toml"),
        "[search]\nsimilar_limit = 9\n",
    )
    .expect("Failed to write config");
    init_config(dir.path()).expect("second init should succeed");

    let kept = load_config(dir.path()).expect("config should load");
    assert_eq!(kept.search.similar_limit, 9);
}

#[test]
fn ingest_summary_serializes_failures() {
    let summary = IngestSummary {
        ingested: vec![1, 2],
        failed: vec![IngestFailure {
            position: 2,
            title: String::new(),
            error: "Invalid input: title must not be empty".to_string(),
        }],
    };

    let value = serde_json::to_value(&summary).expect("summary serializes");
    assert_eq!(value["ingested"], serde_json::json!([1, 2]));
    assert_eq!(value["failed"][0]["position"], 2);
}
