use super::*;

fn valid_recipe() -> NewRecipe {
    NewRecipe {
        id: None,
        title: "Pancakes".to_string(),
        cover_url: None,
        difficulty: Difficulty::Easy,
        cooking_time: Some(20),
        popularity: Some(3),
        steps: vec![NewRecipeStep {
            step_number: 1,
            blocks: vec![NewStepBlock {
                block_type: BlockType::Text,
                value: "Whisk eggs and milk".to_string(),
                metadata: None,
            }],
        }],
    }
}

#[test]
fn difficulty_display() {
    assert_eq!(Difficulty::Easy.to_string(), "easy");
    assert_eq!(Difficulty::Medium.to_string(), "medium");
    assert_eq!(Difficulty::Hard.to_string(), "hard");
    assert_eq!(BlockType::Image.to_string(), "image");
}

#[test]
fn payload_deserializes_with_defaults() {
    let payload: NewRecipe = serde_json::from_str(
        r#"{
            "title": "Borscht",
            "difficulty": "medium",
            "steps": [
                {"step_number": 1, "blocks": [{"type": "text", "value": "Boil beets"}]},
                {"step_number": 2, "blocks": [{"type": "image", "value": "beets.png", "metadata": {"w": 640}}]}
            ]
        }"#,
    )
    .expect("should parse payload");

    assert_eq!(payload.id, None);
    assert_eq!(payload.cover_url, None);
    assert_eq!(payload.popularity, None);
    assert_eq!(payload.steps.len(), 2);
    assert_eq!(payload.steps[1].blocks[0].block_type, BlockType::Image);
    assert_eq!(
        payload.steps[1].blocks[0].metadata,
        Some(serde_json::json!({"w": 640}))
    );
}

#[test]
fn payload_rejects_unknown_difficulty() {
    let result: std::result::Result<NewRecipe, _> =
        serde_json::from_str(r#"{"title": "Soup", "difficulty": "extreme"}"#);
    assert!(result.is_err());
}

#[test]
fn validation_accepts_valid_payload() {
    assert!(valid_recipe().validate().is_ok());
}

#[test]
fn validation_rejects_bad_fields() {
    let mut blank_title = valid_recipe();
    blank_title.title = "   ".to_string();
    assert!(matches!(
        blank_title.validate(),
        Err(RecipeError::InputValidation(_))
    ));

    let mut negative_time = valid_recipe();
    negative_time.cooking_time = Some(-1);
    assert!(negative_time.validate().is_err());

    let mut negative_popularity = valid_recipe();
    negative_popularity.popularity = Some(-5);
    assert!(negative_popularity.validate().is_err());

    let mut zero_step = valid_recipe();
    zero_step.steps[0].step_number = 0;
    assert!(zero_step.validate().is_err());

    let mut zero_id = valid_recipe();
    zero_id.id = Some(0);
    assert!(zero_id.validate().is_err());
}

#[test]
fn recipe_serialization_omits_empty_steps() {
    let recipe = Recipe {
        id: 7,
        title: "Toast".to_string(),
        cover_url: None,
        difficulty: Some(Difficulty::Easy),
        cooking_time: None,
        popularity: 0,
        steps: Vec::new(),
    };

    let value = serde_json::to_value(&recipe).expect("should serialize");
    assert!(value.get("steps").is_none());
    assert_eq!(value["difficulty"], "easy");
}
