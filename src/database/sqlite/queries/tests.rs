use super::*;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::query(include_str!("../migrations/001_recipes.sql"))
        .execute(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

fn text_block(value: &str) -> NewStepBlock {
    NewStepBlock {
        block_type: BlockType::Text,
        value: value.to_string(),
        metadata: None,
    }
}

fn new_recipe(title: &str, popularity: i64) -> NewRecipe {
    NewRecipe {
        id: None,
        title: title.to_string(),
        cover_url: Some("https://img.example.com/cover.jpg".to_string()),
        difficulty: Difficulty::Medium,
        cooking_time: Some(45),
        popularity: Some(popularity),
        steps: Vec::new(),
    }
}

#[tokio::test]
async fn recipe_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;

    let mut payload = new_recipe("Shakshuka", 10);
    payload.steps = vec![
        NewRecipeStep {
            step_number: 1,
            blocks: vec![text_block("Fry onions"), text_block("Add peppers")],
        },
        NewRecipeStep {
            step_number: 2,
            blocks: vec![NewStepBlock {
                block_type: BlockType::Image,
                value: "pan.jpg".to_string(),
                metadata: Some(serde_json::json!({"alt": "pan"})),
            }],
        },
    ];

    let created = RecipeQueries::create(&pool, &payload)
        .await
        .expect("Failed to create recipe");

    assert_eq!(created.title, "Shakshuka");
    assert_eq!(created.difficulty, Some(Difficulty::Medium));
    assert_eq!(created.popularity, 10);
    assert_eq!(created.steps.len(), 2);
    assert_eq!(created.steps[0].blocks.len(), 2);
    assert_eq!(created.steps[0].blocks[0].order, 1);
    assert_eq!(created.steps[0].blocks[1].order, 2);
    assert_eq!(created.steps[0].blocks[1].value, "Add peppers");
    assert_eq!(
        created.steps[1].blocks[0].metadata,
        Some(serde_json::json!({"alt": "pan"}))
    );

    let summary = RecipeQueries::get_summary(&pool, created.id)
        .await
        .expect("Failed to get summary")
        .expect("Recipe should exist");
    assert!(summary.steps.is_empty());

    let missing = RecipeQueries::get_by_id(&pool, created.id + 100)
        .await
        .expect("Failed to query missing recipe");
    assert!(missing.is_none());
}

#[tokio::test]
async fn steps_are_returned_in_step_number_order() {
    let (_temp_dir, pool) = create_test_pool().await;

    let mut payload = new_recipe("Ragu", 1);
    payload.steps = vec![
        NewRecipeStep {
            step_number: 3,
            blocks: vec![text_block("Simmer")],
        },
        NewRecipeStep {
            step_number: 1,
            blocks: vec![text_block("Chop")],
        },
        NewRecipeStep {
            step_number: 2,
            blocks: vec![text_block("Brown")],
        },
        NewRecipeStep {
            step_number: 2,
            blocks: vec![text_block("Deglaze")],
        },
    ];

    let created = RecipeQueries::create(&pool, &payload)
        .await
        .expect("Failed to create recipe");

    let order: Vec<(i64, &str)> = created
        .steps
        .iter()
        .map(|step| (step.step_number, step.blocks[0].value.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![(1, "Chop"), (2, "Brown"), (2, "Deglaze"), (3, "Simmer")]
    );
}

#[tokio::test]
async fn step_without_blocks_is_kept() {
    let (_temp_dir, pool) = create_test_pool().await;

    let mut payload = new_recipe("Water", 0);
    payload.steps = vec![NewRecipeStep {
        step_number: 1,
        blocks: Vec::new(),
    }];

    let created = RecipeQueries::create(&pool, &payload)
        .await
        .expect("Failed to create recipe");
    assert_eq!(created.steps.len(), 1);
    assert!(created.steps[0].blocks.is_empty());
}

#[tokio::test]
async fn upsert_replaces_row_and_steps() {
    let (_temp_dir, pool) = create_test_pool().await;

    let mut payload = new_recipe("Old title", 1);
    payload.steps = vec![NewRecipeStep {
        step_number: 1,
        blocks: vec![text_block("old step")],
    }];
    let created = RecipeQueries::create(&pool, &payload)
        .await
        .expect("Failed to create recipe");

    let mut replacement = new_recipe("New title", 2);
    replacement.id = Some(created.id);
    replacement.steps = vec![NewRecipeStep {
        step_number: 1,
        blocks: vec![text_block("new step")],
    }];
    let updated = RecipeQueries::create(&pool, &replacement)
        .await
        .expect("Failed to upsert recipe");

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.title, "New title");
    assert_eq!(updated.steps.len(), 1);
    assert_eq!(updated.steps[0].blocks[0].value, "new step");

    assert_eq!(RecipeQueries::count(&pool).await.expect("count"), 1);
    let step_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipe_steps")
        .fetch_one(&pool)
        .await
        .expect("count steps");
    assert_eq!(step_rows, 1);
}

#[tokio::test]
async fn failed_block_insert_rolls_back_everything() {
    let (_temp_dir, pool) = create_test_pool().await;

    sqlx::query(
        r#"
        CREATE TRIGGER reject_block BEFORE INSERT ON recipe_step_blocks
        WHEN NEW.value = 'explode'
        BEGIN
            SELECT RAISE(ABORT, 'block rejected');
        END;
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create trigger");

    let mut payload = new_recipe("Doomed", 1);
    payload.steps = vec![
        NewRecipeStep {
            step_number: 1,
            blocks: vec![text_block("fine")],
        },
        NewRecipeStep {
            step_number: 2,
            blocks: vec![text_block("explode")],
        },
    ];

    let result = RecipeQueries::create(&pool, &payload).await;
    assert!(result.is_err());

    for table in ["recipes", "recipe_steps", "recipe_step_blocks"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&pool)
            .await
            .expect("count rows");
        assert_eq!(count, 0, "{} should be empty after rollback", table);
    }
}

#[tokio::test]
async fn bulk_fetch_returns_only_existing_ids() {
    let (_temp_dir, pool) = create_test_pool().await;

    let first = RecipeQueries::create(&pool, &new_recipe("First", 1))
        .await
        .expect("create");
    let second = RecipeQueries::create(&pool, &new_recipe("Second", 2))
        .await
        .expect("create");

    let mut fetched = RecipeQueries::get_by_ids(&pool, &[second.id, 999, first.id])
        .await
        .expect("bulk fetch");
    fetched.sort_by_key(|recipe| recipe.id);

    let ids: Vec<i64> = fetched.iter().map(|recipe| recipe.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let empty = RecipeQueries::get_by_ids(&pool, &[])
        .await
        .expect("empty fetch");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn list_orders_by_popularity_then_id() {
    let (_temp_dir, pool) = create_test_pool().await;

    let low = RecipeQueries::create(&pool, &new_recipe("Low", 1))
        .await
        .expect("create");
    let high = RecipeQueries::create(&pool, &new_recipe("High", 9))
        .await
        .expect("create");
    let tie = RecipeQueries::create(&pool, &new_recipe("Tie", 1))
        .await
        .expect("create");

    let listed = RecipeQueries::list(&pool, 10, 0).await.expect("list");
    let ids: Vec<i64> = listed.iter().map(|recipe| recipe.id).collect();
    assert_eq!(ids, vec![high.id, low.id, tie.id]);

    let page = RecipeQueries::list(&pool, 1, 1).await.expect("list page");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, low.id);
}

#[tokio::test]
async fn title_search_is_case_insensitive() {
    let (_temp_dir, pool) = create_test_pool().await;

    RecipeQueries::create(&pool, &new_recipe("Chocolate Cake", 5))
        .await
        .expect("create");
    RecipeQueries::create(&pool, &new_recipe("Carrot cake", 8))
        .await
        .expect("create");
    RecipeQueries::create(&pool, &new_recipe("Pasta", 9))
        .await
        .expect("create");

    let found = RecipeQueries::search_titles(&pool, "CAKE", 10)
        .await
        .expect("search");
    let titles: Vec<&str> = found.iter().map(|recipe| recipe.title.as_str()).collect();
    assert_eq!(titles, vec!["Carrot cake", "Chocolate Cake"]);
}
