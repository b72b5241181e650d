use criterion::{Criterion, criterion_group, criterion_main};
use recipe_search::canonical;
use recipe_search::database::{BlockType, Difficulty, Recipe, RecipeStep, StepBlock};
use recipe_search::lexical;
use std::hint::black_box;

fn recipe(id: i64, title: &str, step_count: i64) -> Recipe {
    Recipe {
        id,
        title: title.to_string(),
        cover_url: Some(format!("https://cdn.example.com/{}.jpg", id)),
        difficulty: Some(Difficulty::Medium),
        cooking_time: Some(45),
        popularity: id % 50,
        steps: (1..=step_count)
            .rev()
            .map(|step_number| RecipeStep {
                id: step_number,
                step_number,
                blocks: (1..=3)
                    .map(|order| StepBlock {
                        id: step_number * 10 + order,
                        order,
                        block_type: BlockType::Text,
                        value: format!("Stir the pot for {} minutes, then season", order * 2),
                        metadata: None,
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let long_recipe = recipe(1, "Slow cooked tomato and basil ragu", 20);
    c.bench_function("canonical_build", |b| {
        b.iter(|| canonical::build(black_box(&long_recipe)));
    });

    let titles = [
        "Tomato soup",
        "Roasted tomato salad",
        "Basil pesto pasta",
        "Chicken curry",
        "Mushroom risotto",
    ];
    let catalog: Vec<Recipe> = (0..500)
        .map(|i| recipe(i, &format!("{} {}", titles[i as usize % titles.len()], i), 0))
        .collect();
    c.bench_function("rank_titles", |b| {
        b.iter(|| {
            lexical::rank_titles(
                black_box("tomato soup"),
                catalog.clone(),
                lexical::DEFAULT_THRESHOLD,
                10,
            )
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
