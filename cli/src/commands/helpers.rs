use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealbook_core::models::{Ingredient, Meal};

#[derive(Tabled)]
struct MealRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Course")]
    course: &'static str,
    #[tabled(rename = "Time")]
    time: &'static str,
    #[tabled(rename = "Season")]
    season: &'static str,
    #[tabled(rename = "Prep")]
    prep: String,
    #[tabled(rename = "Cook")]
    cook: String,
    #[tabled(rename = "Ingredients")]
    ingredients: usize,
}

fn meal_rows(meals: &[Meal]) -> Vec<MealRow> {
    meals
        .iter()
        .map(|m| MealRow {
            id: m.id,
            title: truncate(&m.title, 40),
            course: m.meal_entry.label(),
            time: m.meal_time.label(),
            season: m.season.label(),
            prep: format_minutes(m.preparation_time),
            cook: format_minutes(m.cook_time),
            ingredients: m.ingredients.len(),
        })
        .collect()
}

pub(crate) fn print_meal_table(meals: &[Meal]) {
    let table = Table::new(meal_rows(meals))
        .with(Style::rounded())
        .with(Modify::new(Columns::new(5..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Full view of one meal. `ingredients` are the rows its ids resolved to.
pub(crate) fn print_meal_detail(meal: &Meal, ingredients: &[Ingredient]) {
    println!("{} (id: {})", meal.title, meal.id);
    if !meal.description.is_empty() {
        println!("\n{}\n", meal.description);
    }
    println!("  Course:  {}", meal.meal_entry.label());
    println!("  Time:    {}", meal.meal_time.label());
    println!("  Season:  {}", meal.season.label());
    println!(
        "  Prep:    {}   Cook: {}   Total: {} min",
        format_minutes(meal.preparation_time),
        format_minutes(meal.cook_time),
        meal.total_time()
    );

    if meal.ingredients.is_empty() {
        println!("  No ingredients");
        return;
    }
    println!("  Ingredients:");
    for id in &meal.ingredients {
        match ingredients.iter().find(|i| i.id == *id) {
            Some(ingredient) => println!("    - {}", ingredient.name),
            None => println!("    - #{id} (deleted)"),
        }
    }
}

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 50),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report an expected failure (not found, duplicate, no match) and exit with status 2.
pub(crate) fn fail(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn format_minutes(minutes: Option<i64>) -> String {
    minutes.map_or_else(|| "-".to_string(), |m| format!("{m} min"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
