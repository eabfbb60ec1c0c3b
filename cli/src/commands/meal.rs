use anyhow::Result;
use clap::Args;

use mealbook_core::db::{Database, InsertOutcome};
use mealbook_core::models::Meal;
use mealbook_core::params::{MealFormError, MealQueryError, RawMealForm, RawMealQuery};

use super::helpers::{fail, print_meal_detail, print_meal_table};

/// Fields of a new meal. Values are validated exactly like the API's form fields.
#[derive(Args)]
pub(crate) struct MealAddArgs {
    /// Meal title (must be unique)
    title: String,
    /// Free-text description
    #[arg(short, long)]
    description: Option<String>,
    /// Course: 0 before, 1 main (default), 2 dessert
    #[arg(long, allow_negative_numbers = true)]
    entry: Option<String>,
    /// Time of day: -1 any (default), 0 lunch, 1 dinner
    #[arg(long, allow_negative_numbers = true)]
    time: Option<String>,
    /// Season: -1 any (default), 0 spring, 1 summer, 2 autumn, 3 winter
    #[arg(long, allow_negative_numbers = true)]
    season: Option<String>,
    /// Preparation time in minutes
    #[arg(long, allow_negative_numbers = true)]
    prep: Option<String>,
    /// Cooking time in minutes
    #[arg(long, allow_negative_numbers = true)]
    cook: Option<String>,
    /// Ingredient ids as a JSON array, e.g. '[1, 4]'
    #[arg(long)]
    ingredients: Option<String>,
}

impl From<MealAddArgs> for RawMealForm {
    fn from(args: MealAddArgs) -> Self {
        RawMealForm {
            title: Some(args.title),
            description: args.description,
            meal_entry: args.entry,
            meal_time: args.time,
            season: args.season,
            preparation_time: args.prep,
            cook_time: args.cook,
            ingredients: args.ingredients,
        }
    }
}

/// Meal search filters, validated like the API's query parameters.
/// A time cap of 0 means no cap.
#[derive(Args)]
pub(crate) struct MealFilterArgs {
    /// Words that must appear in the title, in order
    #[arg(long)]
    title: Option<String>,
    /// Course: 0 before, 1 main, 2 dessert
    #[arg(long, allow_negative_numbers = true)]
    entry: Option<String>,
    /// Time of day: -1 any, 0 lunch, 1 dinner
    #[arg(long, allow_negative_numbers = true)]
    time: Option<String>,
    /// Season: -1 any, 0 spring, 1 summer, 2 autumn, 3 winter
    #[arg(long, allow_negative_numbers = true)]
    season: Option<String>,
    /// Maximum preparation time in minutes
    #[arg(long, allow_negative_numbers = true)]
    prep_max: Option<String>,
    /// Maximum cooking time in minutes
    #[arg(long, allow_negative_numbers = true)]
    cook_max: Option<String>,
    /// Maximum preparation plus cooking time in minutes
    #[arg(long, allow_negative_numbers = true)]
    total_max: Option<String>,
    /// Ingredient ids that must all be present, as a JSON array
    #[arg(long)]
    ingredients: Option<String>,
}

impl MealFilterArgs {
    fn into_query(self, mode: &str) -> RawMealQuery {
        RawMealQuery {
            mode: Some(mode.to_string()),
            title: self.title,
            meal_entry: self.entry,
            meal_time: self.time,
            season: self.season,
            preparation_time_max: self.prep_max,
            cook_time_max: self.cook_max,
            total_time_max: self.total_max,
            ingredients: self.ingredients,
        }
    }
}

pub(crate) fn cmd_meal_add(db: &Database, args: MealAddArgs, json: bool) -> Result<()> {
    let meal = RawMealForm::from(args).parse()?;

    match db.insert_meal(&meal)? {
        InsertOutcome::Created(id) => {
            if json {
                println!("{}", serde_json::json!({ "meal_id": id }));
            } else {
                let title = &meal.title;
                println!("Added meal: {title} (id: {id})");
            }
            Ok(())
        }
        InsertOutcome::AlreadyExists => {
            fail(&MealFormError::DuplicateTitle.to_string(), json)
        }
    }
}

pub(crate) fn cmd_meal_list(db: &Database, filter: MealFilterArgs, json: bool) -> Result<()> {
    let (_, filter) = filter.into_query("search").parse()?;
    let meals = db.search_meals(&filter)?;

    if meals.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No meals found");
        }
        std::process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else {
        print_meal_table(&meals);
    }

    Ok(())
}

pub(crate) fn cmd_meal_random(db: &Database, filter: MealFilterArgs, json: bool) -> Result<()> {
    let (_, filter) = filter.into_query("random").parse()?;

    let Some(meal) = db.random_meal(&filter, &mut rand::rng())? else {
        fail(&MealQueryError::NoMatch.to_string(), json);
    };
    show(db, &meal, json)
}

pub(crate) fn cmd_meal_show(db: &Database, id: i64, json: bool) -> Result<()> {
    let Some(meal) = db.get_meal(id)? else {
        fail(&format!("Meal {id} not found"), json);
    };
    show(db, &meal, json)
}

fn show(db: &Database, meal: &Meal, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(meal)?);
    } else {
        let ingredients = db.get_ingredients_by_ids(&meal.ingredients)?;
        print_meal_detail(meal, &ingredients);
    }
    Ok(())
}

pub(crate) fn cmd_meal_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if !db.delete_meal(id)? {
        fail(&format!("Meal {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted meal {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealbook_core::models::{MealEntry, MealTime, Season};

    #[test]
    fn test_add_args_validate_like_form() {
        let args = MealAddArgs {
            title: " Soupe à l'oignon ".to_string(),
            description: None,
            entry: Some("0".to_string()),
            time: Some("1".to_string()),
            season: Some("3".to_string()),
            prep: Some("15".to_string()),
            cook: None,
            ingredients: Some("[2, \"5\"]".to_string()),
        };

        let meal = RawMealForm::from(args).parse().unwrap();
        assert_eq!(meal.title, "Soupe a l'oignon");
        assert_eq!(meal.meal_entry, MealEntry::Before);
        assert_eq!(meal.meal_time, MealTime::Dinner);
        assert_eq!(meal.season, Season::Winter);
        assert_eq!(meal.preparation_time, Some(15));
        assert_eq!(meal.cook_time, None);
        assert_eq!(meal.ingredients, vec![2, 5]);
    }

    #[test]
    fn test_add_args_reject_negative_prep() {
        let args = MealAddArgs {
            title: "Toast".to_string(),
            description: None,
            entry: None,
            time: None,
            season: None,
            prep: Some("-5".to_string()),
            cook: None,
            ingredients: None,
        };
        assert_eq!(
            RawMealForm::from(args).parse(),
            Err(MealFormError::PreparationTime)
        );
    }

    #[test]
    fn test_filter_args_zero_cap_ignored() {
        let args = MealFilterArgs {
            title: Some("soup".to_string()),
            entry: Some("0".to_string()),
            time: None,
            season: None,
            prep_max: Some("0".to_string()),
            cook_max: None,
            total_max: Some("45".to_string()),
            ingredients: None,
        };

        let (_, filter) = args.into_query("random").parse().unwrap();
        assert_eq!(filter.meal_entry, Some(MealEntry::Before));
        assert_eq!(filter.preparation_time_max, None);
        assert_eq!(filter.total_time_max, Some(45));
    }
}
