use anyhow::Result;
use std::process;

use mealbook_core::db::{Database, InsertOutcome};
use mealbook_core::normalize::contains_pattern;
use mealbook_core::params::{IngredientFormError, RawIngredientForm};

use super::helpers::{fail, print_ingredient_table};

pub(crate) fn cmd_ingredient_add(db: &Database, name: &str, json: bool) -> Result<()> {
    let name = RawIngredientForm {
        name: Some(name.to_string()),
    }
    .parse()?;

    match db.insert_ingredient(&name)? {
        InsertOutcome::Created(id) => {
            if json {
                println!("{}", serde_json::json!({ "ingredient_id": id }));
            } else {
                println!("Added ingredient: {name} (id: {id})");
            }
            Ok(())
        }
        InsertOutcome::AlreadyExists => fail(&IngredientFormError::Duplicate.to_string(), json),
    }
}

pub(crate) fn cmd_ingredient_list(db: &Database, search: Option<&str>, json: bool) -> Result<()> {
    let ingredients = match search.filter(|q| !q.is_empty()) {
        Some(q) => db.search_ingredients(&contains_pattern(q))?,
        None => db.list_ingredients()?,
    };

    if ingredients.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No ingredients found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
    } else {
        print_ingredient_table(&ingredients);
    }

    Ok(())
}

pub(crate) fn cmd_ingredient_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if !db.delete_ingredient(id)? {
        fail(&format!("Ingredient {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted ingredient {id} and removed it from every meal");
    }
    Ok(())
}
