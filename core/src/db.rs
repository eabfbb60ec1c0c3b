use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use rand::seq::IndexedRandom;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::models::{Ingredient, Meal, NewMeal};
use crate::params::MealFilter;

const MEAL_COLUMNS: &str =
    "id, title, description, meal_entry, meal_time, season, preparation_time, cook_time";

/// Result of an insert guarded by a uniqueness pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(i64),
    AlreadyExists,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            // IF NOT EXISTS keeps databases created before versioning usable.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL UNIQUE,
                    description TEXT NOT NULL DEFAULT '',
                    meal_entry INTEGER NOT NULL DEFAULT 1,
                    meal_time INTEGER NOT NULL DEFAULT -1,
                    season INTEGER NOT NULL DEFAULT -1,
                    preparation_time INTEGER,
                    cook_time INTEGER
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS meal_ingredients (
                    meal_id INTEGER NOT NULL,
                    ingredient_id INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meal_ingredients_meal ON meal_ingredients(meal_id);
                CREATE INDEX IF NOT EXISTS idx_meal_ingredients_ingredient ON meal_ingredients(ingredient_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects MEAL_COLUMNS order. Ingredients are filled in separately.
    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            meal_entry: row.get(3)?,
            meal_time: row.get(4)?,
            season: row.get(5)?,
            preparation_time: row.get(6)?,
            cook_time: row.get(7)?,
            ingredients: Vec::new(),
        })
    }

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }

    fn meal_ingredient_ids(&self, meal_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT ingredient_id FROM meal_ingredients WHERE meal_id = ?1 ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map(params![meal_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn with_ingredients(&self, mut meal: Meal) -> Result<Meal> {
        meal.ingredients = self.meal_ingredient_ids(meal.id)?;
        Ok(meal)
    }

    // --- Meals ---

    /// Insert a meal and its ingredient links, unless the title is taken.
    ///
    /// Referenced ingredient ids are linked as given; they are not required to
    /// exist.
    pub fn insert_meal(&self, meal: &NewMeal) -> Result<InsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM meals WHERE title = ?1",
                params![meal.title],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(InsertOutcome::AlreadyExists);
        }

        tx.execute(
            "INSERT INTO meals (title, description, meal_entry, meal_time, season, preparation_time, cook_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                meal.title,
                meal.description,
                meal.meal_entry,
                meal.meal_time,
                meal.season,
                meal.preparation_time,
                meal.cook_time,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO meal_ingredients (meal_id, ingredient_id) VALUES (?1, ?2)",
            )?;
            for ingredient_id in &meal.ingredients {
                stmt.execute(params![id, ingredient_id])?;
            }
        }

        tx.commit().context("failed to commit meal insert")?;
        Ok(InsertOutcome::Created(id))
    }

    pub fn get_meal(&self, id: i64) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![id],
                Self::meal_from_row,
            )
            .optional()?;
        meal.map(|m| self.with_ingredients(m)).transpose()
    }

    /// All meals matching the filter, in storage order.
    pub fn search_meals(&self, filter: &MealFilter) -> Result<Vec<Meal>> {
        let clause = filter.where_clause();
        let sql = format!("SELECT {MEAL_COLUMNS} FROM meals{} ORDER BY id", clause.sql);
        let mut stmt = self.conn.prepare(&sql)?;
        let meals = stmt
            .query_map(params_from_iter(clause.args.iter()), Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        meals
            .into_iter()
            .map(|m| self.with_ingredients(m))
            .collect()
    }

    /// One meal drawn uniformly from the filtered set; `None` if nothing matches.
    pub fn random_meal<R: Rng + ?Sized>(
        &self,
        filter: &MealFilter,
        rng: &mut R,
    ) -> Result<Option<Meal>> {
        let meals = self.search_meals(filter)?;
        Ok(meals.choose(rng).cloned())
    }

    /// Delete a meal and its ingredient links. Returns whether the meal existed.
    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM meal_ingredients WHERE meal_id = ?1",
            params![id],
        )?;
        tx.commit().context("failed to commit meal delete")?;
        Ok(rows > 0)
    }

    // --- Ingredients ---

    /// Insert an already-normalized ingredient name, unless it exists.
    pub fn insert_ingredient(&self, name: &str) -> Result<InsertOutcome> {
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM ingredients WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(InsertOutcome::AlreadyExists);
        }

        tx.execute("INSERT INTO ingredients (name) VALUES (?1)", params![name])?;
        let id = tx.last_insert_rowid();
        tx.commit().context("failed to commit ingredient insert")?;
        Ok(InsertOutcome::Created(id))
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                "SELECT id, name FROM ingredients WHERE id = ?1",
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    /// Ingredients whose name matches a `LIKE` pattern (escaped with `\`).
    pub fn search_ingredients(&self, pattern: &str) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name FROM ingredients WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id",
        )?;
        let ingredients = stmt
            .query_map(params![pattern], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM ingredients ORDER BY id")?;
        let ingredients = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Ingredients for the given ids; unknown ids are skipped.
    pub fn get_ingredients_by_ids(&self, ids: &[i64]) -> Result<Vec<Ingredient>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, name FROM ingredients WHERE id IN ({placeholders}) ORDER BY id"
        ))?;
        let ingredients = stmt
            .query_map(params_from_iter(ids.iter()), Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Delete an ingredient and every meal link pointing at it.
    /// Returns whether the ingredient existed.
    pub fn delete_ingredient(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM meal_ingredients WHERE ingredient_id = ?1",
            params![id],
        )?;
        tx.commit().context("failed to commit ingredient delete")?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealEntry, MealTime, Season};
    use crate::params::{RawIngredientForm, RawMealForm};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn new_meal(title: &str) -> NewMeal {
        NewMeal {
            title: title.to_string(),
            description: String::new(),
            meal_entry: MealEntry::Main,
            meal_time: MealTime::Any,
            season: Season::Any,
            preparation_time: None,
            cook_time: None,
            ingredients: vec![],
        }
    }

    fn created(outcome: InsertOutcome) -> i64 {
        match outcome {
            InsertOutcome::Created(id) => id,
            InsertOutcome::AlreadyExists => panic!("expected a new row"),
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_and_get_meal() {
        let db = Database::open_in_memory().unwrap();
        let raw = RawMealForm {
            title: Some("Bœuf bourguignon".to_string()),
            description: Some("Mijoté très longtemps".to_string()),
            meal_entry: Some("1".to_string()),
            meal_time: Some("1".to_string()),
            season: Some("3".to_string()),
            preparation_time: Some("30".to_string()),
            cook_time: Some("180".to_string()),
            ingredients: Some("[2, 1]".to_string()),
        };
        let new = raw.parse().unwrap();
        let id = created(db.insert_meal(&new).unwrap());

        let meal = db.get_meal(id).unwrap().unwrap();
        assert_eq!(meal.id, id);
        assert_eq!(meal.title, "Boeuf bourguignon");
        assert_eq!(meal.description, "Mijote tres longtemps");
        assert_eq!(meal.meal_entry, MealEntry::Main);
        assert_eq!(meal.meal_time, MealTime::Dinner);
        assert_eq!(meal.season, Season::Winter);
        assert_eq!(meal.preparation_time, Some(30));
        assert_eq!(meal.cook_time, Some(180));
        assert_eq!(meal.ingredients, vec![2, 1]);
    }

    #[test]
    fn test_get_meal_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_meal(42).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_title_rejected() {
        let db = Database::open_in_memory().unwrap();
        let first = RawMealForm {
            title: Some("Pâtes".to_string()),
            ..RawMealForm::default()
        };
        let second = RawMealForm {
            title: Some("Pates".to_string()),
            ingredients: Some("[1]".to_string()),
            ..RawMealForm::default()
        };
        created(db.insert_meal(&first.parse().unwrap()).unwrap());
        assert_eq!(
            db.insert_meal(&second.parse().unwrap()).unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(count(&db, "meals"), 1);
        assert_eq!(count(&db, "meal_ingredients"), 0);
    }

    #[test]
    fn test_title_uniqueness_is_case_sensitive() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_meal(&new_meal("Pizza")).unwrap());
        created(db.insert_meal(&new_meal("pizza")).unwrap());
        assert_eq!(count(&db, "meals"), 2);
    }

    #[test]
    fn test_delete_meal_removes_links() {
        let db = Database::open_in_memory().unwrap();
        let mut meal = new_meal("Salade");
        meal.ingredients = vec![1, 2, 2];
        let id = created(db.insert_meal(&meal).unwrap());
        let other = created(db.insert_meal(&NewMeal {
            ingredients: vec![1],
            ..new_meal("Soupe")
        })
        .unwrap());

        assert!(db.delete_meal(id).unwrap());
        assert!(db.get_meal(id).unwrap().is_none());
        assert_eq!(count(&db, "meal_ingredients"), 1);
        assert_eq!(db.get_meal(other).unwrap().unwrap().ingredients, vec![1]);
    }

    #[test]
    fn test_delete_missing_meal_is_noop() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_meal(&new_meal("Gratin")).unwrap());
        assert!(!db.delete_meal(999).unwrap());
        assert_eq!(count(&db, "meals"), 1);
    }

    #[test]
    fn test_search_unfiltered_in_storage_order() {
        let db = Database::open_in_memory().unwrap();
        for title in ["C", "A", "B"] {
            created(db.insert_meal(&new_meal(title)).unwrap());
        }
        let titles: Vec<String> = db
            .search_meals(&MealFilter::default())
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_search_meal_entry_partitions() {
        let db = Database::open_in_memory().unwrap();
        let entries = [
            MealEntry::Before,
            MealEntry::Main,
            MealEntry::Dessert,
            MealEntry::Main,
            MealEntry::Dessert,
        ];
        for (i, entry) in entries.iter().enumerate() {
            created(db.insert_meal(&NewMeal {
                meal_entry: *entry,
                ..new_meal(&format!("meal {i}"))
            })
            .unwrap());
        }

        let all = db.search_meals(&MealFilter::default()).unwrap();
        let mut seen: Vec<i64> = Vec::new();
        for entry in MealEntry::ALL {
            let part = db
                .search_meals(&MealFilter {
                    meal_entry: Some(entry),
                    ..MealFilter::default()
                })
                .unwrap();
            assert!(part.iter().all(|m| m.meal_entry == entry));
            seen.extend(part.iter().map(|m| m.id));
        }
        seen.sort_unstable();
        let mut all_ids: Vec<i64> = all.iter().map(|m| m.id).collect();
        all_ids.sort_unstable();
        assert_eq!(seen, all_ids);
    }

    #[test]
    fn test_search_total_time_max() {
        let db = Database::open_in_memory().unwrap();
        let times = [
            (Some(10), Some(20)),
            (Some(40), None),
            (None, Some(25)),
            (None, None),
            (Some(30), Some(31)),
        ];
        for (i, (prep, cook)) in times.iter().enumerate() {
            created(db.insert_meal(&NewMeal {
                preparation_time: *prep,
                cook_time: *cook,
                ..new_meal(&format!("meal {i}"))
            })
            .unwrap());
        }

        let filter = MealFilter {
            total_time_max: Some(30),
            ..MealFilter::default()
        };
        let found = db.search_meals(&filter).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|m| m.total_time() <= 30));
    }

    #[test]
    fn test_search_time_caps_skip_unknown_times() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_meal(&NewMeal {
            preparation_time: Some(5),
            ..new_meal("quick")
        })
        .unwrap());
        created(db.insert_meal(&new_meal("unknown")).unwrap());

        let found = db
            .search_meals(&MealFilter {
                preparation_time_max: Some(10),
                ..MealFilter::default()
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "quick");
    }

    #[test]
    fn test_search_by_title_tokens() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_meal(&new_meal("Gratin dauphinois")).unwrap());
        created(db.insert_meal(&new_meal("Gratin de courgettes")).unwrap());
        created(db.insert_meal(&new_meal("Tarte tatin")).unwrap());

        let search = |q: &str| {
            db.search_meals(&MealFilter {
                title: Some(q.to_string()),
                ..MealFilter::default()
            })
            .unwrap()
            .len()
        };
        assert_eq!(search("gratin"), 2);
        assert_eq!(search("GRATIN dauph"), 1);
        assert_eq!(search("dauphinois gratin"), 0);
        assert_eq!(search("târte"), 1);
        assert_eq!(search("%"), 0);
    }

    #[test]
    fn test_search_by_ingredients_requires_all() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_meal(&NewMeal {
            ingredients: vec![1, 2],
            ..new_meal("both")
        })
        .unwrap());
        created(db.insert_meal(&NewMeal {
            ingredients: vec![1],
            ..new_meal("one")
        })
        .unwrap());

        let with = |ids: Vec<i64>| {
            db.search_meals(&MealFilter {
                ingredients: ids,
                ..MealFilter::default()
            })
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect::<Vec<_>>()
        };
        assert_eq!(with(vec![1]), vec!["both", "one"]);
        assert_eq!(with(vec![1, 2]), vec!["both"]);
        assert!(with(vec![3]).is_empty());
    }

    #[test]
    fn test_random_meal() {
        let db = Database::open_in_memory().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(
            db.random_meal(&MealFilter::default(), &mut rng)
                .unwrap()
                .is_none()
        );

        created(db.insert_meal(&NewMeal {
            season: Season::Summer,
            ..new_meal("Gazpacho")
        })
        .unwrap());
        created(db.insert_meal(&new_meal("Pot-au-feu")).unwrap());

        let summer = MealFilter {
            season: Some(Season::Summer),
            ..MealFilter::default()
        };
        for _ in 0..10 {
            let meal = db.random_meal(&summer, &mut rng).unwrap().unwrap();
            assert_eq!(meal.title, "Gazpacho");
        }

        let winter = MealFilter {
            season: Some(Season::Winter),
            ..MealFilter::default()
        };
        assert!(db.random_meal(&winter, &mut rng).unwrap().is_none());
    }

    #[test]
    fn test_insert_ingredient_and_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let name = RawIngredientForm {
            name: Some("Café".to_string()),
        }
        .parse()
        .unwrap();
        let id = created(db.insert_ingredient(&name).unwrap());
        assert_eq!(
            db.get_ingredient(id).unwrap(),
            Some(Ingredient {
                id,
                name: "cafe".to_string()
            })
        );
        assert_eq!(
            db.insert_ingredient("cafe").unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(count(&db, "ingredients"), 1);
    }

    #[test]
    fn test_search_ingredients_normalized() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_ingredient("cafe").unwrap());
        created(db.insert_ingredient("sucre").unwrap());

        let found = db
            .search_ingredients(&crate::normalize::contains_pattern("CAFÉ"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "cafe");
    }

    #[test]
    fn test_get_ingredients_by_ids_skips_unknown() {
        let db = Database::open_in_memory().unwrap();
        let id = created(db.insert_ingredient("beurre").unwrap());
        let found = db.get_ingredients_by_ids(&[id, 404]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert!(db.get_ingredients_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_list_ingredients() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_ingredient("oeuf").unwrap());
        created(db.insert_ingredient("farine").unwrap());
        let names: Vec<String> = db
            .list_ingredients()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["oeuf", "farine"]);
    }

    #[test]
    fn test_delete_ingredient_unlinks_by_ingredient_id() {
        let db = Database::open_in_memory().unwrap();
        let butter = created(db.insert_ingredient("beurre").unwrap());
        let flour = created(db.insert_ingredient("farine").unwrap());
        let meal = created(db.insert_meal(&NewMeal {
            ingredients: vec![butter, flour],
            ..new_meal("Crêpes")
        })
        .unwrap());
        // A meal whose id equals the deleted ingredient's id keeps its links.
        assert_eq!(meal, butter);

        assert!(db.delete_ingredient(butter).unwrap());
        assert!(db.get_ingredient(butter).unwrap().is_none());
        assert_eq!(db.get_meal(meal).unwrap().unwrap().ingredients, vec![flour]);
    }

    #[test]
    fn test_delete_missing_ingredient_is_noop() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_ingredient("sel").unwrap());
        assert!(!db.delete_ingredient(77).unwrap());
        assert_eq!(count(&db, "ingredients"), 1);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let db = Database::open_in_memory().unwrap();
        let first = created(db.insert_ingredient("poivre").unwrap());
        db.delete_ingredient(first).unwrap();
        let second = created(db.insert_ingredient("poivre").unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        created(db.insert_meal(&new_meal("Quiche")).unwrap());
        db.migrate().unwrap();
        assert_eq!(count(&db, "meals"), 1);
    }
}
