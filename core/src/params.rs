//! Request parameter parsing and filter building.
//!
//! Raw inputs arrive as optional strings (query string or form fields). Each
//! field is coerced by a small parser that yields either the typed value or
//! the field's own error, and the per-endpoint parsers compose those with `?`.
//! All validation happens here, before any statement touches the store.
//!
//! Two conventions apply to every optional field:
//!
//! * An absent field and an empty string are the same thing: "use the default"
//!   when creating, "no filter" when searching.
//! * **Zero means "no cap"** for the search-time limits
//!   (`preparation_time_max`, `cook_time_max`, `total_time_max`). A literal `0`
//!   is accepted as valid and then dropped, so it never restricts results. The
//!   enumerated filters (`meal_entry`, `meal_time`, `season`) do not follow
//!   this rule: `0` is a real value for them.

use std::fmt::Display;

use rusqlite::types::Value;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{MealEntry, MealTime, NewMeal, Season};
use crate::normalize::{contains_pattern, normalize_ingredient_name, normalize_text, token_pattern};

/// Upper bound (exclusive) on the number of ids accepted by a batch lookup.
pub const MAX_BATCH_IDS: usize = 100;

/// Numeric code reported in the response envelope.
///
/// Codes are scoped per endpoint: the same number means different things on
/// different endpoints.
pub trait ErrorCode: Display {
    fn code(&self) -> i64;
}

// --- Raw inputs ---

/// Form fields of a meal creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMealForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub meal_entry: Option<String>,
    pub meal_time: Option<String>,
    pub season: Option<String>,
    pub preparation_time: Option<String>,
    pub cook_time: Option<String>,
    /// JSON array of ingredient ids, e.g. `[1, 4, "7"]`.
    pub ingredients: Option<String>,
}

/// Query string of a meal search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMealQuery {
    pub mode: Option<String>,
    pub title: Option<String>,
    pub meal_entry: Option<String>,
    pub meal_time: Option<String>,
    pub season: Option<String>,
    pub preparation_time_max: Option<String>,
    pub cook_time_max: Option<String>,
    pub total_time_max: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIngredientQuery {
    pub mode: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIngredientForm {
    pub name: Option<String>,
}

// --- Errors ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MealFormError {
    #[error("Malformed request, missing parameter title.")]
    MissingTitle,
    #[error("Meal with given title already exists.")]
    DuplicateTitle,
    #[error("Invalid meal entry. Should be 0, 1 or 2.")]
    MealEntry,
    #[error("Invalid meal time. Should be -1, 0 or 1.")]
    MealTime,
    #[error("Invalid season. Should be -1, 0, 1, 2 or 3.")]
    Season,
    #[error("Invalid preparation time, should be a positive number.")]
    PreparationTime,
    #[error("Invalid cook time, should be a positive number.")]
    CookTime,
    #[error("Malformed request, couldn't parse parameters.")]
    MalformedIngredients,
    #[error("Ingredient ids must be integers.")]
    IngredientId,
}

impl ErrorCode for MealFormError {
    fn code(&self) -> i64 {
        match self {
            Self::MissingTitle => 1,
            Self::DuplicateTitle => 2,
            Self::MealEntry => 3,
            Self::MealTime => 4,
            Self::Season => 5,
            Self::PreparationTime => 6,
            Self::CookTime => 7,
            Self::MalformedIngredients => 8,
            Self::IngredientId => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MealQueryError {
    #[error("Malformed request, invalid value for parameter mode.")]
    InvalidMode,
    #[error("Invalid meal entry. Should be 0, 1 or 2.")]
    MealEntry,
    #[error("Invalid meal time. Should be -1, 0 or 1.")]
    MealTime,
    #[error("Invalid season. Should be -1, 0, 1, 2 or 3.")]
    Season,
    #[error("Invalid maximum preparation time, should be a positive number.")]
    PreparationTime,
    #[error("Invalid maximum cook time, should be a positive number.")]
    CookTime,
    #[error("Invalid maximum total time, should be a positive number.")]
    TotalTime,
    #[error("Malformed request, couldn't parse parameters.")]
    MalformedIngredients,
    #[error("Ingredient ids must be integers.")]
    IngredientId,
    #[error("No meal matches the query.")]
    NoMatch,
}

impl ErrorCode for MealQueryError {
    fn code(&self) -> i64 {
        match self {
            Self::InvalidMode => 2,
            Self::MealEntry => 3,
            Self::MealTime => 4,
            Self::Season => 5,
            Self::PreparationTime => 6,
            Self::CookTime => 7,
            Self::TotalTime => 8,
            Self::MalformedIngredients => 9,
            Self::IngredientId => 10,
            Self::NoMatch => 11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngredientQueryError {
    #[error("Malformed request, parameter q for query is required.")]
    MissingQuery,
    #[error("Malformed request, invalid value for parameter mode.")]
    InvalidMode,
    #[error("Malformed request, couldn't parse parameters.")]
    Malformed,
    #[error("Malformed request, at most 99 ingredient ids can be requested at once.")]
    TooMany,
}

impl ErrorCode for IngredientQueryError {
    fn code(&self) -> i64 {
        match self {
            Self::MissingQuery => 1,
            Self::InvalidMode => 2,
            Self::Malformed => 3,
            Self::TooMany => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngredientFormError {
    #[error("Malformed request, parameter name is required.")]
    MissingName,
    #[error("Ingredient exists.")]
    Duplicate,
}

impl ErrorCode for IngredientFormError {
    fn code(&self) -> i64 {
        match self {
            Self::MissingName => 1,
            Self::Duplicate => 2,
        }
    }
}

/// Lookup of a single resource by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Resource does not exist")]
    NotFound,
}

impl ErrorCode for LookupError {
    fn code(&self) -> i64 {
        1
    }
}

/// Failure to read an id list; callers map it onto their own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdListError {
    Malformed,
    NotInteger,
}

// --- Field parsers ---

/// `None` for absent or empty.
fn provided(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.is_empty())
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn enum_field<T, E>(
    raw: Option<&str>,
    from_code: fn(i64) -> Option<T>,
    err: E,
) -> Result<Option<T>, E> {
    provided(raw)
        .map(|s| parse_int(s).and_then(from_code).ok_or(err))
        .transpose()
}

fn non_negative_field<E>(raw: Option<&str>, err: E) -> Result<Option<i64>, E> {
    provided(raw)
        .map(|s| parse_int(s).filter(|v| *v >= 0).ok_or(err))
        .transpose()
}

/// A search-time cap: validated like any non-negative field, then `0` is
/// dropped because it means "no cap".
fn time_cap_field<E>(raw: Option<&str>, err: E) -> Result<Option<i64>, E> {
    Ok(non_negative_field(raw, err)?.filter(|v| *v != 0))
}

/// Parse a JSON array of integer-coercible values.
///
/// Elements may be JSON integers or strings holding an integer (`"7"`).
/// Anything that is not a JSON array is `Malformed`.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>, IdListError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|_| IdListError::Malformed)?;
    let serde_json::Value::Array(items) = value else {
        return Err(IdListError::Malformed);
    };
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => parse_int(s),
            _ => None,
        })
        .map(|id| id.ok_or(IdListError::NotInteger))
        .collect()
}

fn id_list_field<E: Copy>(
    raw: Option<&str>,
    malformed: E,
    not_integer: E,
) -> Result<Vec<i64>, E> {
    match provided(raw) {
        None => Ok(Vec::new()),
        Some(s) => parse_id_list(s).map_err(|e| match e {
            IdListError::Malformed => malformed,
            IdListError::NotInteger => not_integer,
        }),
    }
}

// --- Meal creation ---

impl RawMealForm {
    /// Validate and normalize into a [`NewMeal`], applying defaults.
    pub fn parse(&self) -> Result<NewMeal, MealFormError> {
        let title = provided(self.title.as_deref())
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .ok_or(MealFormError::MissingTitle)?;
        let description = self
            .description
            .as_deref()
            .map(normalize_text)
            .unwrap_or_default();

        Ok(NewMeal {
            title,
            description,
            meal_entry: enum_field(
                self.meal_entry.as_deref(),
                MealEntry::from_code,
                MealFormError::MealEntry,
            )?
            .unwrap_or_default(),
            meal_time: enum_field(
                self.meal_time.as_deref(),
                MealTime::from_code,
                MealFormError::MealTime,
            )?
            .unwrap_or_default(),
            season: enum_field(self.season.as_deref(), Season::from_code, MealFormError::Season)?
                .unwrap_or_default(),
            preparation_time: non_negative_field(
                self.preparation_time.as_deref(),
                MealFormError::PreparationTime,
            )?,
            cook_time: non_negative_field(self.cook_time.as_deref(), MealFormError::CookTime)?,
            ingredients: id_list_field(
                self.ingredients.as_deref(),
                MealFormError::MalformedIngredients,
                MealFormError::IngredientId,
            )?,
        })
    }
}

// --- Meal search ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MealQueryMode {
    #[default]
    Search,
    Random,
}

impl MealQueryMode {
    fn parse(raw: Option<&str>) -> Result<Self, MealQueryError> {
        match provided(raw) {
            None | Some("search") => Ok(Self::Search),
            Some("random") => Ok(Self::Random),
            Some(_) => Err(MealQueryError::InvalidMode),
        }
    }
}

/// Validated meal search criteria. Every `None`/empty field is "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MealFilter {
    pub title: Option<String>,
    pub meal_entry: Option<MealEntry>,
    pub meal_time: Option<MealTime>,
    pub season: Option<Season>,
    pub preparation_time_max: Option<i64>,
    pub cook_time_max: Option<i64>,
    pub total_time_max: Option<i64>,
    /// Meals must use every one of these ingredients.
    pub ingredients: Vec<i64>,
}

/// A `WHERE` clause (possibly empty) with its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub args: Vec<Value>,
}

impl MealFilter {
    /// Conjunction of predicates over the `meals` table.
    #[must_use]
    pub fn where_clause(&self) -> WhereClause {
        let mut conditions: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(title) = &self.title {
            conditions.push("title LIKE ? ESCAPE '\\'");
            args.push(Value::Text(token_pattern(title)));
        }
        if let Some(entry) = self.meal_entry {
            conditions.push("meal_entry = ?");
            args.push(Value::Integer(entry.code()));
        }
        if let Some(time) = self.meal_time {
            conditions.push("meal_time = ?");
            args.push(Value::Integer(time.code()));
        }
        if let Some(season) = self.season {
            conditions.push("season = ?");
            args.push(Value::Integer(season.code()));
        }
        if let Some(max) = self.preparation_time_max {
            conditions.push("preparation_time <= ?");
            args.push(Value::Integer(max));
        }
        if let Some(max) = self.cook_time_max {
            conditions.push("cook_time <= ?");
            args.push(Value::Integer(max));
        }
        if let Some(max) = self.total_time_max {
            conditions.push("(COALESCE(preparation_time, 0) + COALESCE(cook_time, 0)) <= ?");
            args.push(Value::Integer(max));
        }
        for id in &self.ingredients {
            conditions
                .push("? IN (SELECT ingredient_id FROM meal_ingredients WHERE meal_id = meals.id)");
            args.push(Value::Integer(*id));
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        WhereClause { sql, args }
    }
}

impl RawMealQuery {
    pub fn parse(&self) -> Result<(MealQueryMode, MealFilter), MealQueryError> {
        let mode = MealQueryMode::parse(self.mode.as_deref())?;
        let filter = MealFilter {
            title: provided(self.title.as_deref()).map(str::to_string),
            meal_entry: enum_field(
                self.meal_entry.as_deref(),
                MealEntry::from_code,
                MealQueryError::MealEntry,
            )?,
            meal_time: enum_field(
                self.meal_time.as_deref(),
                MealTime::from_code,
                MealQueryError::MealTime,
            )?,
            season: enum_field(self.season.as_deref(), Season::from_code, MealQueryError::Season)?,
            preparation_time_max: time_cap_field(
                self.preparation_time_max.as_deref(),
                MealQueryError::PreparationTime,
            )?,
            cook_time_max: time_cap_field(
                self.cook_time_max.as_deref(),
                MealQueryError::CookTime,
            )?,
            total_time_max: time_cap_field(
                self.total_time_max.as_deref(),
                MealQueryError::TotalTime,
            )?,
            ingredients: id_list_field(
                self.ingredients.as_deref(),
                MealQueryError::MalformedIngredients,
                MealQueryError::IngredientId,
            )?,
        };
        Ok((mode, filter))
    }
}

// --- Ingredients ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngredientQuery {
    /// `LIKE` pattern over normalized names.
    Search(String),
    /// Batch lookup by id.
    Many(Vec<i64>),
}

impl RawIngredientQuery {
    pub fn parse(&self) -> Result<IngredientQuery, IngredientQueryError> {
        let q = provided(self.q.as_deref()).ok_or(IngredientQueryError::MissingQuery)?;
        match provided(self.mode.as_deref()) {
            None | Some("search") => Ok(IngredientQuery::Search(contains_pattern(q))),
            Some("many") => {
                let ids = parse_id_list(q).map_err(|_| IngredientQueryError::Malformed)?;
                if ids.len() >= MAX_BATCH_IDS {
                    return Err(IngredientQueryError::TooMany);
                }
                Ok(IngredientQuery::Many(ids))
            }
            Some(_) => Err(IngredientQueryError::InvalidMode),
        }
    }
}

impl RawIngredientForm {
    /// Normalized, lowercased name.
    pub fn parse(&self) -> Result<String, IngredientFormError> {
        provided(self.name.as_deref())
            .map(normalize_ingredient_name)
            .filter(|n| !n.is_empty())
            .ok_or(IngredientFormError::MissingName)
    }
}
