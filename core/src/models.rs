use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Course of a meal. Stored and serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum MealEntry {
    Before,
    #[default]
    Main,
    Dessert,
}

/// Time of day a meal is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum MealTime {
    #[default]
    Any,
    Lunch,
    Dinner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Season {
    #[default]
    Any,
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl MealEntry {
    pub const ALL: [MealEntry; 3] = [Self::Before, Self::Main, Self::Dessert];

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Before => 0,
            Self::Main => 1,
            Self::Dessert => 2,
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.code() == code)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Main => "main",
            Self::Dessert => "dessert",
        }
    }
}

impl MealTime {
    pub const ALL: [MealTime; 3] = [Self::Any, Self::Lunch, Self::Dinner];

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Any => -1,
            Self::Lunch => 0,
            Self::Dinner => 1,
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.code() == code)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }
}

impl Season {
    pub const ALL: [Season; 5] = [
        Self::Any,
        Self::Spring,
        Self::Summer,
        Self::Autumn,
        Self::Winter,
    ];

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Any => -1,
            Self::Spring => 0,
            Self::Summer => 1,
            Self::Autumn => 2,
            Self::Winter => 3,
        }
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.code() == code)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
            Self::Winter => "winter",
        }
    }
}

// serde and rusqlite both go through the integer code.
macro_rules! integer_coded {
    ($ty:ty, $what:literal) => {
        impl From<$ty> for i64 {
            fn from(value: $ty) -> Self {
                value.code()
            }
        }

        impl TryFrom<i64> for $ty {
            type Error = String;

            fn try_from(code: i64) -> Result<Self, Self::Error> {
                Self::from_code(code).ok_or_else(|| format!("invalid {} code {code}", $what))
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.code()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let code = i64::column_result(value)?;
                Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
            }
        }
    };
}

integer_coded!(MealEntry, "meal entry");
integer_coded!(MealTime, "meal time");
integer_coded!(Season, "season");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub meal_entry: MealEntry,
    pub meal_time: MealTime,
    pub season: Season,
    pub preparation_time: Option<i64>,
    pub cook_time: Option<i64>,
    /// Ingredient ids in join-table order. May contain duplicates.
    pub ingredients: Vec<i64>,
}

impl Meal {
    /// Preparation plus cooking time, unknown parts counted as zero. Saturates
    /// at `i64::MAX`.
    #[must_use]
    pub fn total_time(&self) -> i64 {
        self.preparation_time
            .unwrap_or(0)
            .saturating_add(self.cook_time.unwrap_or(0))
    }
}

/// A validated, normalized meal ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMeal {
    pub title: String,
    pub description: String,
    pub meal_entry: MealEntry,
    pub meal_time: MealTime,
    pub season: Season,
    pub preparation_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub ingredients: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_codes_round_trip() {
        for entry in MealEntry::ALL {
            assert_eq!(MealEntry::from_code(entry.code()), Some(entry));
        }
        for time in MealTime::ALL {
            assert_eq!(MealTime::from_code(time.code()), Some(time));
        }
        for season in Season::ALL {
            assert_eq!(Season::from_code(season.code()), Some(season));
        }
    }

    #[test]
    fn test_enum_rejects_unknown_codes() {
        assert_eq!(MealEntry::from_code(-1), None);
        assert_eq!(MealEntry::from_code(3), None);
        assert_eq!(MealTime::from_code(2), None);
        assert_eq!(Season::from_code(4), None);
        assert_eq!(Season::from_code(-2), None);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(MealEntry::default(), MealEntry::Main);
        assert_eq!(MealTime::default(), MealTime::Any);
        assert_eq!(Season::default(), Season::Any);
    }

    #[test]
    fn test_meal_serializes_enum_codes() {
        let meal = Meal {
            id: 7,
            title: "Ratatouille".to_string(),
            description: String::new(),
            meal_entry: MealEntry::Dessert,
            meal_time: MealTime::Any,
            season: Season::Winter,
            preparation_time: Some(20),
            cook_time: None,
            ingredients: vec![1, 2],
        };
        let json = serde_json::to_value(&meal).unwrap();
        assert_eq!(json["meal_entry"], 2);
        assert_eq!(json["meal_time"], -1);
        assert_eq!(json["season"], 3);
        assert!(json["cook_time"].is_null());
        assert_eq!(json["ingredients"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_meal_deserialize_rejects_bad_code() {
        let json = serde_json::json!({
            "id": 1,
            "title": "x",
            "description": "",
            "meal_entry": 9,
            "meal_time": 0,
            "season": 0,
            "preparation_time": null,
            "cook_time": null,
            "ingredients": []
        });
        assert!(serde_json::from_value::<Meal>(json).is_err());
    }

    #[test]
    fn test_total_time() {
        let mut meal = Meal {
            id: 1,
            title: "t".to_string(),
            description: String::new(),
            meal_entry: MealEntry::Main,
            meal_time: MealTime::Any,
            season: Season::Any,
            preparation_time: None,
            cook_time: None,
            ingredients: vec![],
        };
        assert_eq!(meal.total_time(), 0);
        meal.preparation_time = Some(15);
        assert_eq!(meal.total_time(), 15);
        meal.cook_time = Some(30);
        assert_eq!(meal.total_time(), 45);

        meal.preparation_time = Some(i64::MAX);
        meal.cook_time = Some(1);
        assert_eq!(meal.total_time(), i64::MAX);
    }
}
