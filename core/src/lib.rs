//! Core of the mealbook recipe catalog: data model, request parameter
//! parsing, text normalization, and the SQLite store.

pub mod db;
pub mod models;
pub mod normalize;
pub mod params;
