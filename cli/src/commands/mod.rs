mod helpers;
mod ingredient;
mod meal;
mod password;

pub(crate) use ingredient::{cmd_ingredient_add, cmd_ingredient_delete, cmd_ingredient_list};
pub(crate) use meal::{
    MealAddArgs, MealFilterArgs, cmd_meal_add, cmd_meal_delete, cmd_meal_list, cmd_meal_random,
    cmd_meal_show,
};
pub(crate) use password::{cmd_password_reset, cmd_password_show};
