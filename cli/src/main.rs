mod commands;
mod config;
mod server;
mod session;
mod tls;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    MealAddArgs, MealFilterArgs, cmd_ingredient_add, cmd_ingredient_delete, cmd_ingredient_list,
    cmd_meal_add, cmd_meal_delete, cmd_meal_list, cmd_meal_random, cmd_meal_show,
    cmd_password_reset, cmd_password_show,
};
use crate::config::{Config, PasswordSource};
use crate::session::MAX_SESSION_TTL_HOURS;
use mealbook_core::db::Database;

#[derive(Parser)]
#[command(
    name = "mealbook",
    version,
    about = "A single-user recipe catalog",
    long_about = "A single-user recipe catalog.\n\n\
                  Keeps meals and ingredients in a local SQLite database and \
                  serves them over a small password-protected JSON API."
)]
struct Cli {
    /// Use this database file instead of the one in the data directory
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Path prefix the app is mounted under behind a reverse proxy (e.g. /recipes)
        #[arg(long, default_value = "")]
        base_path: String,
        /// Hours a login stays valid without activity
        #[arg(
            long,
            default_value = "168",
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_SESSION_TTL_HOURS))
        )]
        session_ttl_hours: u32,
        /// Serve HTTPS with a self-signed certificate (generated on first use)
        #[arg(long)]
        tls: bool,
        /// Certificate file (PEM); implies --tls
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Private key file (PEM); implies --tls
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },
    /// Manage meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Manage ingredients
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Show or reset the login password
    Password {
        #[command(subcommand)]
        command: PasswordCommands,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Add a meal
    Add {
        #[command(flatten)]
        meal: MealAddArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals, optionally filtered
    List {
        #[command(flatten)]
        filter: MealFilterArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pick one meal at random from those matching the filters
    Random {
        #[command(flatten)]
        filter: MealFilterArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a meal with its ingredients
    Show {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal by ID
    Delete {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient (stored lowercased, accents removed)
    Add {
        /// Ingredient name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List ingredients
    List {
        /// Only ingredients whose name contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an ingredient and unlink it from every meal
    Delete {
        /// Ingredient ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PasswordCommands {
    /// Show where the login password comes from (and the password itself if stored in a file)
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a new random password to the password file
    Reset {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let open_db = || Database::open(&config.db_path);

    match cli.command {
        Commands::Serve {
            port,
            bind,
            base_path,
            session_ttl_hours,
            tls,
            tls_cert,
            tls_key,
        } => {
            let (password, source) = config.load_or_create_password()?;
            if source == PasswordSource::Generated {
                eprintln!(
                    "Generated a login password: {password}\n(stored in {}; change it with `mealbook password reset`)",
                    config.password_path().display()
                );
            }
            let tls = if tls || tls_cert.is_some() || tls_key.is_some() {
                Some(tls::TlsPaths::resolve(&config.data_dir, tls_cert, tls_key)?)
            } else {
                None
            };
            let options = server::ServeOptions {
                port,
                bind,
                base_path,
                session_ttl_hours,
                password,
                tls,
            };
            server::start_server(open_db()?, options).await
        }
        Commands::Meal { command } => {
            let db = open_db()?;
            match command {
                MealCommands::Add { meal, json } => cmd_meal_add(&db, meal, json),
                MealCommands::List { filter, json } => cmd_meal_list(&db, filter, json),
                MealCommands::Random { filter, json } => cmd_meal_random(&db, filter, json),
                MealCommands::Show { id, json } => cmd_meal_show(&db, id, json),
                MealCommands::Delete { id, json } => cmd_meal_delete(&db, id, json),
            }
        }
        Commands::Ingredient { command } => {
            let db = open_db()?;
            match command {
                IngredientCommands::Add { name, json } => cmd_ingredient_add(&db, &name, json),
                IngredientCommands::List { search, json } => {
                    cmd_ingredient_list(&db, search.as_deref(), json)
                }
                IngredientCommands::Delete { id, json } => cmd_ingredient_delete(&db, id, json),
            }
        }
        Commands::Password { command } => match command {
            PasswordCommands::Show { json } => cmd_password_show(&config, json),
            PasswordCommands::Reset { json } => cmd_password_reset(&config, json),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_db_flag_is_global() {
        let cli = Cli::try_parse_from(["mealbook", "meal", "show", "3", "--db", "/tmp/x.db"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(
            cli.command,
            Commands::Meal {
                command: MealCommands::Show { id: 3, json: false }
            }
        ));
    }

    #[test]
    fn test_session_ttl_bounds() {
        let parse = |hours: &str| {
            Cli::try_parse_from(["mealbook", "serve", "--session-ttl-hours", hours])
        };
        assert!(parse("0").is_err());
        assert!(parse("876001").is_err());
        assert!(parse("99999999999").is_err());
        assert!(parse("1").is_ok());
        assert!(parse("876000").is_ok());
    }

    #[test]
    fn test_negative_codes_parse_as_values() {
        let cli = Cli::try_parse_from(["mealbook", "meal", "list", "--time", "-1", "--json"]);
        assert!(cli.is_ok());
    }
}
