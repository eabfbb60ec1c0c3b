use anyhow::Result;

use crate::config::{Config, PASSWORD_ENV, PasswordSource};

pub(crate) fn cmd_password_show(config: &Config, json: bool) -> Result<()> {
    let (password, source) = config.load_or_create_password()?;
    let path = config.password_path();

    if json {
        let value = match source {
            PasswordSource::Environment => serde_json::json!({
                "source": "environment",
                "variable": PASSWORD_ENV,
            }),
            PasswordSource::File | PasswordSource::Generated => serde_json::json!({
                "source": "file",
                "path": path,
                "password": password,
                "generated": source == PasswordSource::Generated,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match source {
        PasswordSource::Environment => {
            println!("The login password is set by the {PASSWORD_ENV} environment variable.");
        }
        PasswordSource::File => {
            println!("Password: {password}");
            println!("Stored in {}", path.display());
        }
        PasswordSource::Generated => {
            println!("Password: {password}");
            println!("Generated and stored in {}", path.display());
        }
    }
    Ok(())
}

pub(crate) fn cmd_password_reset(config: &Config, json: bool) -> Result<()> {
    let password = config.reset_password()?;
    let path = config.password_path();
    let overridden = std::env::var(PASSWORD_ENV).is_ok_and(|v| !v.is_empty());

    if json {
        let value = serde_json::json!({
            "path": path,
            "password": password,
            "overridden_by_environment": overridden,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("New password: {password}");
    println!("Stored in {}", path.display());
    if overridden {
        eprintln!(
            "Note: {PASSWORD_ENV} is set and takes precedence over the password file."
        );
    }
    eprintln!("Restart a running server for the new password to take effect.");
    Ok(())
}
