use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the password file.
pub const PASSWORD_ENV: &str = "MEALBOOK_PASSWORD";

const PASSWORD_LENGTH: usize = 24;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Where the login password came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    Environment,
    File,
    Generated,
}

impl Config {
    pub fn load(db_override: Option<PathBuf>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "mealbook").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = db_override.unwrap_or_else(|| data_dir.join("mealbook.db"));

        Ok(Config { db_path, data_dir })
    }

    pub fn password_path(&self) -> PathBuf {
        self.data_dir.join("password")
    }

    /// Resolve the login password: environment first, then the password
    /// file, generating the file on first run.
    pub fn load_or_create_password(&self) -> Result<(String, PasswordSource)> {
        self.resolve_password(std::env::var(PASSWORD_ENV).ok())
    }

    fn resolve_password(&self, from_env: Option<String>) -> Result<(String, PasswordSource)> {
        if let Some(password) = from_env.filter(|p| !p.is_empty()) {
            return Ok((password, PasswordSource::Environment));
        }

        let path = self.password_path();
        if path.exists() {
            let password =
                std::fs::read_to_string(&path).context("Failed to read password file")?;
            let password = password.trim().to_string();
            if !password.is_empty() {
                return Ok((password, PasswordSource::File));
            }
        }

        let password = write_new_password(&path)?;
        Ok((password, PasswordSource::Generated))
    }

    /// Replace the password file with a freshly generated password.
    pub fn reset_password(&self) -> Result<String> {
        write_new_password(&self.password_path())
    }
}

fn write_new_password(path: &Path) -> Result<String> {
    use rand::Rng;

    let password: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect();
    std::fs::write(path, &password).context("Failed to write password file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set password file permissions")?;
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &tempfile::TempDir) -> Config {
        Config {
            db_path: dir.path().join("mealbook.db"),
            data_dir: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn test_password_generated_then_reused() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = temp_config(&tmp);

        let (first, source) = config.resolve_password(None).unwrap();
        assert_eq!(source, PasswordSource::Generated);
        assert_eq!(first.len(), PASSWORD_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));

        let (second, source) = config.resolve_password(None).unwrap();
        assert_eq!(source, PasswordSource::File);
        assert_eq!(first, second);
    }

    #[test]
    fn test_environment_overrides_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = temp_config(&tmp);
        config.resolve_password(None).unwrap();

        let (password, source) = config
            .resolve_password(Some("from-env".to_string()))
            .unwrap();
        assert_eq!(source, PasswordSource::Environment);
        assert_eq!(password, "from-env");
    }

    #[test]
    fn test_empty_environment_ignored() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = temp_config(&tmp);
        let (_, source) = config.resolve_password(Some(String::new())).unwrap();
        assert_eq!(source, PasswordSource::Generated);
    }

    #[test]
    fn test_password_file_trimmed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = temp_config(&tmp);
        std::fs::write(config.password_path(), "  s3cret\n").unwrap();
        let (password, _) = config.resolve_password(None).unwrap();
        assert_eq!(password, "s3cret");
    }

    #[test]
    fn test_reset_password_changes_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = temp_config(&tmp);
        let (before, _) = config.resolve_password(None).unwrap();
        let after = config.reset_password().unwrap();
        assert_ne!(before, after);
        let (read_back, source) = config.resolve_password(None).unwrap();
        assert_eq!(source, PasswordSource::File);
        assert_eq!(read_back, after);
    }

    #[cfg(unix)]
    #[test]
    fn test_password_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let config = temp_config(&tmp);
        config.resolve_password(None).unwrap();
        let mode = std::fs::metadata(config.password_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
