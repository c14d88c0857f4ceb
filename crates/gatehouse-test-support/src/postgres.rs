//! Per-test PostgreSQL databases carved out of an externally supplied server.

use std::str::FromStr;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use postgres::NoTls;
use url::Url;

/// Environment variable naming the server used by integration tests.
pub const TEST_DATABASE_ENV: &str = "GATEHOUSE_TEST_DATABASE_URL";

/// Uniquely named database dropped when the handle goes out of scope.
pub struct TestDatabase {
    connection_string: String,
    admin_url: String,
    database: String,
}

impl TestDatabase {
    /// Connection string for the fresh database.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Name of the fresh database.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.database
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let statement = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.database);
        let _ = run_admin_statement(&self.admin_url, statement);
    }
}

/// Create a fresh database on the server named by [`TEST_DATABASE_ENV`].
///
/// Suites should skip (not fail) when this returns an error.
///
/// # Errors
///
/// Returns an error when the variable is unset, the URL is malformed, or the
/// database cannot be created.
pub fn start_postgres() -> Result<TestDatabase> {
    let base = std::env::var(TEST_DATABASE_ENV)
        .with_context(|| format!("{TEST_DATABASE_ENV} is not set"))?;
    create_unique_database(&base)
}

fn create_unique_database(base_url: &str) -> Result<TestDatabase> {
    let parsed = Url::parse(base_url).context("invalid postgres connection url")?;
    let database = unique_database_name();

    let mut target = parsed.clone();
    target.set_path(&format!("/{database}"));

    let mut last_error = None;
    for admin_url in admin_urls(&parsed) {
        match run_admin_statement(&admin_url, format!("CREATE DATABASE \"{database}\"")) {
            Ok(()) => {
                return Ok(TestDatabase {
                    connection_string: target.to_string(),
                    admin_url,
                    database,
                });
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("failed to create test database")))
}

fn admin_urls(base: &Url) -> Vec<String> {
    let mut admin = base.clone();
    admin.set_path("/postgres");
    let mut urls = vec![admin.to_string()];
    if admin.path() != base.path() {
        urls.push(base.to_string());
    }
    urls
}

// The synchronous client must not run on a tokio worker thread.
fn run_admin_statement(admin_url: &str, statement: String) -> Result<()> {
    let admin_url = admin_url.to_string();
    thread::spawn(move || -> Result<()> {
        let mut client = postgres::Config::from_str(&admin_url)?.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .context("admin statement failed")
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("admin statement thread panicked")))
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("gatehouse_test_{}_{nanos}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_urls_prefer_maintenance_database() -> Result<()> {
        let base = Url::parse("postgres://user:pw@localhost:5432/app")?;
        let urls = admin_urls(&base);
        assert_eq!(urls[0], "postgres://user:pw@localhost:5432/postgres");
        assert_eq!(urls[1], "postgres://user:pw@localhost:5432/app");

        let maintenance = Url::parse("postgres://user@localhost/postgres")?;
        assert_eq!(admin_urls(&maintenance).len(), 1);
        Ok(())
    }

    #[test]
    fn database_names_are_lowercase_identifiers() {
        let name = unique_database_name();
        assert!(name.starts_with("gatehouse_test_"));
        assert!(
            name.bytes()
                .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_')
        );
    }
}
