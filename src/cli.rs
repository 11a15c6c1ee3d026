//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::api::validate_username;
use crate::auth::hash_password;
use crate::db::{Database, UserType};
use crate::sweep::SessionSweeper;
use clap::Parser;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::time::Duration;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

const MAX_ACCESS_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_REFRESH_TTL_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_SWEEP_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;
const MAX_SESSION_RETENTION_DAYS: u64 = 36_500;

/// Length of generated admin passwords.
const ADMIN_PASSWORD_LENGTH: usize = 24;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tourgate",
    about = "Authentication and session gateway for the tourism backend"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE", default_value = "tourgate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds (at most one day)
    #[arg(long, env = "ACCESS_TTL_SECS", default_value = "300",
        value_parser = clap::value_parser!(u64).range(1..=MAX_ACCESS_TTL_SECS))]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds (at most one year)
    #[arg(long, env = "REFRESH_TTL_SECS", default_value = "1209600",
        value_parser = clap::value_parser!(u64).range(1..=MAX_REFRESH_TTL_SECS))]
    pub refresh_ttl_secs: u64,

    /// Seconds between scheduled session sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "86400",
        value_parser = clap::value_parser!(u64).range(1..=MAX_SWEEP_INTERVAL_SECS))]
    pub sweep_interval_secs: u64,

    /// Sessions idle for longer than this many days are deactivated
    #[arg(long, env = "SESSION_RETENTION_DAYS", default_value = "14",
        value_parser = clap::value_parser!(u64).range(1..=MAX_SESSION_RETENTION_DAYS))]
    pub session_retention_days: u64,

    /// Login attempts allowed per username per minute
    #[arg(long, default_value = "10")]
    pub login_attempts_per_minute: u32,

    /// Disable new user signups (admin creation via --create-admin still works)
    #[arg(long)]
    pub no_signup: bool,

    /// Create an admin user with this username on startup and print its password
    #[arg(long, value_name = "USERNAME")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: called from main before the runtime spawns any worker
        // threads, and nothing else reads this variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ADMIN_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Handle the --create-admin flag: create an admin account with a random password.
/// Exits the process if the account cannot be created.
pub async fn handle_create_admin(db: &Database, username: &str) {
    if let Err(e) = validate_username(username) {
        error!(username = %username, error = ?e, "Invalid admin username");
        std::process::exit(1);
    }

    match db.users().get_by_username(username).await {
        Ok(Some(_)) => {
            error!(username = %username, "User already exists");
            std::process::exit(1);
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Failed to check for existing user");
            std::process::exit(1);
        }
    }

    let password = generate_password();
    let hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash admin password");
            std::process::exit(1);
        }
    };

    match db.users().create(username, &hash, UserType::Admin).await {
        Ok(user_id) => {
            info!(user_id, username = %username, "Admin user created");
            println!();
            println!("Admin user created: {}", username);
            println!("Password: {}", password);
            println!();
        }
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> ServerConfig {
    let retention = Duration::from_secs(args.session_retention_days.saturating_mul(24 * 60 * 60));

    let mut config = ServerConfig::new(db.clone(), jwt_secret.into_bytes());
    config.tokens.access_ttl = Duration::from_secs(args.access_ttl_secs);
    config.tokens.refresh_ttl = Duration::from_secs(args.refresh_ttl_secs);
    config.no_signup = args.no_signup;
    config.login_attempts_per_minute = args.login_attempts_per_minute;
    config.sweep_interval = Duration::from_secs(args.sweep_interval_secs);
    config.sweeper = SessionSweeper::new(db, retention);
    config
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["tourgate"]).unwrap();
        assert_eq!(args.access_ttl_secs, 300);
        assert_eq!(args.refresh_ttl_secs, 14 * 24 * 60 * 60);
        assert_eq!(args.session_retention_days, 14);
        assert!(args.create_admin.is_none());
    }

    #[test]
    fn test_duration_flags_are_bounded() {
        for (flag, value) in [
            ("--access-ttl-secs", "86401"),
            ("--refresh-ttl-secs", "18446744073709551615"),
            ("--sweep-interval-secs", "0"),
            ("--session-retention-days", "200000000000000"),
        ] {
            assert!(
                Args::try_parse_from(["tourgate", flag, value]).is_err(),
                "{} {} should be rejected",
                flag,
                value
            );
        }

        let args = Args::try_parse_from(["tourgate", "--session-retention-days", "36500"]).unwrap();
        assert_eq!(args.session_retention_days, 36_500);
    }

    #[test]
    fn test_generated_password() {
        let password = generate_password();
        assert_eq!(password.len(), ADMIN_PASSWORD_LENGTH);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password());
    }

    #[tokio::test]
    async fn test_build_config() {
        let db = Database::open(":memory:").await.unwrap();
        let args = Args::try_parse_from([
            "tourgate",
            "--access-ttl-secs",
            "60",
            "--session-retention-days",
            "2",
            "--no-signup",
        ])
        .unwrap();

        let config = build_config(&args, db, "x".repeat(32));
        assert_eq!(config.tokens.access_ttl, Duration::from_secs(60));
        assert_eq!(config.sweeper.retention(), Duration::from_secs(2 * 24 * 60 * 60));
        assert!(config.no_signup);
    }
}
