//! Provision, disable or re-enable an analyst account in the SQLite
//! credential store

use anyhow::{bail, Context, Result};
use clap::Parser;
use security_analyst::config::DatabaseConfig;
use security_analyst::database::DatabaseManager;
use security_analyst::error::StoreError;
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "create_user", version, about = "Create a user for the analyst API")]
struct Args {
    /// Login name
    #[arg(long)]
    username: String,

    /// Password; read from the first line of stdin when omitted
    #[arg(long)]
    password: Option<String>,

    /// Role label embedded in issued tokens
    #[arg(long, default_value = "admin")]
    role: String,

    /// SQLite database file
    #[arg(long, env = "ANALYST_DATABASE_PATH", default_value = "data/app.db")]
    database: PathBuf,

    /// Create the account disabled
    #[arg(long, conflicts_with_all = ["disable", "enable"])]
    inactive: bool,

    /// Disable an existing account instead of creating one
    #[arg(long, conflicts_with = "enable")]
    disable: bool,

    /// Re-enable an existing account instead of creating one
    #[arg(long)]
    enable: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "security_analyst=warn".into()),
        )
        .init();

    let args = Args::parse();

    let username = args.username.trim().to_string();
    if username.is_empty() {
        bail!("username must not be empty");
    }

    let config = DatabaseConfig {
        path: args.database.clone(),
        ..DatabaseConfig::default()
    };
    let db = DatabaseManager::connect(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.path.display()))?;
    db.init_schema().await.context("Failed to create schema")?;

    if args.disable || args.enable {
        let active = args.enable;
        if !db
            .set_user_active(&username, active)
            .await
            .context("Failed to update user")?
        {
            bail!("User '{}' not found", username);
        }
        let state = if active { "enabled" } else { "disabled" };
        println!("User '{}' {}", username, state);
        return Ok(());
    }

    let password = match args.password {
        Some(password) => password,
        None => read_password_line().context("Failed to read password from stdin")?,
    };
    if password.is_empty() {
        bail!("password must not be empty");
    }

    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .context("Hashing task failed")?
        .context("Failed to hash password")?;

    match db.create_user(&username, &hash, &args.role, !args.inactive).await {
        Ok(id) => {
            println!("Created user '{}' (id {}, role {})", username, id, args.role);
            Ok(())
        }
        Err(StoreError::UserExists(name)) => bail!("User '{}' already exists", name),
        Err(e) => Err(e).context("Failed to create user"),
    }
}

fn read_password_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
