//! Tibu CLI - administration commands
//!
//! Usage:
//!   tibu migrate
//!   tibu promote --email <email> [--role ADMIN|USER]
//!   tibu pre-register --email <email> --name <name>
//!
//! Reads the same configuration as the server (`TIBU_CONFIG`, `DATABASE_URL`, ...).

use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tibu_api::auth::repository::{Repositories, RepositoryError};
use tibu_api::db;
use tibu_core::{AppConfig, InvalidRole, NewPreRegisteredUser, Role, UserUpdate};

#[derive(Parser)]
#[command(name = "tibu")]
#[command(about = "Tibu accounts administration CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Set a user's role, e.g. to bootstrap the first administrator
    Promote {
        /// Email of an existing account
        #[arg(long)]
        email: String,
        /// Role to grant
        #[arg(long, default_value = "ADMIN", value_parser = parse_role)]
        role: Role,
    },
    /// Add an email to the invite list
    PreRegister {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
}

fn parse_role(value: &str) -> Result<Role, InvalidRole> {
    Role::from_str(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;

    let pool = db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&pool)
                .await
                .context("Failed to apply migrations")?;
            println!("Migrations applied");
        }
        Commands::Promote { email, role } => {
            let repositories = Repositories::postgres(pool);
            let Some(user) = repositories.users.find_by_email(&email).await? else {
                bail!("No account registered for {email}");
            };

            let update = UserUpdate {
                role: Some(role),
                ..UserUpdate::default()
            };
            let user = repositories
                .users
                .update(user.id, update)
                .await?
                .context("Account disappeared during update")?;

            tracing::info!(
                target: "audit",
                user_id = user.id,
                role = %user.role,
                "User role changed from CLI"
            );
            println!("{} is now {}", user.email, user.role);
        }
        Commands::PreRegister { email, name } => {
            let repositories = Repositories::postgres(pool);
            let entry = repositories
                .pre_registered_users
                .create(NewPreRegisteredUser { email, name })
                .await;

            match entry {
                Ok(entry) => println!("Pre-registered {} (id {})", entry.email, entry.id),
                Err(RepositoryError::UniqueViolation(_)) => {
                    bail!("Email is already on the invite list")
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
