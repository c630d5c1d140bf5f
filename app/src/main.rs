// ==============================================================================
// main.rs - Exomiser Portal Admin CLI
// ==============================================================================
// Description: Operator commands: schema bootstrap, admin accounts, database
//              inspection and phenopacket preview
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exomiser_core::config::{Settings, DEFAULT_DATABASE_URL};
use exomiser_core::db::{self, analyses, individuals, users};
use exomiser_core::forms::normalize_email;
use exomiser_core::{phenopacket, security};

#[derive(Parser, Debug)]
#[command(author, version, about = "Exomiser portal administration", long_about = None)]
struct Args {
    /// Database URL
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create all tables if they do not exist
    InitDb,

    /// Create an active administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long, default_value = "System Admin")]
        name: String,
    },

    /// Print table counts and a sample of individuals and analyses
    CheckDb,

    /// Print freshly generated phenopacket YAML for an individual
    Phenopacket {
        /// External identifier (e.g. P0001)
        identity: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exomiser_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();

    let pool = db::connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;

    match args.command {
        Command::InitDb => {
            db::init_schema(&pool).await.context("Failed to create schema")?;
            println!("Database initialized");
        }

        Command::CreateAdmin {
            email,
            password,
            name,
        } => {
            db::init_schema(&pool).await.context("Failed to create schema")?;
            create_admin(&pool, &email, &password, &name).await?;
        }

        Command::CheckDb => check_db(&pool).await?,

        Command::Phenopacket { identity } => {
            let settings = Settings::from_env()?;
            let individual = individuals::find_by_identity(&pool, &identity)
                .await?
                .with_context(|| format!("Individual '{}' not found", identity))?;
            let yaml = phenopacket::for_individual(&individual, &settings.storage.vcf_uri_prefix)?;
            print!("{}", yaml);
        }
    }

    Ok(())
}

async fn create_admin(
    pool: &sqlx::SqlitePool,
    email: &str,
    password: &str,
    name: &str,
) -> Result<()> {
    let email = normalize_email(email);

    if let Some(existing) = users::find_by_email(pool, &email).await? {
        println!("User with email {} already exists", existing.email);
        println!("Admin status: {}", if existing.is_admin { "Yes" } else { "No" });
        return Ok(());
    }

    security::check_password_length(password)?;
    let password_hash = security::hash_password(password)?;

    let user = users::create(pool, &email, &password_hash, Some(name), true, true).await?;
    info!("Created admin user {}", user.id);

    println!("Admin user created");
    println!("Email: {}", user.email);
    println!("Name: {}", name);
    Ok(())
}

async fn check_db(pool: &sqlx::SqlitePool) -> Result<()> {
    println!("Tables:");
    for (table, count) in db::table_counts(pool).await? {
        println!("  {:<12} {} record(s)", table, count);
    }

    let sample = individuals::list(pool).await?;
    if !sample.is_empty() {
        println!("\nSample individuals:");
        for individual in sample.iter().take(5) {
            println!(
                "  {} - {} ({} HPO term(s))",
                individual.identity,
                individual.full_name,
                individual.hpo_count()
            );
        }
    }

    let sample = analyses::list(pool).await?;
    if !sample.is_empty() {
        println!("\nSample analyses:");
        for analysis in sample.iter().take(5) {
            println!("  {} - {}", analysis.name, analysis.status);
        }
    }

    Ok(())
}
