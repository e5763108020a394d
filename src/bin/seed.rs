//! Creates the initial moderation accounts.
//!
//! `admin` and `reviewer` are inserted when missing; existing users are left untouched.

use sqlx::postgres::PgPoolOptions;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use travel_notes::{
    config::{AppConfig, Env},
    models::{NewUser, Role},
    repository::{PostgresRepository, Repository},
};

struct SeedAccount {
    username: &'static str,
    nickname: &'static str,
    role: Role,
    password_var: &'static str,
    local_default: &'static str,
}

const ACCOUNTS: &[SeedAccount] = &[
    SeedAccount {
        username: "admin",
        nickname: "Administrator",
        role: Role::Admin,
        password_var: "SEED_ADMIN_PASSWORD",
        local_default: "admin123",
    },
    SeedAccount {
        username: "reviewer",
        nickname: "Reviewer",
        role: Role::Reviewer,
        password_var: "SEED_REVIEWER_PASSWORD",
        local_default: "reviewer123",
    },
];

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seed=info,travel_notes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let repo = PostgresRepository::new(pool);

    for account in ACCOUNTS {
        match repo.find_user_by_username(account.username).await {
            Ok(Some(_)) => {
                tracing::info!(username = account.username, "account exists, skipping");
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(username = account.username, error = %e, "lookup failed");
                std::process::exit(1);
            }
        }

        let password = match (env::var(account.password_var), &config.env) {
            (Ok(value), _) => value,
            (Err(_), Env::Local) => account.local_default.to_string(),
            (Err(_), Env::Production) => {
                panic!("FATAL: {} must be set in production.", account.password_var)
            }
        };

        let new_user = match NewUser::new(account.username, &password, account.nickname, account.role).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(username = account.username, error = %e, "hashing failed");
                std::process::exit(1);
            }
        };

        match repo.create_user(new_user).await {
            Ok(user) => tracing::info!(username = %user.username, role = ?user.role, "account created"),
            Err(e) => {
                tracing::error!(username = account.username, error = %e, "create failed");
                std::process::exit(1);
            }
        }
    }
}
