use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use meals_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::{activity_log, UserRole},
    services::{
        activity::ActivityService,
        users::{NewUser, UserService},
    },
};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to apply migrations")?;
            println!("Migrations applied");
        }
        Commands::CreateUser(args) => handle_create_user(&context, args, cli.json).await?,
        Commands::RecentActivity(args) => {
            handle_recent_activity(&context, args, cli.json).await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "meals-cli", about = "Maintenance commands for the meals API", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Create an account with an explicit role
    CreateUser(CreateUserArgs),
    /// Print the newest activity log entries
    RecentActivity(RecentActivityArgs),
}

#[derive(Args)]
struct CreateUserArgs {
    #[arg(long, help = "Display name")]
    name: String,
    #[arg(long, help = "Login email")]
    email: String,
    #[arg(long, help = "Initial password")]
    password: String,
    #[arg(long, default_value = "customer", help = "admin, customer, delivery or ambassador")]
    role: UserRole,
}

#[derive(Args)]
struct RecentActivityArgs {
    #[arg(long, default_value_t = 10, help = "Number of entries, at most 100")]
    limit: u64,
}

struct CliContext {
    _config: AppConfig,
    db: Arc<DbPool>,
    activity: Arc<ActivityService>,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);
        let activity = Arc::new(ActivityService::new(db.clone()));

        Ok(Self {
            _config: config,
            db,
            activity,
        })
    }

    fn user_service(&self) -> UserService {
        UserService::new(self.db.clone(), self.activity.clone())
    }
}

async fn handle_create_user(context: &CliContext, args: CreateUserArgs, json: bool) -> Result<()> {
    let user = context
        .user_service()
        .create(NewUser {
            name: args.name,
            email: args.email,
            password: args.password,
            role: args.role,
        })
        .await
        .context("failed to create user")?;

    if json {
        print_json(&user)?;
    } else {
        println!("Created {} {} (id {})", user.role, user.email, user.id);
    }
    Ok(())
}

async fn handle_recent_activity(
    context: &CliContext,
    args: RecentActivityArgs,
    json: bool,
) -> Result<()> {
    let entries = context
        .activity
        .recent(args.limit)
        .await
        .context("failed to load activity")?;

    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("No activity recorded yet");
    } else {
        for entry in &entries {
            render_activity(entry);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_activity(entry: &activity_log::Model) {
    println!(
        "- {} • {} • {} • {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.activity_type,
        entry.action,
        entry.description
    );
}
