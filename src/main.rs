use clap::{Parser, Subcommand};
use cworg::{
    auth::register::{NewUser, create_user},
    config::{Overrides, Settings, StartupError, build_app, run_migrations, site_registry},
    state::build_pool,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cworg", about = "Team scheduling and rosters")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (the default).
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Create an account with every permission.
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CWORG_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Save(#[from] cworg::error::SaveError),
    #[error(transparent)]
    Pool(#[from] diesel::r2d2::PoolError),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cworg=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.overrides)?;
    tracing::info!(database = %settings.database_url, "using database");
    let pool = build_pool(&settings.database_url)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let registry = site_registry(&settings.disabled_modules)
                .map_err(StartupError::from)?;
            let app = build_app(pool, settings.key()?, registry)?;
            let listener =
                tokio::net::TcpListener::bind(&settings.bind_address).await?;
            tracing::info!(address = %settings.bind_address, "listening");
            axum::serve(listener, app).await?;
        }
        Command::Migrate => run_migrations(&pool)?,
        Command::CreateSuperuser {
            username,
            email,
            password,
        } => {
            run_migrations(&pool)?;
            let mut conn = pool.get()?;
            let user = create_user(
                NewUser {
                    username: &username,
                    email: &email,
                    password: &password,
                    first_name: "",
                    last_name: "",
                    is_staff: true,
                    is_superuser: true,
                },
                &mut *conn,
            )?;
            tracing::info!(user = user.id, "created superuser {}", user.username);
        }
    }
    Ok(())
}
