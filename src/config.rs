//! Settings and the assembly of the application router.

use std::{path::Path, sync::Arc};

use axum::{
    Router,
    extract::State,
    middleware,
    response::Redirect,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use clap::Args;
use diesel_migrations::MigrationHarness;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{
    MIGRATIONS,
    auth::{
        AuthError, User,
        login::{do_login, do_logout, login_page},
        register::{do_register, register_page},
    },
    dashboard, locations, meets,
    msg::clear_flashed,
    sitemodule::{ModuleRegistry, RegistryError},
    state::{AppState, DbPool, tx_commit},
    teams, userprofile,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("the secret key must be at least 64 bytes long")]
    ShortSecretKey,
    #[error(transparent)]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("failed to run migrations: {0}")]
    Migrations(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub secret_key: Option<String>,
    pub bind_address: String,
    /// Labels of modules whose pages answer 404.
    pub disabled_modules: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "cworg.db".to_string(),
            secret_key: None,
            bind_address: "127.0.0.1:8000".to_string(),
            disabled_modules: Vec::new(),
        }
    }
}

/// Values given on the command line or through the environment. Flags win
/// over environment variables, and both win over the settings file.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Path of a TOML settings file.
    #[arg(long, env = "CWORG_CONFIG")]
    pub config: Option<String>,
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,
    #[arg(long = "bind", env = "BIND_ADDRESS")]
    pub bind_address: Option<String>,
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self, StartupError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads the settings file if there is one, then applies `overrides`.
    pub fn load(overrides: &Overrides) -> Result<Self, StartupError> {
        let settings = match &overrides.config {
            Some(path) => Self::read(Path::new(path))?,
            None => Self::default(),
        };
        Ok(settings.merge(overrides))
    }

    fn read(path: &Path) -> Result<Self, StartupError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| StartupError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let settings = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded settings file");
        Ok(settings)
    }

    pub fn merge(mut self, overrides: &Overrides) -> Self {
        if let Some(url) = &overrides.database_url {
            self.database_url = url.clone();
        }
        if let Some(secret) = &overrides.secret_key {
            self.secret_key = Some(secret.clone());
        }
        if let Some(addr) = &overrides.bind_address {
            self.bind_address = addr.clone();
        }
        self
    }

    /// The cookie key. Without a configured secret a random key is used, so
    /// sessions do not survive a restart.
    pub fn key(&self) -> Result<Key, StartupError> {
        match &self.secret_key {
            Some(secret) => Key::try_from(secret.as_bytes())
                .map_err(|_| StartupError::ShortSecretKey),
            None => {
                tracing::warn!(
                    "no secret key is configured; logins will not survive a restart"
                );
                Ok(Key::generate())
            }
        }
    }
}

/// Every site module of the application; those labelled in `disabled` are
/// registered but switched off.
pub fn site_registry(disabled: &[String]) -> Result<ModuleRegistry, RegistryError> {
    let mut registry = ModuleRegistry::new();
    for module in [
        dashboard::module(),
        meets::module(),
        teams::module(),
        locations::module(),
        userprofile::module(),
    ] {
        let enabled = !disabled.iter().any(|label| label == module.label);
        registry.register(module.enabled(enabled))?;
    }
    Ok(registry)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), StartupError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StartupError::Migrations(e.to_string()))?;
    if !applied.is_empty() {
        tracing::info!(count = applied.len(), "applied migrations");
    }
    Ok(())
}

/// Sends a user to the first module they may see.
async fn home(
    user: Result<User, AuthError>,
    State(registry): State<Arc<ModuleRegistry>>,
) -> Result<Redirect, AuthError> {
    let user = match user {
        Ok(user) => user,
        Err(AuthError::Unauthorized(_)) => return Ok(Redirect::to("/login")),
        Err(e) => return Err(e),
    };
    Ok(registry
        .available_modules(Some(&user))
        .into_iter()
        .find_map(|m| m.index_url().ok())
        .map(|url| Redirect::to(&url))
        .unwrap_or_else(|| Redirect::to("/login")))
}

/// Migrates the database and builds the router.
pub fn build_app(
    pool: DbPool,
    key: Key,
    registry: ModuleRegistry,
) -> Result<Router, StartupError> {
    run_migrations(&pool)?;

    let state = AppState {
        pool,
        key,
        registry: Arc::new(registry),
    };

    Ok(Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(do_login))
        .route("/register", get(register_page).post(do_register))
        .route("/logout", post(do_logout))
        .merge(state.registry.urls())
        .layer(middleware::from_fn(clear_flashed))
        .layer(middleware::from_fn(tx_commit))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// The application with a fixed cookie key, for tests.
#[cfg(test)]
pub fn create_app(pool: DbPool, disabled: &[String]) -> Router {
    let registry = site_registry(disabled).expect("the modules register");
    build_app(pool, Key::from(&[0u8; 64]), registry).expect("the application builds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_the_file() {
        let file = Settings::from_toml(
            r#"
            database_url = "/srv/cworg.db"
            bind_address = "0.0.0.0:80"
            "#,
        )
        .unwrap();
        assert_eq!(file.database_url, "/srv/cworg.db");
        assert_eq!(file.secret_key, None);

        let merged = file.merge(&Overrides {
            bind_address: Some("127.0.0.1:9000".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.database_url, "/srv/cworg.db");
        assert_eq!(merged.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn short_secret_keys_are_refused() {
        let settings = Settings {
            secret_key: Some("too short".to_string()),
            ..Default::default()
        };
        assert!(matches!(settings.key(), Err(StartupError::ShortSecretKey)));

        let settings = Settings {
            secret_key: Some("k".repeat(64)),
            ..Default::default()
        };
        assert!(settings.key().is_ok());
    }

    #[test]
    fn every_module_registers() {
        let registry = site_registry(&[]).unwrap();
        let labels = registry
            .modules()
            .iter()
            .map(|m| m.label)
            .collect::<Vec<_>>();
        assert_eq!(labels[0], "dashboard");
        for label in ["meets", "teams", "locations", "users"] {
            assert!(labels.contains(&label), "{label} is missing");
        }
    }

    #[test]
    fn disabled_modules_stay_registered() {
        let registry = site_registry(&["locations".to_string()]).unwrap();
        assert!(!registry.module("locations").unwrap().enabled);
        assert!(registry.module("meets").unwrap().enabled);
        assert!(
            !registry
                .enabled_modules()
                .iter()
                .any(|m| m.label == "locations")
        );

        let settings = Settings::from_toml(r#"disabled_modules = ["locations"]"#).unwrap();
        assert_eq!(settings.disabled_modules, vec!["locations".to_string()]);
    }
}
