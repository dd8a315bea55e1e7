//! Backend entry-point: prepares storage, then serves the GraphQL endpoint,
//! health checks and OpenAPI docs.

mod server;

use std::ffi::OsString;
use std::sync::Arc;

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use postboard::domain::graph::{Executor, Schema, SchemaError};
use postboard::domain::ports::EntityStore;
use postboard::inbound::http::health::HealthState;
use postboard::outbound::persistence::{
    DbPool, DieselEntityStore, MigrationError, PoolConfig, PoolError, run_migrations,
};
use postboard::settings::{AppSettings, SettingsError};
use server::{ServerConfig, create_server};

/// Failures that stop the process before the listener starts.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Migrations(#[from] MigrationError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

impl From<StartupError> for std::io::Error {
    fn from(err: StartupError) -> Self {
        std::io::Error::other(err.to_string())
    }
}

/// Load settings from the given argument list, the environment and any
/// configuration file.
fn load_settings<I, T>(args: I) -> Result<AppSettings, StartupError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    AppSettings::load_from_iter(args).map_err(|err| StartupError::Config(err.to_string()))
}

/// Migrate the database and build the executor serving it.
async fn prepare_executor(settings: &AppSettings) -> Result<Arc<Executor>, StartupError> {
    let database_file = settings.database_file()?;
    let applied = run_migrations(database_file).await?;
    info!(database = database_file, applied, "database ready");

    let pool = DbPool::new(PoolConfig::new(database_file).with_max_size(settings.pool_max_size))
        .await?;
    let store: Arc<dyn EntityStore> = Arc::new(DieselEntityStore::new(pool));
    let schema = Arc::new(Schema::build()?);
    Ok(Arc::new(Executor::new(schema, store)))
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = load_settings(std::env::args_os())
        .inspect_err(|err| error!(error = %err, "startup aborted"))?;
    let executor = prepare_executor(&settings)
        .await
        .inspect_err(|err| error!(error = %err, "startup aborted"))?;

    let config = ServerConfig::new(executor, settings.bind_addr());
    let port = config.bind_addr().port();
    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), config)?;
    info!(url = %format!("http://localhost:{port}/graphql"), "server ready");

    let outcome = server.await;
    health_state.mark_unhealthy();
    info!("server stopped");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use env_lock::lock_env;
    use rstest::rstest;

    fn cleared_env() -> [(&'static str, Option<String>); 3] {
        [
            ("POSTBOARD_DB_FILE_NAME", None),
            ("POSTBOARD_PORT", None),
            ("POSTBOARD_POOL_MAX_SIZE", None),
        ]
    }

    #[rstest]
    fn settings_load_from_the_command_line() {
        let _guard = lock_env(cleared_env());

        let settings =
            load_settings(["postboard", "--db-file-name", "board.db"]).expect("settings load");

        assert_eq!(settings.database_file(), Ok("board.db"));
        assert_eq!(settings.bind_addr().port(), postboard::settings::DEFAULT_PORT);
    }

    #[rstest]
    fn unknown_flags_abort_startup() {
        let _guard = lock_env(cleared_env());

        let err = load_settings(["postboard", "--no-such-flag"]).expect_err("unknown flag");

        assert!(matches!(err, StartupError::Config(_)));
    }
}
