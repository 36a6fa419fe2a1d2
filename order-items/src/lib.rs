#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod config;
pub mod db;
pub mod model;
pub mod runner;
pub mod schema;
pub mod tracing_setup;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;
use tracing::info;

use config::Config;
use model::{DaoError, RelationStrategy};
use runner::RunReport;

embed_migrations!();

pub type StorePool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type StoreDatabase = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

/// Applied to every pooled connection when it is opened.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
    read_uncommitted: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!("PRAGMA busy_timeout = {};", self.busy_timeout_ms);
        // Shared-cache readers otherwise fail with "table is locked" while the
        // writer holds the table.
        if self.read_uncommitted {
            pragmas.push_str(" PRAGMA read_uncommitted = 1;");
        }

        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn establish_pool(config: &Config) -> Result<StorePool, DaoError> {
    let manager = ConnectionManager::<SqliteConnection>::new(config.database_url.as_str());

    // An in-memory database lives only as long as one of its connections, so
    // pooled connections are never retired.
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .idle_timeout(None)
        .max_lifetime(None)
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout_ms: config.busy_timeout_ms,
            read_uncommitted: config.is_shared_cache(),
        }))
        .build(manager)?;

    Ok(pool)
}

pub fn run_db_migrations(pool: &StorePool) -> Result<(), DaoError> {
    let conn = pool.get()?;
    embedded_migrations::run(&*conn)?;

    Ok(())
}

/// Shared entry point of the demo binaries: configure, create the schema, then
/// run the writer and both readers against one pool.
pub fn launch(strategy: RelationStrategy) -> Result<RunReport, DaoError> {
    let config = Config::from_env()?;
    tracing_setup::init_tracing(&config);

    info!(%strategy, database_url = %config.database_url, "starting");

    let pool = establish_pool(&config)?;
    run_db_migrations(&pool)?;

    runner::run_concurrently(&pool, &config, strategy)
}
