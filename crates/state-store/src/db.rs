//! Database initialization, migration, and connection management.

use std::{
    env,
    fs::OpenOptions,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use sqlx::{SqlitePool, migrate::Migrator, sqlite::SqlitePoolOptions};
use tracing::{info, warn};
use url::Url;

use crate::{DbError, DbResult, settings};
use fb_types::ENGINE_TEMPLATE_KEY;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DB_ENV: &str = "FB_DB_URL";

/// Pooled connection plus the metadata callers need for logging and tests.
#[derive(Debug, Clone)]
pub struct DbHandle {
    pub pool: SqlitePool,
    pub url: String,
    pub path: Option<PathBuf>,
    pub freshly_created: bool,
}

impl DbHandle {
    pub fn into_pool(self) -> SqlitePool {
        self.pool
    }
}

struct DbLocation {
    url: String,
    path: Option<PathBuf>,
    freshly_created: bool,
}

/// Return a human-friendly string describing where the master DB will live.
/// Prefers a filesystem path when available, otherwise returns the configured URL.
pub fn display_db_path() -> String {
    if let Ok(val) = env::var(DB_ENV) {
        return val;
    }
    default_db_path().display().to_string()
}

/// Establish the pooled SQLite connection for master state.
pub async fn open_db() -> DbResult<DbHandle> {
    let location = resolve_location().await?;
    init_pool(location).await
}

/// Bring a database up to the current schema.
///
/// Legacy renames run before the sqlx migrator so databases carried over from
/// the old panel line up with the migration's table names; the engine-template
/// fan-copy runs after so freshly created tables exist.
pub async fn migrate(handle: &DbHandle) -> DbResult<()> {
    run_legacy_renames(&handle.pool).await?;
    MIGRATOR.run(&handle.pool).await?;
    copy_engine_template_to_slaves(&handle.pool).await?;
    if handle.freshly_created {
        warn!(db = %display_path(handle), "initialized master database and applied migrations");
    }
    Ok(())
}

/// Old deployments named the fleet table `nodes` and the inbound owner column
/// `node_id`. Rename both in place when present so the schema migration and
/// every query see one set of names.
async fn run_legacy_renames(pool: &SqlitePool) -> DbResult<()> {
    if table_exists(pool, "nodes").await? && !table_exists(pool, "slaves").await? {
        info!("renaming legacy table nodes -> slaves");
        sqlx::query("ALTER TABLE nodes RENAME TO slaves").execute(pool).await?;
    }
    if table_exists(pool, "inbounds").await? && column_exists(pool, "inbounds", "node_id").await? {
        info!("renaming legacy column inbounds.node_id -> slave_id");
        sqlx::query("ALTER TABLE inbounds RENAME COLUMN node_id TO slave_id")
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Seed every slave's template row from the tenant-wide default, once. A
/// database that already carries any per-slave template is left alone.
async fn copy_engine_template_to_slaves(pool: &SqlitePool) -> DbResult<()> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM slave_settings WHERE setting_key = ?",
    )
    .bind(ENGINE_TEMPLATE_KEY)
    .fetch_one(pool)
    .await?;
    if existing > 0 {
        return Ok(());
    }

    let Some(template) = settings::get_setting(pool, ENGINE_TEMPLATE_KEY).await? else {
        return Ok(());
    };
    if template.is_empty() {
        return Ok(());
    }

    let slave_ids = sqlx::query_scalar::<_, i64>("SELECT id FROM slaves").fetch_all(pool).await?;
    for slave_id in &slave_ids {
        settings::set_slave_setting(pool, *slave_id, ENGINE_TEMPLATE_KEY, &template).await?;
    }
    if !slave_ids.is_empty() {
        info!(slaves = slave_ids.len(), "copied tenant engine template to per-slave settings");
    }
    Ok(())
}

async fn table_exists(pool: &SqlitePool, name: &str) -> DbResult<bool> {
    let row = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ? LIMIT 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> DbResult<bool> {
    let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM pragma_table_info(?) WHERE name = ? LIMIT 1")
        .bind(table)
        .bind(column)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Flush the WAL into the main database file.
pub async fn checkpoint(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query("PRAGMA wal_checkpoint;").execute(pool).await?;
    Ok(())
}

/// Open the provided sqlite DB path with a throw-away connection and run a
/// PRAGMA integrity_check to ensure the file is structurally sound. Does not
/// mutate global state or run migrations.
pub async fn validate_db(path: &Path) -> DbResult<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(DbError::InvalidPath(path.to_path_buf()));
    }
    let url = sqlite_url_from_path(path)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .map_err(|e| DbError::ConnectionFailed { path: url.clone(), source: e })?;
    let result: String = sqlx::query_scalar("PRAGMA integrity_check;").fetch_one(&pool).await?;
    pool.close().await;
    if result != "ok" {
        return Err(DbError::IntegrityCheckFailed(result));
    }
    Ok(())
}

async fn resolve_location() -> DbResult<DbLocation> {
    if let Ok(value) = env::var(DB_ENV) {
        return build_location_from_env(value).await;
    }
    build_location_from_path(default_db_path()).await
}

async fn build_location_from_env(value: String) -> DbResult<DbLocation> {
    if value.starts_with("sqlite:") {
        Ok(DbLocation {
            url: value,
            path: None,
            freshly_created: false,
        })
    } else {
        build_location_from_path(PathBuf::from(value)).await
    }
}

async fn build_location_from_path(path: PathBuf) -> DbResult<DbLocation> {
    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DbError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    if !existed {
        let path_clone = path.clone();
        tokio::task::spawn_blocking(move || create_secure_file(&path_clone))
            .await
            .map_err(|e| DbError::TaskPanicked(e.to_string()))??;
    }
    let url = sqlite_url_from_path(&path)?;
    Ok(DbLocation {
        url,
        path: Some(path),
        freshly_created: !existed,
    })
}

fn create_secure_file(path: &Path) -> DbResult<()> {
    let mut options = OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(DbError::Io(err)),
    }
}

pub(crate) fn sqlite_url_from_path(path: &Path) -> DbResult<String> {
    let url = Url::from_file_path(path).map_err(|_| DbError::InvalidPath(path.to_path_buf()))?;
    let mut url_string: String = url.into();
    url_string.replace_range(..4, "sqlite");
    Ok(url_string)
}

async fn init_pool(location: DbLocation) -> DbResult<DbHandle> {
    let max_connections = env::var("FB_DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&location.url)
        .await
        .map_err(|e| DbError::ConnectionFailed {
            path: location.url.clone(),
            source: e,
        })?;

    Ok(DbHandle {
        pool,
        url: location.url,
        path: location.path,
        freshly_created: location.freshly_created,
    })
}

fn default_db_path() -> PathBuf {
    preferred_state_dir().join("fleetbridge").join("master.db")
}

fn preferred_state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| fallback_home().join(".local/state"))
}

fn fallback_home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn display_path(handle: &DbHandle) -> String {
    handle
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| handle.url.clone())
}
