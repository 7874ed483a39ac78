//! Test utilities for fast, isolated SQLite databases.
//!
//! A migrated "template" database is created once per factory and copied for
//! each test, which keeps parallel tests cheap without sharing state. Set
//! `FB_TEST_DB_PERSIST=1` to keep the files around for debugging.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tokio::sync::OnceCell;

use crate::{DbError, DbHandle, DbResult, migrate};

fn unique_suffix() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    format!("{}-{}-{}", std::process::id(), now, uuid::Uuid::now_v7())
}

async fn connect_file_db(path: &Path, max_connections: u32) -> DbResult<DbHandle> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DbError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    let existed = tokio::fs::try_exists(path).await.unwrap_or(false);
    if !existed {
        let _ = std::fs::OpenOptions::new().create(true).truncate(false).write(true).open(path);
    }

    let url = crate::db::sqlite_url_from_path(path)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .map_err(|e| DbError::ConnectionFailed {
            path: url.clone(),
            source: e,
        })?;

    // Pragmas optimized for tests: speed over durability.
    let _ = sqlx::query("PRAGMA journal_mode = MEMORY").execute(&pool).await;
    let _ = sqlx::query("PRAGMA synchronous = OFF").execute(&pool).await;
    let _ = sqlx::query("PRAGMA temp_store = MEMORY").execute(&pool).await;

    Ok(DbHandle {
        pool,
        url,
        path: Some(path.to_path_buf()),
        freshly_created: true,
    })
}

/// Creates one migrated template DB file and clones it per test.
#[derive(Debug)]
pub struct TestDbFactory {
    root: PathBuf,
    _tempdir: Option<TempDir>,
    template: OnceCell<PathBuf>,
}

impl TestDbFactory {
    pub fn new() -> Self {
        let persist = std::env::var_os("FB_TEST_DB_PERSIST").is_some_and(|v| v != "0");

        let tempdir = tempfile::Builder::new()
            .prefix("fleetbridge-testdb-")
            .tempdir()
            .expect("failed to create temporary directory for test DBs");

        let (root, tempdir) = if persist {
            (tempdir.keep(), None)
        } else {
            (tempdir.path().to_path_buf(), Some(tempdir))
        };
        Self {
            root,
            _tempdir: tempdir,
            template: OnceCell::const_new(),
        }
    }

    async fn template_path(&self) -> DbResult<PathBuf> {
        let path = self
            .template
            .get_or_try_init(|| async {
                let template_path = self.root.join("template_master.db");
                let handle = connect_file_db(&template_path, 1).await?;
                migrate(&handle).await?;
                handle.pool.close().await;
                Ok::<_, DbError>(template_path)
            })
            .await?;
        Ok(path.clone())
    }

    /// Create a migrated master DB for a single test case.
    pub async fn master_db(&self) -> DbResult<DbHandle> {
        let template = self.template_path().await?;
        let target = self.root.join(format!("master_{}.db", unique_suffix()));
        tokio::fs::copy(&template, &target).await.map_err(DbError::Io)?;
        connect_file_db(&target, 5).await
    }
}

impl Default for TestDbFactory {
    fn default() -> Self {
        Self::new()
    }
}
