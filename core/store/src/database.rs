use algo_platform_schemas::{Algorithm, AlgorithmId, AlgorithmVersion, Category, CategoryId, VersionId};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, StoreError};

/// Tables every operation relies on. `Database::open` refuses a store missing any of them.
pub const REQUIRED_TABLES: &[&str] = &[
    "algorithms",
    "algorithm_versions",
    "algorithm_categories",
    "algorithm_category_mapping",
    "performance_metrics",
    "improvements",
    "feedback",
];

/// Location of the persisted store, passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Create the store if needed and bootstrap every table and index
    pub fn create(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.db_path)?;
        let db = Self { conn };
        db.enable_foreign_keys()?;
        db.init_schema()?;

        info!("Database initialized at {}", config.db_path.display());
        Ok(db)
    }

    /// Open an existing, already bootstrapped store.
    ///
    /// Fails before touching anything if the file is absent or the schema is
    /// incomplete.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if !config.db_path.exists() {
            return Err(StoreError::Unreachable(format!(
                "no store at {}",
                config.db_path.display()
            )));
        }

        let conn = Connection::open_with_flags(&config.db_path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| {
                StoreError::Unreachable(format!("{}: {}", config.db_path.display(), e))
            })?;
        let db = Self { conn };

        let mut missing = Vec::new();
        for &table in REQUIRED_TABLES {
            if !db.has_table(table)? {
                missing.push(table);
            }
        }
        if !missing.is_empty() {
            return Err(StoreError::SchemaMissing(format!(
                "{} lacks tables: {}",
                config.db_path.display(),
                missing.join(", ")
            )));
        }

        db.enable_foreign_keys()?;
        debug!("Opened store at {}", config.db_path.display());
        Ok(db)
    }

    fn enable_foreign_keys(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Check if a table exists
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    /// Create all tables and indexes
    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS algorithms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Version numbers are unique per algorithm by registry convention only
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS algorithm_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                algorithm_id INTEGER NOT NULL,
                version_number INTEGER NOT NULL,
                code TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (algorithm_id) REFERENCES algorithms(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS algorithm_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS algorithm_category_mapping (
                algorithm_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (algorithm_id, category_id),
                FOREIGN KEY (algorithm_id) REFERENCES algorithms(id),
                FOREIGN KEY (category_id) REFERENCES algorithm_categories(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS performance_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL,
                input_size INTEGER NOT NULL,
                execution_time REAL NOT NULL,
                memory_usage REAL NOT NULL,
                platform TEXT,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (version_id) REFERENCES algorithm_versions(id)
            )",
            [],
        )?;

        // Version references on notes are checked at commit so the cascade can
        // remove versions before the notes pointing at them.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS improvements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                algorithm_id INTEGER NOT NULL,
                old_version_id INTEGER NOT NULL,
                new_version_id INTEGER NOT NULL,
                improvement_note TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (algorithm_id) REFERENCES algorithms(id),
                FOREIGN KEY (old_version_id) REFERENCES algorithm_versions(id)
                    DEFERRABLE INITIALLY DEFERRED,
                FOREIGN KEY (new_version_id) REFERENCES algorithm_versions(id)
                    DEFERRABLE INITIALLY DEFERRED
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                algorithm_id INTEGER NOT NULL,
                version_id INTEGER NOT NULL,
                feedback_text TEXT NOT NULL,
                rating INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (algorithm_id) REFERENCES algorithms(id),
                FOREIGN KEY (version_id) REFERENCES algorithm_versions(id)
                    DEFERRABLE INITIALLY DEFERRED
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_versions_number ON algorithm_versions(algorithm_id, version_number DESC)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metrics_version ON performance_metrics(version_id, input_size)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_algorithms_name ON algorithms(name)",
            [],
        )?;

        Ok(())
    }

    pub fn count_algorithms(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM algorithms", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_versions(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM algorithm_versions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_categories(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM algorithm_categories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub(crate) fn algorithm_exists(conn: &Connection, id: AlgorithmId) -> Result<bool> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM algorithms WHERE id = ?1",
                params![id.0],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    pub(crate) fn category_exists(conn: &Connection, id: CategoryId) -> Result<bool> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM algorithm_categories WHERE id = ?1",
                params![id.0],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    /// Owning algorithm of a version, if the version exists
    pub(crate) fn version_owner(conn: &Connection, id: VersionId) -> Result<Option<AlgorithmId>> {
        let owner = conn
            .query_row(
                "SELECT algorithm_id FROM algorithm_versions WHERE id = ?1",
                params![id.0],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(owner.map(AlgorithmId))
    }
}

pub(crate) fn row_to_algorithm(row: &Row) -> rusqlite::Result<Algorithm> {
    Ok(Algorithm {
        id: AlgorithmId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub(crate) fn row_to_version(row: &Row) -> rusqlite::Result<AlgorithmVersion> {
    Ok(AlgorithmVersion {
        id: VersionId(row.get(0)?),
        algorithm_id: AlgorithmId(row.get(1)?),
        version_number: row.get(2)?,
        code: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: CategoryId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
    })
}
