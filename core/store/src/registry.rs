use algo_platform_schemas::{
    Algorithm, AlgorithmId, AlgorithmSummary, AlgorithmVersion, Category, CategoryId, VersionId,
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use crate::database::{row_to_algorithm, row_to_category, row_to_version, Database};
use crate::error::{Result, StoreError};

impl Database {
    // ========== CATEGORY METHODS ==========

    pub fn create_category(&self, name: &str, description: Option<&str>) -> Result<CategoryId> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("category name is empty".to_string()));
        }

        self.conn.execute(
            "INSERT INTO algorithm_categories (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, Utc::now().to_rfc3339()],
        )?;
        let id = CategoryId(self.conn.last_insert_rowid());

        debug!("Created category '{}' ({})", name, id);
        Ok(id)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM algorithm_categories ORDER BY id")?;
        let categories = stmt
            .query_map([], row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// First category (lowest id) an algorithm is mapped to
    pub fn category_for_algorithm(&self, algorithm_id: AlgorithmId) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT c.id, c.name, c.description
                 FROM algorithm_categories c
                 JOIN algorithm_category_mapping m ON m.category_id = c.id
                 WHERE m.algorithm_id = ?1
                 ORDER BY c.id
                 LIMIT 1",
                params![algorithm_id.0],
                row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    // ========== ALGORITHM METHODS ==========

    /// Register an algorithm together with its first version and category mapping.
    ///
    /// All three rows are written in one transaction; an unknown category
    /// leaves the store untouched.
    pub fn register_algorithm(
        &mut self,
        name: &str,
        description: &str,
        initial_code: &str,
        category_id: CategoryId,
    ) -> Result<AlgorithmId> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("algorithm name is empty".to_string()));
        }
        if initial_code.trim().is_empty() {
            return Err(StoreError::Validation(format!(
                "algorithm '{}' has no code",
                name
            )));
        }

        let tx = self.conn.transaction()?;

        if !Database::category_exists(&tx, category_id)? {
            return Err(StoreError::Validation(format!(
                "category {} does not exist",
                category_id
            )));
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO algorithms (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, now],
        )?;
        let algorithm_id = AlgorithmId(tx.last_insert_rowid());

        tx.execute(
            "INSERT INTO algorithm_versions (algorithm_id, version_number, code, created_at)
             VALUES (?1, 1, ?2, ?3)",
            params![algorithm_id.0, initial_code, now],
        )?;

        tx.execute(
            "INSERT INTO algorithm_category_mapping (algorithm_id, category_id) VALUES (?1, ?2)",
            params![algorithm_id.0, category_id.0],
        )?;

        tx.commit()?;

        info!(
            "Registered algorithm '{}' with ID {} in category {}",
            name, algorithm_id, category_id
        );
        Ok(algorithm_id)
    }

    /// Append a new version numbered one past the current maximum.
    pub fn add_version(&mut self, algorithm_id: AlgorithmId, code: &str) -> Result<VersionId> {
        if code.trim().is_empty() {
            return Err(StoreError::Validation("version code is empty".to_string()));
        }

        let tx = self.conn.transaction()?;

        if !Database::algorithm_exists(&tx, algorithm_id)? {
            return Err(StoreError::NotFound(format!("algorithm {}", algorithm_id)));
        }

        let current_max: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version_number), 0) FROM algorithm_versions WHERE algorithm_id = ?1",
            params![algorithm_id.0],
            |row| row.get(0),
        )?;
        let version_number = current_max + 1;

        tx.execute(
            "INSERT INTO algorithm_versions (algorithm_id, version_number, code, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![algorithm_id.0, version_number, code, Utc::now().to_rfc3339()],
        )?;
        let version_id = VersionId(tx.last_insert_rowid());

        tx.commit()?;

        info!(
            "Created version {} for algorithm {} ({})",
            version_number, algorithm_id, version_id
        );
        Ok(version_id)
    }

    /// Version with the highest version_number
    pub fn latest_version(&self, algorithm_id: AlgorithmId) -> Result<AlgorithmVersion> {
        if !Database::algorithm_exists(&self.conn, algorithm_id)? {
            return Err(StoreError::NotFound(format!("algorithm {}", algorithm_id)));
        }

        self.conn
            .query_row(
                "SELECT id, algorithm_id, version_number, code, created_at
                 FROM algorithm_versions
                 WHERE algorithm_id = ?1
                 ORDER BY version_number DESC, id DESC
                 LIMIT 1",
                params![algorithm_id.0],
                row_to_version,
            )
            .optional()?
            .ok_or_else(|| {
                StoreError::NotFound(format!("algorithm {} has no versions", algorithm_id))
            })
    }

    /// All versions of an algorithm, oldest first
    pub fn versions(&self, algorithm_id: AlgorithmId) -> Result<Vec<AlgorithmVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, algorithm_id, version_number, code, created_at
             FROM algorithm_versions
             WHERE algorithm_id = ?1
             ORDER BY version_number ASC, id ASC",
        )?;
        let versions = stmt
            .query_map(params![algorithm_id.0], row_to_version)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    pub fn get_algorithm(&self, algorithm_id: AlgorithmId) -> Result<Algorithm> {
        self.conn
            .query_row(
                "SELECT id, name, description, created_at FROM algorithms WHERE id = ?1",
                params![algorithm_id.0],
                row_to_algorithm,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("algorithm {}", algorithm_id)))
    }

    /// Every algorithm in identifier order
    pub fn list_algorithms(&self) -> Result<Vec<Algorithm>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description, created_at FROM algorithms ORDER BY id")?;
        let algorithms = stmt
            .query_map([], row_to_algorithm)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(algorithms)
    }

    /// Algorithms with their version and metric counts, ordered by name
    pub fn algorithm_summaries(&self) -> Result<Vec<AlgorithmSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.name,
                    (SELECT COUNT(*) FROM algorithm_versions v WHERE v.algorithm_id = a.id),
                    (SELECT COUNT(*) FROM performance_metrics pm
                     JOIN algorithm_versions v2 ON pm.version_id = v2.id
                     WHERE v2.algorithm_id = a.id)
             FROM algorithms a
             ORDER BY a.name, a.id",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(AlgorithmSummary {
                    id: AlgorithmId(row.get(0)?),
                    name: row.get(1)?,
                    version_count: row.get(2)?,
                    metric_count: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreConfig;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, Database, CategoryId) {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::create(&StoreConfig::new(temp.path())).unwrap();
        let sorting = db.create_category("Sorting", Some("Ordering elements")).unwrap();
        (temp, db, sorting)
    }

    #[test]
    fn test_register_creates_algorithm_version_and_mapping() {
        let (_temp, mut db, sorting) = setup();

        let id = db
            .register_algorithm("Bubble Sort", "A simple sort", "print('sort')", sorting)
            .unwrap();

        let algorithm = db.get_algorithm(id).unwrap();
        assert_eq!(algorithm.name, "Bubble Sort");
        assert_eq!(algorithm.description.as_deref(), Some("A simple sort"));

        let latest = db.latest_version(id).unwrap();
        assert_eq!(latest.version_number, 1);
        assert_eq!(latest.code, "print('sort')");

        let category = db.category_for_algorithm(id).unwrap().unwrap();
        assert_eq!(category.id, sorting);
    }

    #[test]
    fn test_register_with_unknown_category_writes_nothing() {
        let (_temp, mut db, _sorting) = setup();

        let err = db
            .register_algorithm("Quick Sort", "", "code", CategoryId(999))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(db.count_algorithms().unwrap(), 0);
        assert_eq!(db.count_versions().unwrap(), 0);
    }

    #[test]
    fn test_register_rejects_blank_input() {
        let (_temp, mut db, sorting) = setup();

        assert!(matches!(
            db.register_algorithm("  ", "", "code", sorting),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.register_algorithm("Heap Sort", "", "\n", sorting),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_add_version_is_monotonic() {
        let (_temp, mut db, sorting) = setup();
        let id = db.register_algorithm("Merge Sort", "", "v1", sorting).unwrap();

        db.add_version(id, "v2").unwrap();
        db.add_version(id, "v3").unwrap();

        let numbers: Vec<u32> = db
            .versions(id)
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(db.latest_version(id).unwrap().code, "v3");
    }

    #[test]
    fn test_add_version_continues_after_manual_gap() {
        let (_temp, mut db, sorting) = setup();
        let id = db.register_algorithm("Quick Sort", "", "v1", sorting).unwrap();

        db.conn
            .execute(
                "INSERT INTO algorithm_versions (algorithm_id, version_number, code, created_at)
                 VALUES (?1, 7, 'manual', '2025-01-01T00:00:00Z')",
                params![id.0],
            )
            .unwrap();

        let version_id = db.add_version(id, "after gap").unwrap();
        let latest = db.latest_version(id).unwrap();
        assert_eq!(latest.id, version_id);
        assert_eq!(latest.version_number, 8);
    }

    #[test]
    fn test_out_of_range_version_number_is_an_error() {
        let (_temp, mut db, sorting) = setup();
        let id = db.register_algorithm("Quick Sort", "", "v1", sorting).unwrap();

        db.conn
            .execute(
                "INSERT INTO algorithm_versions (algorithm_id, version_number, code, created_at)
                 VALUES (?1, ?2, 'manual', '2025-01-01T00:00:00Z')",
                params![id.0, i64::from(u32::MAX) + 1],
            )
            .unwrap();

        // Never silently truncated to a small number
        assert!(matches!(
            db.latest_version(id),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn test_add_version_unknown_algorithm() {
        let (_temp, mut db, _sorting) = setup();

        let err = db.add_version(AlgorithmId(42), "code").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_latest_version_without_versions() {
        let (_temp, db, _sorting) = setup();
        db.conn
            .execute(
                "INSERT INTO algorithms (name, description, created_at) VALUES ('Empty', NULL, '2025-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        let id = AlgorithmId(db.conn.last_insert_rowid());

        match db.latest_version(id) {
            Err(StoreError::NotFound(message)) => assert!(message.contains("no versions")),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert!(matches!(
            db.latest_version(AlgorithmId(404)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_algorithms_in_id_order() {
        let (_temp, mut db, sorting) = setup();
        let b = db.register_algorithm("B", "", "b", sorting).unwrap();
        let a = db.register_algorithm("A", "", "a", sorting).unwrap();

        let ids: Vec<AlgorithmId> = db.list_algorithms().unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![b, a]);

        let summaries = db.algorithm_summaries().unwrap();
        assert_eq!(summaries[0].name, "A");
        assert_eq!(summaries[0].version_count, 1);
        assert_eq!(summaries[0].metric_count, 0);
    }
}
