use algo_platform_schemas::AlgorithmId;
use rusqlite::{params, Transaction};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// One deletion in the cascade for a discarded algorithm. `?1` is the algorithm id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    pub table: &'static str,
    pub sql: &'static str,
}

/// Dependency order for removing an algorithm: every step only deletes rows
/// whose dependents are already gone.
pub const CASCADE_ORDER: [CascadeStep; 6] = [
    CascadeStep {
        table: "performance_metrics",
        sql: "DELETE FROM performance_metrics
              WHERE version_id IN (SELECT id FROM algorithm_versions WHERE algorithm_id = ?1)",
    },
    CascadeStep {
        table: "algorithm_versions",
        sql: "DELETE FROM algorithm_versions WHERE algorithm_id = ?1",
    },
    CascadeStep {
        table: "improvements",
        sql: "DELETE FROM improvements WHERE algorithm_id = ?1",
    },
    CascadeStep {
        table: "feedback",
        sql: "DELETE FROM feedback WHERE algorithm_id = ?1",
    },
    CascadeStep {
        table: "algorithm_category_mapping",
        sql: "DELETE FROM algorithm_category_mapping WHERE algorithm_id = ?1",
    },
    CascadeStep {
        table: "algorithms",
        sql: "DELETE FROM algorithms WHERE id = ?1",
    },
];

/// Algorithms sharing a name: the earliest one survives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub name: String,
    pub keep: AlgorithmId,
    pub discard: Vec<AlgorithmId>,
}

/// Rows removed per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletedRows {
    pub metrics: usize,
    pub versions: usize,
    pub improvements: usize,
    pub feedback: usize,
    pub mappings: usize,
    pub algorithms: usize,
}

impl DeletedRows {
    fn add(&mut self, table: &str, count: usize) {
        match table {
            "performance_metrics" => self.metrics += count,
            "algorithm_versions" => self.versions += count,
            "improvements" => self.improvements += count,
            "feedback" => self.feedback += count,
            "algorithm_category_mapping" => self.mappings += count,
            "algorithms" => self.algorithms += count,
            _ => {}
        }
    }

    fn merge(&mut self, other: &DeletedRows) {
        self.metrics += other.metrics;
        self.versions += other.versions;
        self.improvements += other.improvements;
        self.feedback += other.feedback;
        self.mappings += other.mappings;
        self.algorithms += other.algorithms;
    }

    pub fn total(&self) -> usize {
        self.metrics
            + self.versions
            + self.improvements
            + self.feedback
            + self.mappings
            + self.algorithms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Committed { deleted: DeletedRows },
    RolledBack { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub group: DuplicateGroup,
    pub outcome: GroupOutcome,
}

/// Result of a dedup pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupReport {
    pub groups: Vec<GroupReport>,
    pub deleted: DeletedRows,
}

impl DedupReport {
    pub fn committed(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Committed { .. }))
            .count()
    }

    pub fn rolled_back(&self) -> usize {
        self.groups.len() - self.committed()
    }
}

/// Orphan counts per dependent table; all zero on a consistent store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub orphan_metrics: usize,
    pub orphan_versions: usize,
    pub orphan_improvements: usize,
    pub orphan_feedback: usize,
    pub orphan_mappings: usize,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        *self == IntegrityReport::default()
    }
}

/// Group algorithms by name and pick the smallest id in each group as the keeper.
pub fn find_duplicate_groups(db: &Database) -> Result<Vec<DuplicateGroup>> {
    let mut stmt = db.conn.prepare(
        "SELECT name FROM algorithms GROUP BY name HAVING COUNT(*) > 1 ORDER BY MIN(id)",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut ids_stmt = db
        .conn
        .prepare("SELECT id FROM algorithms WHERE name = ?1 ORDER BY id")?;

    let mut groups = Vec::with_capacity(names.len());
    for name in names {
        let ids = ids_stmt
            .query_map(params![name], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut ids = ids.into_iter().map(AlgorithmId);

        let keep = match ids.next() {
            Some(id) => id,
            None => continue,
        };
        groups.push(DuplicateGroup {
            name,
            keep,
            discard: ids.collect(),
        });
    }

    Ok(groups)
}

/// Delete one algorithm and everything hanging off it, in `CASCADE_ORDER`.
fn cascade_delete(tx: &Transaction, algorithm_id: AlgorithmId) -> Result<DeletedRows> {
    let mut deleted = DeletedRows::default();

    for step in CASCADE_ORDER.iter() {
        let count = tx.execute(step.sql, params![algorithm_id.0]).map_err(|e| {
            StoreError::Consistency(format!(
                "deleting {} of algorithm {} failed: {}",
                step.table, algorithm_id, e
            ))
        })?;
        deleted.add(step.table, count);
        debug!(
            "    Deleted {} row(s) from {} for algorithm {}",
            count, step.table, algorithm_id
        );
    }

    if deleted.algorithms != 1 {
        return Err(StoreError::Consistency(format!(
            "algorithm {} vanished during cascade",
            algorithm_id
        )));
    }

    Ok(deleted)
}

fn dedup_group(db: &mut Database, group: &DuplicateGroup) -> Result<DeletedRows> {
    let tx = db.conn.transaction()?;
    let mut deleted = DeletedRows::default();

    for &discard in &group.discard {
        deleted.merge(&cascade_delete(&tx, discard)?);
        info!("  Deleted algorithm ID: {}", discard);
    }

    // Deferred version references are checked here
    tx.commit().map_err(|e| {
        StoreError::Consistency(format!("commit for '{}' failed: {}", group.name, e))
    })?;

    Ok(deleted)
}

/// Collapse every duplicate-name group to its earliest algorithm.
///
/// Irreversible. Each group commits or rolls back on its own, so a failed
/// group is reported and the rest still proceed; running the pass again
/// picks up whatever is left.
pub fn dedup_algorithms(db: &mut Database) -> Result<DedupReport> {
    let groups = find_duplicate_groups(db)?;
    let mut report = DedupReport::default();

    info!("Found {} duplicate algorithm name(s)", groups.len());

    for group in groups {
        info!("Processing duplicates for: {}", group.name);
        info!("  Keeping algorithm ID: {}", group.keep);

        let outcome = match dedup_group(db, &group) {
            Ok(deleted) => {
                report.deleted.merge(&deleted);
                info!(
                    "  ✓ Removed {} row(s) for '{}'",
                    deleted.total(),
                    group.name
                );
                GroupOutcome::Committed { deleted }
            }
            Err(e) => {
                error!("  Rolled back '{}': {}", group.name, e);
                GroupOutcome::RolledBack {
                    reason: e.to_string(),
                }
            }
        };

        report.groups.push(GroupReport { group, outcome });
    }

    info!(
        "Dedup complete: {} group(s) committed, {} rolled back",
        report.committed(),
        report.rolled_back()
    );
    Ok(report)
}

/// Count rows whose parent no longer exists
pub fn verify_integrity(db: &Database) -> Result<IntegrityReport> {
    let count = |sql: &str| -> Result<usize> {
        let n: i64 = db.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    };

    Ok(IntegrityReport {
        orphan_metrics: count(
            "SELECT COUNT(*) FROM performance_metrics
             WHERE version_id NOT IN (SELECT id FROM algorithm_versions)",
        )?,
        orphan_versions: count(
            "SELECT COUNT(*) FROM algorithm_versions
             WHERE algorithm_id NOT IN (SELECT id FROM algorithms)",
        )?,
        orphan_improvements: count(
            "SELECT COUNT(*) FROM improvements
             WHERE algorithm_id NOT IN (SELECT id FROM algorithms)
                OR old_version_id NOT IN (SELECT id FROM algorithm_versions)
                OR new_version_id NOT IN (SELECT id FROM algorithm_versions)",
        )?,
        orphan_feedback: count(
            "SELECT COUNT(*) FROM feedback
             WHERE algorithm_id NOT IN (SELECT id FROM algorithms)
                OR version_id NOT IN (SELECT id FROM algorithm_versions)",
        )?,
        orphan_mappings: count(
            "SELECT COUNT(*) FROM algorithm_category_mapping
             WHERE algorithm_id NOT IN (SELECT id FROM algorithms)
                OR category_id NOT IN (SELECT id FROM algorithm_categories)",
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreConfig;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cascade_order_is_children_first() {
        let tables: Vec<&str> = CASCADE_ORDER.iter().map(|s| s.table).collect();
        assert_eq!(
            tables,
            vec![
                "performance_metrics",
                "algorithm_versions",
                "improvements",
                "feedback",
                "algorithm_category_mapping",
                "algorithms",
            ]
        );
    }

    #[test]
    fn test_failed_group_rolls_back_and_others_proceed() {
        let temp = NamedTempFile::new().unwrap();
        let mut db = Database::create(&StoreConfig::new(temp.path())).unwrap();
        let sorting = db.create_category("Sorting", None).unwrap();

        let heap_keep = db.register_algorithm("Heap Sort", "", "h1", sorting).unwrap();
        let heap_dup = db.register_algorithm("Heap Sort", "", "h2", sorting).unwrap();
        let shell_keep = db.register_algorithm("Shell Sort", "", "s1", sorting).unwrap();
        let shell_dup = db.register_algorithm("Shell Sort", "", "s2", sorting).unwrap();

        // Tampered row: the surviving algorithm's feedback points at the
        // duplicate's version, so removing that version cannot commit.
        let dup_version = db.latest_version(heap_dup).unwrap().id;
        db.conn
            .execute(
                "INSERT INTO feedback (algorithm_id, version_id, feedback_text, rating, created_at)
                 VALUES (?1, ?2, 'cross-linked', NULL, '2025-01-01T00:00:00Z')",
                params![heap_keep.0, dup_version.0],
            )
            .unwrap();

        let report = dedup_algorithms(&mut db).unwrap();
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.committed(), 1);
        assert_eq!(report.rolled_back(), 1);

        let heap = report
            .groups
            .iter()
            .find(|g| g.group.name == "Heap Sort")
            .unwrap();
        assert!(matches!(heap.outcome, GroupOutcome::RolledBack { .. }));

        // Rolled-back group is fully intact
        assert!(db.get_algorithm(heap_dup).is_ok());
        assert_eq!(db.latest_version(heap_dup).unwrap().id, dup_version);
        assert!(db.category_for_algorithm(heap_dup).unwrap().is_some());

        // The other group went through
        assert!(db.get_algorithm(shell_keep).is_ok());
        assert!(matches!(
            db.get_algorithm(shell_dup),
            Err(StoreError::NotFound(_))
        ));
        assert!(verify_integrity(&db).unwrap().is_consistent());
    }

    #[test]
    fn test_rerun_after_rollback_converges() {
        let temp = NamedTempFile::new().unwrap();
        let mut db = Database::create(&StoreConfig::new(temp.path())).unwrap();
        let sorting = db.create_category("Sorting", None).unwrap();

        let heap_keep = db.register_algorithm("Heap Sort", "", "h1", sorting).unwrap();
        let heap_dup = db.register_algorithm("Heap Sort", "", "h2", sorting).unwrap();
        db.register_algorithm("Shell Sort", "", "s1", sorting).unwrap();
        db.register_algorithm("Shell Sort", "", "s2", sorting).unwrap();
        let keep_version = db.latest_version(heap_keep).unwrap().id;
        let dup_version = db.latest_version(heap_dup).unwrap().id;
        db.record_metric(keep_version, 10, 0.5, 64.0).unwrap();

        db.conn
            .execute(
                "INSERT INTO feedback (algorithm_id, version_id, feedback_text, rating, created_at)
                 VALUES (?1, ?2, 'cross-linked', NULL, '2025-01-01T00:00:00Z')",
                params![heap_keep.0, dup_version.0],
            )
            .unwrap();
        let cross_linked = db.conn.last_insert_rowid();

        let first = dedup_algorithms(&mut db).unwrap();
        assert_eq!(first.rolled_back(), 1);

        // Repair the bad row, then run again
        db.conn
            .execute("DELETE FROM feedback WHERE id = ?1", params![cross_linked])
            .unwrap();

        let second = dedup_algorithms(&mut db).unwrap();
        assert_eq!(second.groups.len(), 1);
        assert_eq!(second.groups[0].group.name, "Heap Sort");
        assert_eq!(second.groups[0].group.keep, heap_keep);
        match &second.groups[0].outcome {
            GroupOutcome::Committed { deleted } => {
                assert_eq!(deleted.versions, 1);
                assert_eq!(deleted.mappings, 1);
                assert_eq!(deleted.algorithms, 1);
            }
            other => panic!("expected commit, got {:?}", other),
        }

        assert!(find_duplicate_groups(&db).unwrap().is_empty());
        assert!(verify_integrity(&db).unwrap().is_consistent());
        assert_eq!(db.count_algorithms().unwrap(), 2);
        assert_eq!(db.metrics_for_version(keep_version).unwrap().len(), 1);

        let third = dedup_algorithms(&mut db).unwrap();
        assert!(third.groups.is_empty());
        assert_eq!(third.deleted.total(), 0);
    }

    #[test]
    fn test_no_duplicates_is_noop() {
        let temp = NamedTempFile::new().unwrap();
        let mut db = Database::create(&StoreConfig::new(temp.path())).unwrap();
        let sorting = db.create_category("Sorting", None).unwrap();
        db.register_algorithm("Merge Sort", "", "m", sorting).unwrap();

        assert!(find_duplicate_groups(&db).unwrap().is_empty());
        let report = dedup_algorithms(&mut db).unwrap();
        assert!(report.groups.is_empty());
        assert_eq!(report.deleted.total(), 0);
    }

    #[test]
    fn test_integrity_detects_orphans() {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::create(&StoreConfig::new(temp.path())).unwrap();
        db.conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
        db.conn
            .execute(
                "INSERT INTO performance_metrics (version_id, input_size, execution_time, memory_usage, platform, timestamp)
                 VALUES (999, 10, 0.1, 0.0, NULL, '2025-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let report = verify_integrity(&db).unwrap();
        assert_eq!(report.orphan_metrics, 1);
        assert!(!report.is_consistent());
    }
}
