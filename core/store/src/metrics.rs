use algo_platform_schemas::{AlgorithmId, MetricId, PerformanceMetric, VersionId};
use chrono::Utc;
use rusqlite::{params, Row};
use tracing::debug;

use crate::database::Database;
use crate::error::{Result, StoreError};

const METRIC_COLUMNS: &str = "pm.id, pm.version_id, v.version_number, pm.input_size,
     pm.execution_time, pm.memory_usage, pm.platform, pm.timestamp";

fn row_to_metric(row: &Row) -> rusqlite::Result<PerformanceMetric> {
    Ok(PerformanceMetric {
        id: MetricId(row.get(0)?),
        version_id: VersionId(row.get(1)?),
        version_number: row.get(2)?,
        input_size: row.get(3)?,
        execution_time: row.get(4)?,
        memory_usage: row.get(5)?,
        platform: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

impl Database {
    /// Append one benchmark sample. Metrics are never updated afterwards.
    pub fn record_metric(
        &mut self,
        version_id: VersionId,
        input_size: u64,
        execution_time: f64,
        memory_usage: f64,
    ) -> Result<MetricId> {
        if input_size == 0 {
            return Err(StoreError::Validation("input size must be positive".to_string()));
        }
        let stored_size = i64::try_from(input_size).map_err(|_| {
            StoreError::Validation(format!("input size {} is out of range", input_size))
        })?;
        if !execution_time.is_finite() || execution_time < 0.0 {
            return Err(StoreError::Validation(format!(
                "invalid execution time {}",
                execution_time
            )));
        }
        if !memory_usage.is_finite() || memory_usage < 0.0 {
            return Err(StoreError::Validation(format!(
                "invalid memory usage {}",
                memory_usage
            )));
        }

        let tx = self.conn.transaction()?;

        if Database::version_owner(&tx, version_id)?.is_none() {
            return Err(StoreError::NotFound(format!("version {}", version_id)));
        }

        tx.execute(
            "INSERT INTO performance_metrics (version_id, input_size, execution_time, memory_usage, platform, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                version_id.0,
                stored_size,
                execution_time,
                memory_usage,
                std::env::consts::OS,
                Utc::now().to_rfc3339()
            ],
        )?;
        let metric_id = MetricId(tx.last_insert_rowid());

        tx.commit()?;

        debug!(
            "Recorded metric {} for version {} (n={}, {:.6}s, {:.0} bytes)",
            metric_id, version_id, input_size, execution_time, memory_usage
        );
        Ok(metric_id)
    }

    /// Metrics across every version of an algorithm, ordered by version then input size
    pub fn metrics_for_algorithm(&self, algorithm_id: AlgorithmId) -> Result<Vec<PerformanceMetric>> {
        let query = format!(
            "SELECT {}
             FROM performance_metrics pm
             JOIN algorithm_versions v ON pm.version_id = v.id
             WHERE v.algorithm_id = ?1
             ORDER BY v.version_number ASC, pm.input_size ASC, pm.id ASC",
            METRIC_COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let metrics = stmt
            .query_map(params![algorithm_id.0], row_to_metric)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(metrics)
    }

    pub fn metrics_for_version(&self, version_id: VersionId) -> Result<Vec<PerformanceMetric>> {
        let query = format!(
            "SELECT {}
             FROM performance_metrics pm
             JOIN algorithm_versions v ON pm.version_id = v.id
             WHERE pm.version_id = ?1
             ORDER BY pm.input_size ASC, pm.id ASC",
            METRIC_COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let metrics = stmt
            .query_map(params![version_id.0], row_to_metric)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(metrics)
    }

    pub fn count_metrics(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM performance_metrics", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
