use algo_platform_schemas::{
    AlgorithmId, Feedback, FeedbackId, Improvement, ImprovementId, VersionId,
};
use chrono::Utc;
use rusqlite::params;
use tracing::debug;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    fn ensure_version_of(&self, algorithm_id: AlgorithmId, version_id: VersionId) -> Result<()> {
        match Database::version_owner(&self.conn, version_id)? {
            Some(owner) if owner == algorithm_id => Ok(()),
            Some(owner) => Err(StoreError::Validation(format!(
                "version {} belongs to algorithm {}, not {}",
                version_id, owner, algorithm_id
            ))),
            None => Err(StoreError::NotFound(format!("version {}", version_id))),
        }
    }

    /// Record a note explaining what changed between two versions
    pub fn add_improvement(
        &self,
        algorithm_id: AlgorithmId,
        old_version_id: VersionId,
        new_version_id: VersionId,
        note: &str,
    ) -> Result<ImprovementId> {
        if !Database::algorithm_exists(&self.conn, algorithm_id)? {
            return Err(StoreError::NotFound(format!("algorithm {}", algorithm_id)));
        }
        self.ensure_version_of(algorithm_id, old_version_id)?;
        self.ensure_version_of(algorithm_id, new_version_id)?;

        self.conn.execute(
            "INSERT INTO improvements (algorithm_id, old_version_id, new_version_id, improvement_note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                algorithm_id.0,
                old_version_id.0,
                new_version_id.0,
                note,
                Utc::now().to_rfc3339()
            ],
        )?;
        let id = ImprovementId(self.conn.last_insert_rowid());

        debug!("Recorded improvement {} for algorithm {}", id, algorithm_id);
        Ok(id)
    }

    pub fn add_feedback(
        &self,
        algorithm_id: AlgorithmId,
        version_id: VersionId,
        text: &str,
        rating: Option<u8>,
    ) -> Result<FeedbackId> {
        if text.trim().is_empty() {
            return Err(StoreError::Validation("feedback text is empty".to_string()));
        }
        if let Some(rating) = rating {
            if !(1..=5).contains(&rating) {
                return Err(StoreError::Validation(format!(
                    "rating {} outside 1-5",
                    rating
                )));
            }
        }
        if !Database::algorithm_exists(&self.conn, algorithm_id)? {
            return Err(StoreError::NotFound(format!("algorithm {}", algorithm_id)));
        }
        self.ensure_version_of(algorithm_id, version_id)?;

        self.conn.execute(
            "INSERT INTO feedback (algorithm_id, version_id, feedback_text, rating, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                algorithm_id.0,
                version_id.0,
                text,
                rating.map(i64::from),
                Utc::now().to_rfc3339()
            ],
        )?;
        let id = FeedbackId(self.conn.last_insert_rowid());

        debug!("Recorded feedback {} for algorithm {}", id, algorithm_id);
        Ok(id)
    }

    pub fn improvements_for_algorithm(&self, algorithm_id: AlgorithmId) -> Result<Vec<Improvement>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, algorithm_id, old_version_id, new_version_id, improvement_note, created_at
             FROM improvements WHERE algorithm_id = ?1 ORDER BY id",
        )?;
        let improvements = stmt
            .query_map(params![algorithm_id.0], |row| {
                Ok(Improvement {
                    id: ImprovementId(row.get(0)?),
                    algorithm_id: AlgorithmId(row.get(1)?),
                    old_version_id: VersionId(row.get(2)?),
                    new_version_id: VersionId(row.get(3)?),
                    note: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(improvements)
    }

    pub fn feedback_for_algorithm(&self, algorithm_id: AlgorithmId) -> Result<Vec<Feedback>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, algorithm_id, version_id, feedback_text, rating, created_at
             FROM feedback WHERE algorithm_id = ?1 ORDER BY id",
        )?;
        let feedback = stmt
            .query_map(params![algorithm_id.0], |row| {
                Ok(Feedback {
                    id: FeedbackId(row.get(0)?),
                    algorithm_id: AlgorithmId(row.get(1)?),
                    version_id: VersionId(row.get(2)?),
                    text: row.get(3)?,
                    rating: row.get::<_, Option<i64>>(4)?.map(|r| r as u8),
                    created_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(feedback)
    }
}
