pub mod database;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod notes;
pub mod registry;
pub mod seed;

pub use database::{Database, StoreConfig, REQUIRED_TABLES};
pub use error::{Result, StoreError};
pub use maintenance::{
    dedup_algorithms, find_duplicate_groups, verify_integrity, CascadeStep, DedupReport,
    DeletedRows, DuplicateGroup, GroupOutcome, GroupReport, IntegrityReport, CASCADE_ORDER,
};
pub use seed::seed_defaults;
