use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::model::{CustomerRow, DateRow, FactRow, InvoiceRow, ProductRow};

#[cfg(feature = "db")]
pub mod libsql;
pub mod memory;

#[cfg(feature = "db")]
pub use self::libsql::LibsqlWarehouse;
pub use self::memory::InMemoryWarehouse;

/// Row counts per warehouse table, for run summaries and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarehouseCounts {
    pub dates: u64,
    pub customers: u64,
    pub products: u64,
    pub invoices: u64,
    pub facts: u64,
}

/// Persistence port for the star schema.
///
/// Dimension upserts are insert-if-absent on the natural key: a key already
/// present is left untouched, never updated. Fact inserts are pure appends
/// with no conflict key, so reloading the same source duplicates fact rows.
/// The four dimensions have no dependencies on one another and may be loaded
/// in any order, but all of them must be loaded before facts are resolved.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn upsert_dates(&self, rows: &[DateRow]) -> Result<()>;
    async fn upsert_customers(&self, rows: &[CustomerRow]) -> Result<()>;
    async fn upsert_products(&self, rows: &[ProductRow]) -> Result<()>;
    async fn upsert_invoices(&self, rows: &[InvoiceRow]) -> Result<()>;

    /// Surrogate keys as currently assigned by the warehouse, keyed by the
    /// natural key. Read back from the warehouse rather than tracked in
    /// memory: keys may have been assigned by an earlier run.
    async fn customer_keys(&self) -> Result<HashMap<i64, i64>>;
    async fn product_keys(&self) -> Result<HashMap<String, i64>>;
    async fn invoice_keys(&self) -> Result<HashMap<String, i64>>;

    /// Date keys present in `dim_date`; the date itself is the join key.
    async fn date_keys(&self) -> Result<HashSet<NaiveDate>>;

    /// Appends fact rows in statement batches of at most `batch_size` rows,
    /// committing once at the end of the stage.
    async fn insert_facts(&self, rows: &[FactRow], batch_size: usize) -> Result<()>;

    async fn counts(&self) -> Result<WarehouseCounts>;
}
