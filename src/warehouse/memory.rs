use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::{Warehouse, WarehouseCounts};
use crate::error::Result;
use crate::model::{CustomerRow, DateRow, FactRow, InvoiceRow, ProductRow};

/// In-memory warehouse implementation for tests and dry runs.
///
/// Mirrors the database semantics: surrogate keys are assigned once on first
/// insert and an upsert against an existing natural key is a no-op.
pub struct InMemoryWarehouse {
    dates: Arc<Mutex<HashMap<NaiveDate, DateRow>>>,
    customers: Arc<Mutex<HashMap<i64, (i64, CustomerRow)>>>,
    products: Arc<Mutex<HashMap<String, (i64, ProductRow)>>>,
    invoices: Arc<Mutex<HashMap<String, (i64, InvoiceRow)>>>,
    facts: Arc<Mutex<Vec<FactRow>>>,
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self {
            dates: Arc::new(Mutex::new(HashMap::new())),
            customers: Arc::new(Mutex::new(HashMap::new())),
            products: Arc::new(Mutex::new(HashMap::new())),
            invoices: Arc::new(Mutex::new(HashMap::new())),
            facts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the fact table, for assertions in tests.
    pub fn facts(&self) -> Vec<FactRow> {
        self.facts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn upsert_dates(&self, rows: &[DateRow]) -> Result<()> {
        let mut dates = self.dates.lock().unwrap();
        for row in rows {
            dates.entry(row.date_key).or_insert_with(|| row.clone());
        }
        debug!("Upserted {} dim_date rows", rows.len());
        Ok(())
    }

    async fn upsert_customers(&self, rows: &[CustomerRow]) -> Result<()> {
        let mut customers = self.customers.lock().unwrap();
        for row in rows {
            // Tables are append-only, so len + 1 behaves like AUTOINCREMENT
            let next_key = customers.len() as i64 + 1;
            customers
                .entry(row.customer_id)
                .or_insert_with(|| (next_key, row.clone()));
        }
        debug!("Upserted {} dim_customer rows", rows.len());
        Ok(())
    }

    async fn upsert_products(&self, rows: &[ProductRow]) -> Result<()> {
        let mut products = self.products.lock().unwrap();
        for row in rows {
            let next_key = products.len() as i64 + 1;
            products
                .entry(row.stock_code.clone())
                .or_insert_with(|| (next_key, row.clone()));
        }
        debug!("Upserted {} dim_product rows", rows.len());
        Ok(())
    }

    async fn upsert_invoices(&self, rows: &[InvoiceRow]) -> Result<()> {
        let mut invoices = self.invoices.lock().unwrap();
        for row in rows {
            let next_key = invoices.len() as i64 + 1;
            invoices
                .entry(row.invoice_no.clone())
                .or_insert_with(|| (next_key, row.clone()));
        }
        debug!("Upserted {} dim_invoice rows", rows.len());
        Ok(())
    }

    async fn customer_keys(&self) -> Result<HashMap<i64, i64>> {
        let customers = self.customers.lock().unwrap();
        Ok(customers
            .iter()
            .map(|(id, (key, _))| (*id, *key))
            .collect())
    }

    async fn product_keys(&self) -> Result<HashMap<String, i64>> {
        let products = self.products.lock().unwrap();
        Ok(products
            .iter()
            .map(|(code, (key, _))| (code.clone(), *key))
            .collect())
    }

    async fn invoice_keys(&self) -> Result<HashMap<String, i64>> {
        let invoices = self.invoices.lock().unwrap();
        Ok(invoices
            .iter()
            .map(|(no, (key, _))| (no.clone(), *key))
            .collect())
    }

    async fn date_keys(&self) -> Result<HashSet<NaiveDate>> {
        let dates = self.dates.lock().unwrap();
        Ok(dates.keys().copied().collect())
    }

    async fn insert_facts(&self, rows: &[FactRow], batch_size: usize) -> Result<()> {
        let mut facts = self.facts.lock().unwrap();
        for chunk in rows.chunks(batch_size.max(1)) {
            facts.extend_from_slice(chunk);
            debug!("Appended fact batch of {} rows", chunk.len());
        }
        Ok(())
    }

    async fn counts(&self) -> Result<WarehouseCounts> {
        Ok(WarehouseCounts {
            dates: self.dates.lock().unwrap().len() as u64,
            customers: self.customers.lock().unwrap().len() as u64,
            products: self.products.lock().unwrap().len() as u64,
            invoices: self.invoices.lock().unwrap().len() as u64,
            facts: self.facts.lock().unwrap().len() as u64,
        })
    }
}
