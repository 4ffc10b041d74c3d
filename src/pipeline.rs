use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};

use crate::clean::{self, CleanReport};
use crate::error::Result;
use crate::extract;
use crate::model::{FactRow, SaleRecord};
use crate::transform::{self, DimensionProjections};
use crate::warehouse::Warehouse;

/// Result of a complete pipeline run.
#[derive(Debug)]
pub struct EtlReport {
    pub extracted_rows: usize,
    pub clean: CleanReport,
    pub projected_dates: usize,
    pub projected_customers: usize,
    pub projected_products: usize,
    pub projected_invoices: usize,
    pub facts_inserted: usize,
    pub facts_unresolved: usize,
}

/// Drives the four stages in strict sequence against one warehouse.
pub struct EtlPipeline {
    warehouse: Arc<dyn Warehouse>,
    batch_size: usize,
}

impl EtlPipeline {
    pub fn new(warehouse: Arc<dyn Warehouse>, batch_size: usize) -> Self {
        Self {
            warehouse,
            batch_size,
        }
    }

    /// Extract, clean and transform only. Used by `check` runs that never
    /// touch a warehouse.
    pub fn inspect(input: &Path) -> Result<(Vec<SaleRecord>, CleanReport, DimensionProjections)> {
        let raw = extract::read_source(input)?;
        let (records, report) = clean::clean(raw)?;
        let projections = transform::project_dimensions(&records);
        Ok((records, report, projections))
    }

    /// Runs the full pipeline: extract, clean, transform, dimension loads,
    /// fact key resolution, fact load.
    #[instrument(skip(self))]
    pub async fn run(&self, input: &Path) -> Result<EtlReport> {
        let t_run = Instant::now();
        counter!("etl_runs_total").increment(1);
        info!("Starting warehouse load from {}", input.display());

        println!("📥 Extracting {}...", input.display());
        let raw = extract::read_source(input)?;
        let extracted_rows = raw.len();
        println!("   {extracted_rows} raw rows");
        counter!("etl_rows_extracted_total").increment(extracted_rows as u64);

        println!("🧹 Cleaning...");
        let (records, clean_report) = clean::clean(raw)?;
        println!(
            "   {} rows kept ({} cancelled, {} non-positive quantity, {} missing customer)",
            records.len(),
            clean_report.cancelled,
            clean_report.non_positive_quantity,
            clean_report.missing_customer
        );
        counter!("etl_rows_cleaned_total").increment(records.len() as u64);

        println!("🔧 Deriving dimension projections...");
        let projections = transform::project_dimensions(&records);

        // The four dimensions are independent of each other; sequence is
        // arbitrary, but all must commit before fact resolution.
        println!("💾 Loading dimensions...");
        let t_dims = Instant::now();
        self.warehouse.upsert_dates(&projections.dates).await?;
        self.warehouse
            .upsert_customers(&projections.customers)
            .await?;
        self.warehouse.upsert_products(&projections.products).await?;
        self.warehouse.upsert_invoices(&projections.invoices).await?;
        histogram!("etl_dimension_load_duration_seconds").record(t_dims.elapsed().as_secs_f64());
        println!(
            "   dim_date {} | dim_customer {} | dim_product {} | dim_invoice {}",
            projections.dates.len(),
            projections.customers.len(),
            projections.products.len(),
            projections.invoices.len()
        );

        println!("🔗 Resolving fact foreign keys...");
        let (facts, unresolved) = self.resolve_facts(&records).await?;
        if unresolved > 0 {
            warn!("{} fact rows dropped with unresolved dimension keys", unresolved);
            println!("   {unresolved} rows dropped with unresolved keys");
        }

        println!("📊 Loading {} fact rows...", facts.len());
        let t_facts = Instant::now();
        self.warehouse.insert_facts(&facts, self.batch_size).await?;
        histogram!("etl_fact_load_duration_seconds").record(t_facts.elapsed().as_secs_f64());
        counter!("etl_fact_rows_total").increment(facts.len() as u64);

        let total_secs = t_run.elapsed().as_secs_f64();
        histogram!("etl_run_duration_seconds").record(total_secs);
        info!("Warehouse load finished in {:.2}s", total_secs);

        Ok(EtlReport {
            extracted_rows,
            clean: clean_report,
            projected_dates: projections.dates.len(),
            projected_customers: projections.customers.len(),
            projected_products: projections.products.len(),
            projected_invoices: projections.invoices.len(),
            facts_inserted: facts.len(),
            facts_unresolved: unresolved,
        })
    }

    /// Joins cleaned records against the warehouse key maps.
    ///
    /// The maps are re-read from the warehouse because surrogate keys may
    /// have been assigned by a prior run. A record missing any dimension key
    /// is dropped, not an error.
    async fn resolve_facts(&self, records: &[SaleRecord]) -> Result<(Vec<FactRow>, usize)> {
        let customer_keys = self.warehouse.customer_keys().await?;
        let product_keys = self.warehouse.product_keys().await?;
        let invoice_keys = self.warehouse.invoice_keys().await?;
        let date_keys = self.warehouse.date_keys().await?;

        let mut facts = Vec::with_capacity(records.len());
        let mut unresolved = 0usize;

        for record in records {
            let date_key = record.date_key();
            match (
                invoice_keys.get(&record.invoice_no),
                product_keys.get(&record.stock_code),
                customer_keys.get(&record.customer_id),
                date_keys.contains(&date_key),
            ) {
                (Some(&invoice_key), Some(&product_key), Some(&customer_key), true) => {
                    facts.push(FactRow {
                        invoice_key,
                        product_key,
                        customer_key,
                        date_key,
                        quantity: record.quantity,
                        unit_price: record.unit_price,
                        revenue_gbp: record.revenue,
                    });
                }
                _ => {
                    unresolved += 1;
                    debug!(
                        "Dropping fact row for invoice {} with unresolved keys",
                        record.invoice_no
                    );
                }
            }
        }

        counter!("etl_facts_unresolved_total").increment(unresolved as u64);
        Ok((facts, unresolved))
    }
}
