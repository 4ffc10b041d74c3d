use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use retail_etl::pipeline::EtlPipeline;
use retail_etl::warehouse::{InMemoryWarehouse, Warehouse};
use tempfile::tempdir;

const HEADER: &str =
    "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country\n";

fn write_export(dir: &tempfile::TempDir, rows: &[&str]) -> PathBuf {
    let path = dir.path().join("online_retail.csv");
    let mut content = String::from(HEADER);
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_three_row_scenario_loads_exactly_one_fact() -> Result<()> {
    let dir = tempdir()?;
    let path = write_export(
        &dir,
        &[
            // Cancelled invoice: filtered before anything else
            "C536379,D,Discount,-1,12/1/2010 9:41,27.50,14527,United Kingdom",
            // No customer id: dropped
            "536414,22139,RETROSPOT TEA SET,56,12/1/2010 11:52,2.10,,United Kingdom",
            // The one valid row
            "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,5,12/1/2010 8:26,1.20,17850,United Kingdom",
        ],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);
    let report = pipeline.run(&path).await?;

    assert_eq!(report.extracted_rows, 3);
    assert_eq!(report.clean.kept(), 1);
    assert_eq!(report.facts_inserted, 1);
    assert_eq!(report.facts_unresolved, 0);

    let counts = warehouse.counts().await?;
    assert_eq!(counts.dates, 1);
    assert_eq!(counts.customers, 1);
    assert_eq!(counts.products, 1);
    // The cancelled invoice never reaches dim_invoice
    assert_eq!(counts.invoices, 1);
    assert_eq!(counts.facts, 1);

    let facts = warehouse.facts();
    assert_eq!(facts[0].quantity, 5);
    assert_eq!(facts[0].revenue_gbp, 6.00);
    // All four foreign keys resolved against freshly assigned dimension keys
    let invoice_keys = warehouse.invoice_keys().await?;
    let product_keys = warehouse.product_keys().await?;
    let customer_keys = warehouse.customer_keys().await?;
    assert_eq!(facts[0].invoice_key, invoice_keys["536365"]);
    assert_eq!(facts[0].product_key, product_keys["85123A"]);
    assert_eq!(facts[0].customer_key, customer_keys[&17850]);
    assert!(warehouse.date_keys().await?.contains(&facts[0].date_key));

    Ok(())
}

#[tokio::test]
async fn test_dimension_loads_are_idempotent_but_facts_duplicate() -> Result<()> {
    let dir = tempdir()?;
    let path = write_export(
        &dir,
        &[
            "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom",
            "536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850,United Kingdom",
            "536367,84879,ASSORTED COLOUR BIRD ORNAMENT,32,12/1/2010 8:34,1.69,13047,France",
        ],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);

    pipeline.run(&path).await?;
    let first = warehouse.counts().await?;

    // Rerunning the same export must not grow any dimension, but appends
    // every fact row again: duplicate facts on rerun are a documented
    // limitation of the design, not a bug to fix here.
    pipeline.run(&path).await?;
    let second = warehouse.counts().await?;

    assert_eq!(second.dates, first.dates);
    assert_eq!(second.customers, first.customers);
    assert_eq!(second.products, first.products);
    assert_eq!(second.invoices, first.invoices);
    assert_eq!(second.facts, first.facts * 2);

    Ok(())
}

#[tokio::test]
async fn test_row_without_description_is_dropped_from_facts_silently() -> Result<()> {
    let dir = tempdir()?;
    // The only occurrence of 22139 has no description, so dim_product never
    // learns the stock code and the fact row cannot resolve a product key.
    let path = write_export(
        &dir,
        &[
            "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom",
            "536366,22139,,4,12/1/2010 8:28,2.10,17850,United Kingdom",
        ],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);
    let report = pipeline.run(&path).await?;

    assert_eq!(report.clean.kept(), 2);
    assert_eq!(report.facts_inserted, 1);
    assert_eq!(report.facts_unresolved, 1);

    let counts = warehouse.counts().await?;
    assert_eq!(counts.products, 1);
    assert_eq!(counts.facts, 1);
    // Both invoices still reach dim_invoice; only the fact row was dropped
    assert_eq!(counts.invoices, 2);

    Ok(())
}

#[tokio::test]
async fn test_malformed_invoice_date_aborts_the_run() -> Result<()> {
    let dir = tempdir()?;
    let path = write_export(
        &dir,
        &[
            "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom",
            "536366,71053,WHITE METAL LANTERN,6,2010-12-01 08:28,3.39,17850,United Kingdom",
        ],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);

    assert!(pipeline.run(&path).await.is_err());
    // Nothing was committed: cleaning failed before any load stage
    assert_eq!(warehouse.counts().await?.facts, 0);
    assert_eq!(warehouse.counts().await?.invoices, 0);

    Ok(())
}

#[tokio::test]
async fn test_fractional_customer_id_aborts_the_run() -> Result<()> {
    let dir = tempdir()?;
    let path = write_export(
        &dir,
        &["536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850.25,United Kingdom"],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);

    assert!(pipeline.run(&path).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_iso_week_boundary_reaches_the_date_dimension() -> Result<()> {
    let dir = tempdir()?;
    let path = write_export(
        &dir,
        &["541432,21485,RETROSPOT HEART HOT WATER BOTTLE,1,1/1/2011 10:00,4.95,12748,United Kingdom"],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);
    pipeline.run(&path).await?;

    // 2011-01-01 is a Saturday in ISO week 52 of 2010
    let (_, _, projections) = EtlPipeline::inspect(&path)?;
    assert_eq!(projections.dates[0].week, 52);
    assert_eq!(projections.dates[0].year, 2011);

    Ok(())
}

#[tokio::test]
async fn test_overlapping_export_only_appends_new_dimension_rows() -> Result<()> {
    let dir = tempdir()?;
    let first = write_export(
        &dir,
        &["536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom"],
    );
    let second_dir = tempdir()?;
    let second = write_export(
        &second_dir,
        &[
            "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom",
            "536367,84879,ASSORTED COLOUR BIRD ORNAMENT,32,12/2/2010 8:34,1.69,13047,France",
        ],
    );

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let pipeline = EtlPipeline::new(warehouse.clone(), 10_000);

    pipeline.run(&first).await?;
    let keys_before = warehouse.customer_keys().await?;

    pipeline.run(&second).await?;
    let keys_after = warehouse.customer_keys().await?;

    // Surrogate keys assigned by the first run are stable across the second
    assert_eq!(keys_after[&17850], keys_before[&17850]);
    assert_eq!(warehouse.counts().await?.customers, 2);

    Ok(())
}
