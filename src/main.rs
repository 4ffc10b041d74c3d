use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use retail_etl::config::Config;
use retail_etl::logging;
use retail_etl::pipeline::EtlPipeline;
use retail_etl::warehouse::{InMemoryWarehouse, Warehouse};

#[derive(Parser)]
#[command(name = "retail_etl")]
#[command(about = "Online retail star-schema warehouse loader")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full extract-clean-transform-load pipeline
    Run {
        /// Source CSV path (overrides etl.toml)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Fact insert batch size (overrides etl.toml)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Load into a throwaway in-memory warehouse instead of the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract, clean and transform only; report what would be loaded
    Check {
        /// Source CSV path (overrides etl.toml)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Apply the warehouse schema (out-of-band; `run` never creates tables)
    Migrate,
}

#[cfg(feature = "db")]
async fn connect_warehouse() -> anyhow::Result<Arc<dyn Warehouse>> {
    Ok(Arc::new(
        retail_etl::warehouse::LibsqlWarehouse::from_env().await?,
    ))
}

#[cfg(not(feature = "db"))]
async fn connect_warehouse() -> anyhow::Result<Arc<dyn Warehouse>> {
    anyhow::bail!("this binary was built without the `db` feature; rerun with --dry-run")
}

#[cfg(feature = "db")]
async fn migrate_warehouse() -> anyhow::Result<()> {
    let warehouse = retail_etl::warehouse::LibsqlWarehouse::from_env().await?;
    warehouse.migrate().await?;
    Ok(())
}

#[cfg(not(feature = "db"))]
async fn migrate_warehouse() -> anyhow::Result<()> {
    anyhow::bail!("this binary was built without the `db` feature")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Run {
            input,
            batch_size,
            dry_run,
        } => {
            let input = input.unwrap_or_else(|| config.input.path.clone());
            let batch_size = batch_size.unwrap_or(config.load.batch_size);

            let warehouse: Arc<dyn Warehouse> = if dry_run {
                println!("🧪 Dry run: loading into an in-memory warehouse");
                Arc::new(InMemoryWarehouse::new())
            } else {
                connect_warehouse().await?
            };

            let pipeline = EtlPipeline::new(warehouse.clone(), batch_size);
            let report = pipeline.run(&input).await?;
            let counts = warehouse.counts().await?;

            println!("\n📊 Load summary:");
            println!("   Extracted rows:     {}", report.extracted_rows);
            println!("   Cleaned rows:       {}", report.clean.kept());
            println!("     cancelled:        {}", report.clean.cancelled);
            println!("     quantity <= 0:    {}", report.clean.non_positive_quantity);
            println!("     missing customer: {}", report.clean.missing_customer);
            println!("   Facts inserted:     {}", report.facts_inserted);
            println!("   Facts unresolved:   {}", report.facts_unresolved);
            println!(
                "   Warehouse now holds {} dates, {} customers, {} products, {} invoices, {} facts",
                counts.dates, counts.customers, counts.products, counts.invoices, counts.facts
            );
            println!("✅ ETL process completed successfully");
        }
        Commands::Check { input } => {
            let input = input.unwrap_or_else(|| config.input.path.clone());
            let (records, report, projections) = EtlPipeline::inspect(&input)?;

            println!("🔎 Check of {}:", input.display());
            println!("   Raw rows:           {}", report.input_rows);
            println!("   Would load:         {}", records.len());
            println!("     cancelled:        {}", report.cancelled);
            println!("     quantity <= 0:    {}", report.non_positive_quantity);
            println!("     missing customer: {}", report.missing_customer);
            println!(
                "   Projections: {} dates, {} customers, {} products, {} invoices",
                projections.dates.len(),
                projections.customers.len(),
                projections.products.len(),
                projections.invoices.len()
            );
            println!("✅ Source is loadable");
        }
        Commands::Migrate => {
            migrate_warehouse().await?;
            info!("Migration complete");
            println!("✅ Warehouse schema applied");
        }
    }
    Ok(())
}
