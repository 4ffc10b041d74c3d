use std::collections::{HashMap, HashSet};
use std::env;

use async_trait::async_trait;
use chrono::NaiveDate;
use libsql::{params, Builder, Connection, Database, Value};
use tracing::{debug, info};

use super::{Warehouse, WarehouseCounts};
use crate::error::{EtlError, Result};
use crate::model::{CustomerRow, DateRow, FactRow, InvoiceRow, ProductRow};

/// Environment variable naming the warehouse connection string.
pub const WAREHOUSE_DB_URL: &str = "WAREHOUSE_DB_URL";

/// Auth token variable, required for remote warehouses.
pub const WAREHOUSE_AUTH_TOKEN: &str = "WAREHOUSE_AUTH_TOKEN";

/// libSQL-backed warehouse.
///
/// Each load stage opens its own connection and runs inside one transaction
/// committed at the end of the stage; a mid-stage failure loses that stage's
/// uncommitted rows and nothing else.
pub struct LibsqlWarehouse {
    db: Database,
}

impl LibsqlWarehouse {
    /// Connects using `WAREHOUSE_DB_URL`. A missing variable is a fatal
    /// configuration error naming the variable.
    pub async fn from_env() -> Result<Self> {
        let url = env::var(WAREHOUSE_DB_URL).map_err(|_| {
            EtlError::Config(format!("{WAREHOUSE_DB_URL} environment variable not set"))
        })?;
        Self::connect(&url).await
    }

    /// Connects to a warehouse. `libsql://` and `http(s)://` URLs are remote
    /// and additionally need `WAREHOUSE_AUTH_TOKEN`; anything else is
    /// treated as a local database file path.
    pub async fn connect(url: &str) -> Result<Self> {
        let is_remote = url.starts_with("libsql://")
            || url.starts_with("http://")
            || url.starts_with("https://");

        let db = if is_remote {
            let auth_token = env::var(WAREHOUSE_AUTH_TOKEN).map_err(|_| {
                EtlError::Config(format!(
                    "{WAREHOUSE_AUTH_TOKEN} environment variable not set"
                ))
            })?;
            info!("Connecting to remote warehouse at {}", url);
            Builder::new_remote(url.to_string(), auth_token).build().await
        } else {
            info!("Opening local warehouse at {}", url);
            Builder::new_local(url).build().await
        }
        .map_err(|e| EtlError::Database {
            message: format!("failed to connect to warehouse: {e}"),
        })?;

        Ok(Self { db })
    }

    fn connection(&self) -> Result<Connection> {
        self.db.connect().map_err(|e| EtlError::Database {
            message: format!("failed to open warehouse connection: {e}"),
        })
    }

    /// Applies the warehouse schema. Invoked by the `migrate` command only;
    /// a load run relies on the tables and their natural-key uniqueness
    /// constraints already existing.
    pub async fn migrate(&self) -> Result<()> {
        info!("Applying warehouse schema...");
        let conn = self.connection()?;
        let schema = include_str!("../../migrations/001_create_warehouse.sql");
        conn.execute_batch(schema)
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to apply warehouse schema: {e}"),
            })?;
        info!("Warehouse schema applied");
        Ok(())
    }

    async fn count(conn: &Connection, table: &str) -> Result<u64> {
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to count {table}: {e}"),
            })?;
        let row = rows
            .next()
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to read count for {table}: {e}"),
            })?
            .ok_or_else(|| EtlError::Database {
                message: format!("empty count result for {table}"),
            })?;
        let count: i64 = row.get(0).map_err(|e| EtlError::Database {
            message: format!("failed to get count for {table}: {e}"),
        })?;
        Ok(count as u64)
    }
}

#[async_trait]
impl Warehouse for LibsqlWarehouse {
    async fn upsert_dates(&self, rows: &[DateRow]) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(|e| EtlError::Database {
            message: format!("failed to begin dim_date transaction: {e}"),
        })?;
        for row in rows {
            tx.execute(
                "INSERT INTO dim_date (date_key, day, week, month, quarter, year) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT (date_key) DO NOTHING",
                params![
                    row.date_key.to_string(),
                    row.day as i64,
                    row.week as i64,
                    row.month as i64,
                    row.quarter as i64,
                    row.year as i64
                ],
            )
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to upsert dim_date row: {e}"),
            })?;
        }
        tx.commit().await.map_err(|e| EtlError::Database {
            message: format!("failed to commit dim_date load: {e}"),
        })?;
        debug!("Upserted {} dim_date rows", rows.len());
        Ok(())
    }

    async fn upsert_customers(&self, rows: &[CustomerRow]) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(|e| EtlError::Database {
            message: format!("failed to begin dim_customer transaction: {e}"),
        })?;
        for row in rows {
            tx.execute(
                "INSERT INTO dim_customer (customer_id, country) VALUES (?1, ?2) \
                 ON CONFLICT (customer_id) DO NOTHING",
                params![row.customer_id, row.country.as_str()],
            )
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to upsert dim_customer row: {e}"),
            })?;
        }
        tx.commit().await.map_err(|e| EtlError::Database {
            message: format!("failed to commit dim_customer load: {e}"),
        })?;
        debug!("Upserted {} dim_customer rows", rows.len());
        Ok(())
    }

    async fn upsert_products(&self, rows: &[ProductRow]) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(|e| EtlError::Database {
            message: format!("failed to begin dim_product transaction: {e}"),
        })?;
        for row in rows {
            tx.execute(
                "INSERT INTO dim_product (stock_code, description) VALUES (?1, ?2) \
                 ON CONFLICT (stock_code) DO NOTHING",
                params![row.stock_code.as_str(), row.description.as_str()],
            )
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to upsert dim_product row: {e}"),
            })?;
        }
        tx.commit().await.map_err(|e| EtlError::Database {
            message: format!("failed to commit dim_product load: {e}"),
        })?;
        debug!("Upserted {} dim_product rows", rows.len());
        Ok(())
    }

    async fn upsert_invoices(&self, rows: &[InvoiceRow]) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(|e| EtlError::Database {
            message: format!("failed to begin dim_invoice transaction: {e}"),
        })?;
        for row in rows {
            tx.execute(
                "INSERT INTO dim_invoice (invoice_no, is_cancelled) VALUES (?1, ?2) \
                 ON CONFLICT (invoice_no) DO NOTHING",
                params![row.invoice_no.as_str(), i64::from(row.is_cancelled)],
            )
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to upsert dim_invoice row: {e}"),
            })?;
        }
        tx.commit().await.map_err(|e| EtlError::Database {
            message: format!("failed to commit dim_invoice load: {e}"),
        })?;
        debug!("Upserted {} dim_invoice rows", rows.len());
        Ok(())
    }

    async fn customer_keys(&self) -> Result<HashMap<i64, i64>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT customer_key, customer_id FROM dim_customer", ())
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to read dim_customer keys: {e}"),
            })?;
        let mut keys = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| EtlError::Database {
            message: format!("failed to read dim_customer row: {e}"),
        })? {
            let key: i64 = row.get(0).map_err(|e| EtlError::Database {
                message: format!("failed to get customer_key: {e}"),
            })?;
            let customer_id: i64 = row.get(1).map_err(|e| EtlError::Database {
                message: format!("failed to get customer_id: {e}"),
            })?;
            keys.insert(customer_id, key);
        }
        Ok(keys)
    }

    async fn product_keys(&self) -> Result<HashMap<String, i64>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT product_key, stock_code FROM dim_product", ())
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to read dim_product keys: {e}"),
            })?;
        let mut keys = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| EtlError::Database {
            message: format!("failed to read dim_product row: {e}"),
        })? {
            let key: i64 = row.get(0).map_err(|e| EtlError::Database {
                message: format!("failed to get product_key: {e}"),
            })?;
            let stock_code: String = row.get(1).map_err(|e| EtlError::Database {
                message: format!("failed to get stock_code: {e}"),
            })?;
            keys.insert(stock_code, key);
        }
        Ok(keys)
    }

    async fn invoice_keys(&self) -> Result<HashMap<String, i64>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT invoice_key, invoice_no FROM dim_invoice", ())
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to read dim_invoice keys: {e}"),
            })?;
        let mut keys = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| EtlError::Database {
            message: format!("failed to read dim_invoice row: {e}"),
        })? {
            let key: i64 = row.get(0).map_err(|e| EtlError::Database {
                message: format!("failed to get invoice_key: {e}"),
            })?;
            let invoice_no: String = row.get(1).map_err(|e| EtlError::Database {
                message: format!("failed to get invoice_no: {e}"),
            })?;
            keys.insert(invoice_no, key);
        }
        Ok(keys)
    }

    async fn date_keys(&self) -> Result<HashSet<NaiveDate>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT date_key FROM dim_date", ())
            .await
            .map_err(|e| EtlError::Database {
                message: format!("failed to read dim_date keys: {e}"),
            })?;
        let mut keys = HashSet::new();
        while let Some(row) = rows.next().await.map_err(|e| EtlError::Database {
            message: format!("failed to read dim_date row: {e}"),
        })? {
            let raw: String = row.get(0).map_err(|e| EtlError::Database {
                message: format!("failed to get date_key: {e}"),
            })?;
            let date = raw.parse::<NaiveDate>().map_err(|e| EtlError::Database {
                message: format!("invalid date_key {raw:?} in dim_date: {e}"),
            })?;
            keys.insert(date);
        }
        Ok(keys)
    }

    async fn insert_facts(&self, rows: &[FactRow], batch_size: usize) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn.transaction().await.map_err(|e| EtlError::Database {
            message: format!("failed to begin fct_sales transaction: {e}"),
        })?;
        for chunk in rows.chunks(batch_size.max(1)) {
            let placeholders = vec!["(?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO fct_sales \
                 (invoice_key, product_key, customer_key, date_key, quantity, unit_price, revenue_gbp) \
                 VALUES {placeholders}"
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 7);
            for row in chunk {
                values.push(Value::Integer(row.invoice_key));
                values.push(Value::Integer(row.product_key));
                values.push(Value::Integer(row.customer_key));
                values.push(Value::Text(row.date_key.to_string()));
                values.push(Value::Integer(row.quantity));
                values.push(Value::Real(row.unit_price));
                values.push(Value::Real(row.revenue_gbp));
            }
            tx.execute(&sql, libsql::params_from_iter(values))
                .await
                .map_err(|e| EtlError::Database {
                    message: format!("failed to insert fct_sales batch: {e}"),
                })?;
            debug!("Inserted fact batch of {} rows", chunk.len());
        }
        tx.commit().await.map_err(|e| EtlError::Database {
            message: format!("failed to commit fct_sales load: {e}"),
        })?;
        Ok(())
    }

    async fn counts(&self) -> Result<WarehouseCounts> {
        let conn = self.connection()?;
        Ok(WarehouseCounts {
            dates: Self::count(&conn, "dim_date").await?,
            customers: Self::count(&conn, "dim_customer").await?,
            products: Self::count(&conn, "dim_product").await?,
            invoices: Self::count(&conn, "dim_invoice").await?,
            facts: Self::count(&conn, "fct_sales").await?,
        })
    }
}
