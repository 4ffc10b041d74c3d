use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// One line of the source export, as written by the upstream system.
///
/// Field names mirror the CSV header. `Description` and `CustomerID` are
/// frequently blank in real exports, so both come through as options.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "InvoiceNo")]
    pub invoice_no: String,
    #[serde(rename = "StockCode")]
    pub stock_code: String,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    #[serde(rename = "InvoiceDate")]
    pub invoice_date: String,
    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,
    #[serde(rename = "CustomerID")]
    pub customer_id: Option<String>,
    #[serde(rename = "Country")]
    pub country: String,
}

/// A sale line that survived cleaning: typed, filtered, revenue attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub invoice_date: NaiveDateTime,
    pub customer_id: i64,
    pub country: String,
    pub revenue: f64,
}

impl SaleRecord {
    /// Calendar date the sale joins the date dimension on.
    pub fn date_key(&self) -> NaiveDate {
        self.invoice_date.date()
    }
}

/// One row of the date dimension. The calendar date is both the natural key
/// and the key fact rows join on.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRow {
    pub date_key: NaiveDate,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
}

/// One row of the customer dimension, keyed by the source customer id.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRow {
    pub customer_id: i64,
    pub country: String,
}

/// One row of the product dimension, keyed by stock code. Rows only exist
/// for products with a description.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub stock_code: String,
    pub description: String,
}

/// One row of the invoice dimension. Cancelled invoices are filtered before
/// this point, so `is_cancelled` is always false here.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRow {
    pub invoice_no: String,
    pub is_cancelled: bool,
}

/// A fully resolved fact row, ready for `fct_sales`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub invoice_key: i64,
    pub product_key: i64,
    pub customer_key: i64,
    pub date_key: NaiveDate,
    pub quantity: i64,
    pub unit_price: f64,
    pub revenue_gbp: f64,
}
