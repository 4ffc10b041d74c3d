use chrono::NaiveDateTime;
use tracing::info;

use crate::error::{EtlError, Result};
use crate::model::{SaleRecord, SourceRecord};

/// Invoice numbers starting with this prefix are cancellations.
pub const CANCELLED_INVOICE_PREFIX: &str = "C";

/// Timestamp layout used by the source export. chrono accepts both padded
/// and unpadded month/day/hour values for these specifiers.
pub const INVOICE_DATE_FORMAT: &str = "%m/%d/%Y %H:%M";

/// Per-filter drop counts from a clean pass.
#[derive(Debug, Default, Clone)]
pub struct CleanReport {
    pub input_rows: usize,
    pub cancelled: usize,
    pub non_positive_quantity: usize,
    pub missing_customer: usize,
}

impl CleanReport {
    pub fn kept(&self) -> usize {
        self.input_rows - self.cancelled - self.non_positive_quantity - self.missing_customer
    }
}

/// Applies the row policy to the raw export and types the survivors.
///
/// Rows are dropped when the invoice is a cancellation, the quantity is not
/// strictly positive, or the customer id is absent. A retained row whose
/// invoice date or customer id fails to parse aborts the whole run; partial
/// cleaning is not acceptable.
pub fn clean(rows: Vec<SourceRecord>) -> Result<(Vec<SaleRecord>, CleanReport)> {
    let mut report = CleanReport {
        input_rows: rows.len(),
        ..Default::default()
    };
    let mut cleaned = Vec::with_capacity(rows.len());

    for (idx, row) in rows.into_iter().enumerate() {
        let source_row = idx + 1;

        if row.invoice_no.starts_with(CANCELLED_INVOICE_PREFIX) {
            report.cancelled += 1;
            continue;
        }
        if row.quantity <= 0 {
            report.non_positive_quantity += 1;
            continue;
        }
        let customer_id = match row.customer_id.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => parse_customer_id(raw, source_row)?,
            None => {
                report.missing_customer += 1;
                continue;
            }
        };

        let invoice_date = parse_invoice_date(&row.invoice_date, source_row)?;
        let revenue = row.quantity as f64 * row.unit_price;

        cleaned.push(SaleRecord {
            invoice_no: row.invoice_no,
            stock_code: row.stock_code,
            description: row.description,
            quantity: row.quantity,
            unit_price: row.unit_price,
            invoice_date,
            customer_id,
            country: row.country,
            revenue,
        });
    }

    info!(
        "Cleaned {} rows down to {} ({} cancelled, {} non-positive quantity, {} missing customer)",
        report.input_rows,
        cleaned.len(),
        report.cancelled,
        report.non_positive_quantity,
        report.missing_customer
    );
    Ok((cleaned, report))
}

/// Coerces a retained customer id to a whole number.
///
/// The upstream export writes ids as floats ("17850.0"); anything fractional
/// or non-numeric is fatal rather than silently dropped.
fn parse_customer_id(raw: &str, source_row: usize) -> Result<i64> {
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(id);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(EtlError::Data {
            row: source_row,
            message: format!("customer id {raw:?} is not a whole number"),
        }),
    }
}

fn parse_invoice_date(raw: &str, source_row: usize) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, INVOICE_DATE_FORMAT).map_err(|e| EtlError::Data {
        row: source_row,
        message: format!("invoice date {raw:?} does not match {INVOICE_DATE_FORMAT}: {e}"),
    })
}
