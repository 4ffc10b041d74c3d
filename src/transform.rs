use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use tracing::info;

use crate::model::{CustomerRow, DateRow, InvoiceRow, ProductRow, SaleRecord};

/// The four dimension projections derived from a cleaned record set.
#[derive(Debug, Default)]
pub struct DimensionProjections {
    pub dates: Vec<DateRow>,
    pub customers: Vec<CustomerRow>,
    pub products: Vec<ProductRow>,
    pub invoices: Vec<InvoiceRow>,
}

/// Calendar attributes for one date-dimension row.
pub fn derive_date(date: NaiveDate) -> DateRow {
    DateRow {
        date_key: date,
        day: date.day(),
        // ISO-8601 week numbering: the first days of January can belong to
        // the last week of the previous year.
        week: date.iso_week().week(),
        month: date.month(),
        quarter: (date.month() - 1) / 3 + 1,
        year: date.year(),
    }
}

/// Projects the cleaned records into the four dimensions.
///
/// Deduplication is by natural key with the first occurrence winning. For
/// products that means a stock code whose first occurrence has no
/// description stays out of the dimension entirely, even when a later row
/// carries one.
pub fn project_dimensions(records: &[SaleRecord]) -> DimensionProjections {
    let mut projections = DimensionProjections::default();

    let mut seen_dates = HashSet::new();
    let mut seen_customers = HashSet::new();
    let mut seen_products = HashSet::new();
    let mut seen_invoices = HashSet::new();

    for record in records {
        let date = record.date_key();
        if seen_dates.insert(date) {
            projections.dates.push(derive_date(date));
        }
        if seen_customers.insert(record.customer_id) {
            projections.customers.push(CustomerRow {
                customer_id: record.customer_id,
                country: record.country.clone(),
            });
        }
        if seen_products.insert(record.stock_code.clone()) {
            if let Some(description) = &record.description {
                projections.products.push(ProductRow {
                    stock_code: record.stock_code.clone(),
                    description: description.clone(),
                });
            }
        }
        if seen_invoices.insert(record.invoice_no.clone()) {
            projections.invoices.push(InvoiceRow {
                invoice_no: record.invoice_no.clone(),
                is_cancelled: false,
            });
        }
    }

    info!(
        "Projected {} dates, {} customers, {} products, {} invoices",
        projections.dates.len(),
        projections.customers.len(),
        projections.products.len(),
        projections.invoices.len()
    );
    projections
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn sale(invoice: &str, stock: &str, description: Option<&str>, customer: i64, country: &str, date: &str) -> SaleRecord {
        SaleRecord {
            invoice_no: invoice.to_string(),
            stock_code: stock.to_string(),
            description: description.map(str::to_string),
            quantity: 1,
            unit_price: 1.0,
            invoice_date: NaiveDateTime::parse_from_str(date, "%m/%d/%Y %H:%M").unwrap(),
            customer_id: customer,
            country: country.to_string(),
            revenue: 1.0,
        }
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2011-01-01 is a Saturday and belongs to ISO week 52 of 2010.
        let row = derive_date(NaiveDate::from_ymd_opt(2011, 1, 1).unwrap());
        assert_eq!(row.week, 52);
        assert_eq!(row.day, 1);
        assert_eq!(row.month, 1);
        assert_eq!(row.quarter, 1);
        assert_eq!(row.year, 2011);
    }

    #[test]
    fn test_quarter_derivation() {
        let q = |m| derive_date(NaiveDate::from_ymd_opt(2011, m, 15).unwrap()).quarter;
        assert_eq!(q(1), 1);
        assert_eq!(q(3), 1);
        assert_eq!(q(4), 2);
        assert_eq!(q(9), 3);
        assert_eq!(q(12), 4);
    }

    #[test]
    fn test_dates_are_distinct_per_calendar_day() {
        let records = vec![
            sale("536383", "85123A", Some("MUG"), 1, "United Kingdom", "12/1/2010 8:26"),
            sale("536384", "85123A", Some("MUG"), 1, "United Kingdom", "12/1/2010 17:03"),
        ];
        let projections = project_dimensions(&records);
        assert_eq!(projections.dates.len(), 1);
    }

    #[test]
    fn test_customer_dedup_keeps_first_seen_country() {
        let records = vec![
            sale("536383", "85123A", Some("MUG"), 17850, "France", "12/1/2010 8:26"),
            sale("536384", "85123A", Some("MUG"), 17850, "Germany", "12/2/2010 8:26"),
        ];
        let projections = project_dimensions(&records);
        assert_eq!(projections.customers.len(), 1);
        assert_eq!(projections.customers[0].country, "France");
    }

    #[test]
    fn test_product_without_first_description_is_excluded() {
        // First occurrence of 85123A has no description: the stock code
        // stays out of the dimension even though a later row names it.
        let records = vec![
            sale("536383", "85123A", None, 17850, "United Kingdom", "12/1/2010 8:26"),
            sale("536384", "85123A", Some("MUG"), 17850, "United Kingdom", "12/2/2010 8:26"),
            sale("536385", "71053", Some("WHITE METAL LANTERN"), 17850, "United Kingdom", "12/2/2010 8:26"),
        ];
        let projections = project_dimensions(&records);
        assert_eq!(projections.products.len(), 1);
        assert_eq!(projections.products[0].stock_code, "71053");
    }

    #[test]
    fn test_every_projected_product_has_a_description() {
        let records = vec![
            sale("536383", "85123A", Some("MUG"), 17850, "United Kingdom", "12/1/2010 8:26"),
            sale("536384", "22423", None, 17850, "United Kingdom", "12/2/2010 8:26"),
        ];
        let projections = project_dimensions(&records);
        assert!(projections.products.iter().all(|p| !p.description.is_empty()));
        assert_eq!(projections.products.len(), 1);
    }

    #[test]
    fn test_invoice_projection_is_distinct_and_never_cancelled() {
        let records = vec![
            sale("536383", "85123A", Some("MUG"), 17850, "United Kingdom", "12/1/2010 8:26"),
            sale("536383", "71053", Some("LANTERN"), 17850, "United Kingdom", "12/1/2010 8:26"),
        ];
        let projections = project_dimensions(&records);
        assert_eq!(projections.invoices.len(), 1);
        assert!(!projections.invoices[0].is_cancelled);
    }
}
