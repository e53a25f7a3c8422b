//! CSV rendering of sale records
//!
//! Header: timestamp,sender,product,quantity,unit_price,total_price,currency,notes

use csv::WriterBuilder;
use serde::Serialize;

use chatsales_core::SaleRecord;

pub const EXPORT_FILENAME: &str = "sales_export.csv";

#[derive(Serialize)]
struct CsvOutRow<'a> {
    timestamp: &'a str,
    sender: &'a str,
    product: &'a str,
    quantity: Option<f64>,
    unit_price: Option<f64>,
    total_price: Option<f64>,
    currency: Option<&'a str>,
    notes: &'a str,
}

impl<'a> From<&'a SaleRecord> for CsvOutRow<'a> {
    fn from(sale: &'a SaleRecord) -> Self {
        Self {
            timestamp: &sale.timestamp,
            sender: &sale.sender,
            product: &sale.product,
            quantity: sale.quantity,
            unit_price: sale.unit_price,
            total_price: sale.total_price,
            currency: sale.currency.as_deref(),
            notes: &sale.notes,
        }
    }
}

/// Render `sales` as CSV with a header row. Missing values are empty cells.
pub fn write_csv(sales: &[SaleRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());

    for sale in sales {
        writer.serialize(CsvOutRow::from(sale))?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
