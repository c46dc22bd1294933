use chrono::{DateTime, Utc};

/// Generates a display number of the form `INV-YYYYMMDD-NNNNNN`.
///
/// The suffix is the microsecond component of the current time, so two
/// invoices created close together can end up with the same number.
pub fn generate_invoice_number() -> String {
    invoice_number_at(Utc::now())
}

pub fn invoice_number_at(now: DateTime<Utc>) -> String {
    // subsec micros exceeds 999_999 during a leap second
    let suffix = now.timestamp_subsec_micros() % 1_000_000;
    format!("INV-{}-{:06}", now.format("%Y%m%d"), suffix)
}
