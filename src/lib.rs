pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod invoice_gen;
pub mod invoice_number;
pub mod invoices;
pub mod models;
pub mod templates;
pub mod validation;

#[cfg(test)]
mod test_utils;
