mod invoice;
mod invoice_item;
mod template;
mod user;

pub use invoice::{Invoice, InvoicePayload, InvoiceStatus, UnknownStatus};
pub use invoice_item::{InvoiceItem, InvoiceItemPayload};
pub use template::Template;
pub use user::User;
