//! Concrete delivery backends.

mod at;
mod email;
mod smsmodem;

pub use email::EmailBackend;
pub use smsmodem::SmsModemBackend;
