pub mod db;
pub mod userdb;
pub mod paymentdb;
#[cfg(test)]
pub mod memory;

use paymentdb::PaymentExt;
use userdb::UserExt;

/// Everything the payment pipeline needs from persistence.
pub trait PaymentStore: UserExt + PaymentExt + Send + Sync {}

impl<T: UserExt + PaymentExt + Send + Sync> PaymentStore for T {}
