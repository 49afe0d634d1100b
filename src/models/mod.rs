pub mod usermodel;
pub mod paymentmodels;
