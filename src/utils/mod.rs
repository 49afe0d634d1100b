pub mod currency;
pub mod wallet_address;
