pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod models;
pub mod replay;
#[cfg(test)]
pub mod test_helpers;
pub mod trading;
