pub mod binding;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod metadata;
pub mod sign;
pub mod telemetry;
pub mod xmldsig;

#[cfg(test)]
mod test_utils;
