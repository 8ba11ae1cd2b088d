#[cfg(test)]
pub mod fake_client;
pub mod models;
pub mod oelo_client;
