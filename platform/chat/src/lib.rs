pub mod broadcast;
pub mod config;
pub mod gate;
pub mod global;
pub mod messages;
pub mod models;
pub mod permissions;
pub mod staging;
pub mod store;

#[cfg(test)]
mod tests;
