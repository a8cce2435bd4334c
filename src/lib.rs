pub mod agent;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod presentation;
pub mod protocol;
pub mod relay;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
