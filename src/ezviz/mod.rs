//! Ezviz cloud integration: client, polling coordinator, account manager

pub mod client;
pub mod coordinator;
pub mod manager;

pub use client::EzvizClient;
pub use coordinator::{DeviceSource, PlugCoordinator};
pub use manager::EzvizManager;
