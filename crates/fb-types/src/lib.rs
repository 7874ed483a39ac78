//! Shared domain types for the fleetbridge master.
//!
//! This crate is pure data: persisted entities, agent-link wire frames, the
//! engine-template façade, and the admin response envelope. No I/O lives here.

pub mod entity;
pub mod template;
pub mod web;
pub mod wire;

pub use entity::{
    Account, AccountClient, Client, ClientTraffic, Inbound, OutboundTraffic, Slave, SlaveCert,
    SlaveSetting, SlaveStatus,
};
pub use template::TemplateDoc;
pub use web::ApiResponse;
pub use wire::{CertEntry, CertReport, Counter, MasterFrame, SlaveFrame, SystemStats, TrafficReport, UserTraffic};

/// Reserved `slave_settings` key holding the engine-config template. The same
/// key in the tenant-wide `settings` table holds the default template copied
/// to newly created slaves.
pub const ENGINE_TEMPLATE_KEY: &str = "engineTemplate";
