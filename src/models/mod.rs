//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod call_log_model;
pub mod campaign_model;
pub mod provider_model;
pub mod recipient_model;
pub mod registry_model;
pub mod webhook_model;
