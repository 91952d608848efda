//! services/mod.rs
//! Módulo que agrupa los "servicios" o capas de negocio de la app.

pub mod call_log_service;
pub mod campaign_service;
pub mod campaign_store;
pub mod campaign_submitter;
pub mod cancellation;
pub mod dnc_guard;
pub mod phone_normalizer;
pub mod recipient_builder;
pub mod reconciliation;
pub mod registry_service;
pub mod voice_provider;
pub mod webhook_signature;
