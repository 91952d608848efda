//! tests/mod.rs
//! Pruebas del orquestador de campañas.

mod support;

mod flow_tests;
