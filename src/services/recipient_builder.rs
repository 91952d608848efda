//! services/recipient_builder.rs
//! Convierte filas de la planilla en destinatarios tipados.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::errors::CampaignError;
use crate::models::campaign_model::Roster;
use crate::models::recipient_model::{DynamicVariables, Recipient};
use crate::services::phone_normalizer::normalize_phone;

const PHONE_FIELD: &str = "phone";

/// Columnas que se prueban cuando el usuario no mapeó el campo.
fn default_columns(field: &str) -> &'static [&'static str] {
    match field {
        PHONE_FIELD => &[
            "phone",
            "phone_number",
            "phonenumber",
            "mobile",
            "telefon",
            "telefono",
            "gsm",
            "tel",
        ],
        "customer_name" => &["customer_name", "name", "full_name", "ad_soyad", "nombre"],
        "debt_amount" => &["debt_amount", "amount", "debt", "borc", "tutar"],
        "currency" => &["currency", "para_birimi", "moneda"],
        "due_date" => &["due_date", "vade", "vade_tarihi"],
        "product_name" => &["product_name", "product", "urun"],
        "product_price" => &["product_price", "price", "fiyat"],
        "campaign_name" => &["campaign_name"],
        "appointment_date" => &["appointment_date", "appointment", "randevu"],
        "custom_1" => &["custom_1"],
        "custom_2" => &["custom_2"],
        _ => &[],
    }
}

/// Destinatario todavía sin ID (pendiente del filtro de no-llamar).
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientDraft {
    pub row_index: usize,
    pub phone_e164: String,
    pub dynamic_variables: DynamicVariables,
}

#[derive(Debug, Clone)]
pub struct BuiltRoster {
    pub drafts: Vec<RecipientDraft>,
    pub dropped_invalid: usize,
    pub skipped_duplicates: usize,
}

pub struct RecipientBuilder<'a> {
    mapping: HashMap<String, String>,
    default_country: &'a str,
    campaign_name: &'a str,
}

impl<'a> RecipientBuilder<'a> {
    pub fn new(
        mapping: Option<&HashMap<String, String>>,
        default_country: &'a str,
        campaign_name: &'a str,
    ) -> Self {
        let mapping = mapping
            .map(|m| {
                m.iter()
                    .filter_map(|(field, column)| {
                        let field = field.trim().to_ascii_lowercase();
                        let known = field == PHONE_FIELD
                            || DynamicVariables::FIELDS.contains(&field.as_str());
                        if !known {
                            log::warn!("(RecipientBuilder) Campo de mapeo ignorado: '{}'", field);
                            return None;
                        }
                        Some((field, column.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        RecipientBuilder {
            mapping,
            default_country,
            campaign_name,
        }
    }

    fn columns_for(&self, field: &str) -> Vec<&str> {
        match self.mapping.get(field) {
            Some(column) => vec![column.as_str()],
            None => default_columns(field).to_vec(),
        }
    }

    /// Normaliza teléfonos y arma las variables por fila. Las filas sin
    /// teléfono utilizable se descartan y se cuentan; no abortan el lote.
    pub fn build(&self, roster: &Roster) -> Result<BuiltRoster, CampaignError> {
        if roster.rows.is_empty() {
            return Err(CampaignError::validation(
                "EMPTY_ROSTER",
                "La planilla no contiene filas",
            ));
        }

        if let Some(column) = self.mapping.get(PHONE_FIELD) {
            let present = roster.columns.is_empty()
                || roster
                    .columns
                    .iter()
                    .any(|c| c.trim().eq_ignore_ascii_case(column));
            if !present {
                return Err(CampaignError::validation(
                    "PHONE_COLUMN_MISSING",
                    format!("La columna de teléfono '{}' no existe en la planilla", column),
                ));
            }
        }

        let phone_columns = self.columns_for(PHONE_FIELD);
        let mut seen = HashSet::new();
        let mut drafts = Vec::with_capacity(roster.rows.len());
        let mut dropped_invalid = 0;
        let mut skipped_duplicates = 0;

        for (row_index, row) in roster.rows.iter().enumerate() {
            let raw_phone = lookup(row, &phone_columns).and_then(coerce_cell);
            let phone = match raw_phone
                .as_deref()
                .and_then(|p| normalize_phone(p, self.default_country))
            {
                Some(p) => p,
                None => {
                    log::warn!(
                        "(RecipientBuilder) Fila {} descartada, teléfono inválido: {:?}",
                        row_index + 1,
                        raw_phone
                    );
                    dropped_invalid += 1;
                    continue;
                }
            };

            if !seen.insert(phone.clone()) {
                skipped_duplicates += 1;
                continue;
            }

            drafts.push(RecipientDraft {
                row_index,
                phone_e164: phone,
                dynamic_variables: self.variables_for(row),
            });
        }

        if drafts.is_empty() {
            return Err(CampaignError::validation(
                "NO_VALID_RECIPIENTS",
                format!(
                    "Ninguna fila tiene un teléfono válido ({} descartadas)",
                    dropped_invalid
                ),
            ));
        }

        log::info!(
            "(RecipientBuilder) {} destinatarios válidos, {} inválidos, {} duplicados",
            drafts.len(),
            dropped_invalid,
            skipped_duplicates
        );

        Ok(BuiltRoster {
            drafts,
            dropped_invalid,
            skipped_duplicates,
        })
    }

    fn variables_for(&self, row: &Map<String, Value>) -> DynamicVariables {
        let mut vars = DynamicVariables::default();
        for field in DynamicVariables::FIELDS {
            if let Some(value) = lookup(row, &self.columns_for(field)).and_then(coerce_cell) {
                vars.set(field, value);
            }
        }
        if vars.campaign_name.is_none() && !self.campaign_name.is_empty() {
            vars.campaign_name = Some(self.campaign_name.to_string());
        }
        vars
    }
}

/// Asigna `recipient_<n>` en orden, sólo a los que sobrevivieron todos los filtros.
pub fn assign_ids(drafts: Vec<RecipientDraft>) -> Vec<Recipient> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| Recipient::new(format!("recipient_{}", i + 1), d.phone_e164, d.dynamic_variables))
        .collect()
}

fn lookup<'r>(row: &'r Map<String, Value>, columns: &[&str]) -> Option<&'r Value> {
    columns.iter().find_map(|col| {
        row.iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(col))
            .map(|(_, v)| v)
    })
}

/// Todo valor de celda se envía como string; vacíos y null no se envían.
pub fn coerce_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < 1e16 {
                    Some(format!("{:.0}", f))
                } else {
                    Some(f.to_string())
                }
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
