//! # Remote Row Format
//!
//! The row written to both remote stores. Every string value is upper-cased;
//! optional columns are written as empty strings so both stores receive the
//! same column set.
//!
//! ## Derived Columns
//!
//! - **naipe**: instrument family derived from the instrument name
//! - **organist class**: collapsed to the `OFICIALIZADA` family when it
//!   names any officialized variant
//! - **submitted-by**: first and last name of the operator only
//! - **recorded instant**: the event time as an RFC 3339 UTC instant, the
//!   column the index store range-queries for duplicate lookups

use crate::reference::ResolvedAttendance;
use crate::shared::normalize::normalize_text;
use crate::shared::record::AttendanceRecord;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event date/time column format (pt-BR locale)
pub const EVENT_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

const STRINGS: &[&str] = &["VIOLINO", "VIOLA", "VIOLONCELO", "CONTRABAIXO"];
const WOODWINDS: &[&str] = &[
    "FLAUTA",
    "OBOE",
    "OBOE D'AMORE",
    "CORNE INGLES",
    "CLARINETE",
    "CLARINETE ALTO",
    "CLARINETE BAIXO",
    "CLARONE",
    "FAGOTE",
    "SAXOFONE",
    "SAXOFONE SOPRANO",
    "SAXOFONE ALTO",
    "SAXOFONE TENOR",
    "SAXOFONE BARITONO",
];
const BRASS: &[&str] = &[
    "TROMPETE",
    "CORNET",
    "FLUGELHORN",
    "TROMPA",
    "TROMBONE",
    "TROMBONITO",
    "EUFONIO",
    "BOMBARDINO",
    "TUBA",
];
const KEYBOARD: &[&str] = &["ORGAO", "ACORDEON"];

/// One attendance row as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    #[serde(rename = "NOME_COMPLETO")]
    pub full_name: String,
    #[serde(rename = "COMUM")]
    pub community: String,
    #[serde(rename = "CIDADE")]
    pub city: String,
    #[serde(rename = "CARGO")]
    pub role: String,
    #[serde(rename = "INSTRUMENTO")]
    pub instrument: String,
    #[serde(rename = "NAIPE_INSTRUMENTO")]
    pub naipe: String,
    #[serde(rename = "CLASSE_ORGANISTA")]
    pub organist_class: String,
    #[serde(rename = "NIVEL")]
    pub level: String,
    #[serde(rename = "LOCAL_ENSAIO")]
    pub venue: String,
    #[serde(rename = "DATA_ENSAIO")]
    pub event_time: String,
    #[serde(rename = "REGISTRADO_POR")]
    pub submitted_by: String,
    #[serde(rename = "ANOTACOES")]
    pub notes: String,
    #[serde(rename = "DATA_HORA_UTC")]
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceRow {
    /// Builds the remote row from a record and its resolved display values
    pub fn build(record: &AttendanceRecord, resolved: &ResolvedAttendance, offset: FixedOffset) -> Self {
        let instrument = resolved.instrument.as_deref().unwrap_or_default();
        Self {
            uuid: record.id,
            full_name: upper(&resolved.full_name),
            community: upper(&resolved.community),
            city: upper(resolved.city.as_deref().unwrap_or_default()),
            role: upper(&resolved.role),
            instrument: upper(instrument),
            naipe: naipe_for(instrument).unwrap_or_default().to_string(),
            organist_class: resolved
                .organist_class
                .as_deref()
                .map(normalize_organist_class)
                .unwrap_or_default(),
            level: record.level.map(|level| level.label().to_string()).unwrap_or_default(),
            venue: upper(&record.venue),
            event_time: record
                .timestamp
                .with_timezone(&offset)
                .format(EVENT_TIME_FORMAT)
                .to_string(),
            submitted_by: first_and_last_name(&record.submitted_by),
            notes: upper(record.notes.as_deref().unwrap_or_default()),
            recorded_at: record.timestamp,
        }
    }
}

fn upper(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Instrument family ("naipe") for an instrument name
pub fn naipe_for(instrument: &str) -> Option<&'static str> {
    let key = normalize_text(instrument);
    if key.is_empty() {
        return None;
    }
    let family = if STRINGS.contains(&key.as_str()) {
        "CORDAS"
    } else if WOODWINDS.contains(&key.as_str()) {
        "MADEIRAS"
    } else if BRASS.contains(&key.as_str()) {
        "METAIS"
    } else if KEYBOARD.contains(&key.as_str()) {
        "TECLADO"
    } else {
        "OUTROS"
    };
    Some(family)
}

/// Collapses officialized variants ("Oficializado", "oficial") to `OFICIALIZADA`
pub fn normalize_organist_class(value: &str) -> String {
    let key = normalize_text(value);
    if key.starts_with("OFICIAL") {
        "OFICIALIZADA".to_string()
    } else {
        key
    }
}

/// Keeps only the first and last name of the operator
pub fn first_and_last_name(value: &str) -> String {
    let parts: Vec<&str> = value.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [only] => only.to_uppercase(),
        [first, .., last] => format!("{} {}", first.to_uppercase(), last.to_uppercase()),
    }
}
