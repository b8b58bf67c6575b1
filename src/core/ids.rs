//! Objekt-IDs und die konfigurierbare Total-Ordnung darüber.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Bit, das bei numerischen IDs das Override-Gegenstück markiert.
///
/// Ändert `set_color` die Transparenzklasse eines Objekts, wird es in einen
/// eigenen Buffer kopiert, der unter dieser augmentierten ID gezeichnet wird.
pub const OVERRIDE_FLAG: i64 = 1 << 30;

/// Präfix für das Override-Gegenstück bei String-IDs.
const OVERRIDE_PREFIX: &str = "O";

/// Domänen-ID eines Modellobjekts (Datenbank-OID oder GUID-artiger String).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    /// Numerische Objekt-ID
    Numeric(i64),
    /// String-ID (z.B. UUID + RID)
    Text(String),
}

impl ObjectId {
    /// Numerischer Wert der ID, falls vorhanden (auch für numerische Strings).
    pub fn numeric_value(&self) -> Option<i64> {
        match self {
            ObjectId::Numeric(n) => Some(*n),
            ObjectId::Text(s) => s.parse().ok(),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            ObjectId::Numeric(_) => 0,
            ObjectId::Text(_) => 1,
        }
    }
}

/// Gleichstand nach Wert: erst Variante, dann Schreibweise.
fn tie_break(a: &ObjectId, b: &ObjectId) -> Ordering {
    a.variant_rank()
        .cmp(&b.variant_rank())
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Numeric(n) => write!(f, "{n}"),
            ObjectId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ObjectId {
    fn from(value: i64) -> Self {
        ObjectId::Numeric(value)
    }
}

impl From<i32> for ObjectId {
    fn from(value: i32) -> Self {
        ObjectId::Numeric(i64::from(value))
    }
}

impl From<&str> for ObjectId {
    fn from(value: &str) -> Self {
        ObjectId::Text(value.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(value: String) -> Self {
        ObjectId::Text(value)
    }
}

/// Vom Aufrufer gewählte Total-Ordnung über Objekt-IDs.
///
/// Sichtbarkeits-/Selektions-Sets, Registry und Buffer-Range-Abfragen
/// verwenden dieselbe Ordnung, damit gebatchte Range-Lookups stimmen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdOrdering {
    /// Aufsteigend nach Zahlenwert
    #[default]
    Numeric,
    /// Lexikographisch nach String-Darstellung
    Lexicographic,
}

impl IdOrdering {
    /// Wählt die Ordnung passend zur Loader-Einstellung `use_uuid_and_rid`.
    pub fn for_string_ids(use_uuid_and_rid: bool) -> Self {
        if use_uuid_and_rid {
            IdOrdering::Lexicographic
        } else {
            IdOrdering::Numeric
        }
    }

    /// Vergleicht zwei IDs gemäß dieser Ordnung.
    ///
    /// Konsistent mit `Eq`: `Equal` genau dann, wenn `a == b`. Bei gleichem
    /// Wert steht `Numeric` vor `Text`.
    pub fn compare(&self, a: &ObjectId, b: &ObjectId) -> Ordering {
        match self {
            IdOrdering::Numeric => match (a.numeric_value(), b.numeric_value()) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| tie_break(a, b)),
                // Nicht-numerische Strings hinter alle Zahlen sortieren
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.to_string().cmp(&b.to_string()),
            },
            IdOrdering::Lexicographic => match (a, b) {
                (ObjectId::Text(x), ObjectId::Text(y)) => x.cmp(y),
                _ => a
                    .to_string()
                    .cmp(&b.to_string())
                    .then_with(|| tie_break(a, b)),
            },
        }
    }

    /// Sortiert IDs in-place gemäß dieser Ordnung.
    pub fn sort(&self, ids: &mut [ObjectId]) {
        ids.sort_by(|a, b| self.compare(a, b));
    }

    /// Liefert die synthetische ID des (evtl. noch nicht existierenden)
    /// Override-Buffers eines Objekts.
    pub fn override_counterpart(&self, id: &ObjectId) -> ObjectId {
        match (self, id) {
            (IdOrdering::Numeric, ObjectId::Numeric(n)) => ObjectId::Numeric(n | OVERRIDE_FLAG),
            _ => ObjectId::Text(format!("{OVERRIDE_PREFIX}{id}")),
        }
    }
}
