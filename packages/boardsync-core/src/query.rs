//! Board filter sets and the keys that identify their merged views.
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt;

/// Filters applied to a board fetch. Each distinct filter set owns its own
/// merged view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardQuery {
    pub search: Option<String>,
    pub column: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<i64>,
    pub tag: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Ask the store to omit heavy fields (images).
    pub light: bool,
}

impl BoardQuery {
    /// Query-string parameters in the store's naming, in a fixed order.
    /// Blank strings are treated as absent.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(search) = non_blank(&self.search) {
            params.push(("search", search.to_string()));
        }
        if let Some(column) = non_blank(&self.column) {
            params.push(("estado", column.to_string()));
        }
        if let Some(priority) = non_blank(&self.priority) {
            params.push(("prioridad", priority.to_string()));
        }
        if let Some(assignee) = self.assignee {
            params.push(("asignado_a", assignee.to_string()));
        }
        if let Some(tag) = self.tag {
            params.push(("tag", tag.to_string()));
        }
        if let Some(from) = self.date_from {
            params.push(("fecha_desde", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.date_to {
            params.push(("fecha_hasta", to.format("%Y-%m-%d").to_string()));
        }
        if self.light {
            params.push(("light", "1".to_string()));
        }
        params
    }

    /// Deterministic key: SHA-256 of the canonical parameter string, first 12 hex chars.
    pub fn key(&self) -> QueryKey {
        let canonical = self
            .to_params()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        QueryKey(hex::encode(&result[..6]))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(pub String);

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_use_store_names() {
        let query = BoardQuery {
            search: Some("pantalla".to_string()),
            column: Some("ingresado".to_string()),
            assignee: Some(4),
            date_from: NaiveDate::from_ymd_opt(2026, 3, 1),
            light: true,
            ..BoardQuery::default()
        };
        assert_eq!(
            query.to_params(),
            vec![
                ("search", "pantalla".to_string()),
                ("estado", "ingresado".to_string()),
                ("asignado_a", "4".to_string()),
                ("fecha_desde", "2026-03-01".to_string()),
                ("light", "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_key_is_stable_and_ignores_blank_filters() {
        let plain = BoardQuery::default();
        let blank = BoardQuery {
            search: Some("   ".to_string()),
            ..BoardQuery::default()
        };
        assert_eq!(plain.key(), blank.key());
        assert_eq!(plain.key().0.len(), 12);
        assert!(plain.key().0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_differs_per_filter_set() {
        let a = BoardQuery {
            priority: Some("alta".to_string()),
            ..BoardQuery::default()
        };
        let b = BoardQuery {
            priority: Some("baja".to_string()),
            ..BoardQuery::default()
        };
        assert_ne!(a.key(), b.key());
    }
}
