//! Delivery classification by file extension.

use std::fmt;
use std::path::Path;

/// Stage sequence selected for a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryKind {
    /// Data file run through the full load pipeline.
    Csv,
    /// Agreement definition script submitted verbatim.
    Sql,
    /// Anything else; finalized without remote calls.
    Ignored {
        /// Extension including the leading dot, empty when the name has none.
        extension: String,
    },
}

impl DeliveryKind {
    /// Classify `name` by its extension (ASCII case-insensitive).
    #[must_use]
    pub fn classify(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if extension.eq_ignore_ascii_case("csv") {
            Self::Csv
        } else if extension.eq_ignore_ascii_case("sql") {
            Self::Sql
        } else if extension.is_empty() {
            Self::Ignored {
                extension: String::new(),
            }
        } else {
            Self::Ignored {
                extension: format!(".{extension}"),
            }
        }
    }

    /// Metrics label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sql => "sql",
            Self::Ignored { .. } => "ignored",
        }
    }
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_select_the_pipeline() {
        assert_eq!(DeliveryKind::classify("acme_20240101.csv"), DeliveryKind::Csv);
        assert_eq!(DeliveryKind::classify("ACME.CSV"), DeliveryKind::Csv);
        assert_eq!(DeliveryKind::classify("addagreement.sql"), DeliveryKind::Sql);
        assert_eq!(
            DeliveryKind::classify("notes.txt"),
            DeliveryKind::Ignored {
                extension: ".txt".to_string()
            }
        );
    }

    #[test]
    fn names_without_extension_are_ignored() {
        assert_eq!(
            DeliveryKind::classify("README"),
            DeliveryKind::Ignored {
                extension: String::new()
            }
        );
        assert_eq!(
            DeliveryKind::classify(".csv"),
            DeliveryKind::Ignored {
                extension: String::new()
            }
        );
        assert_eq!(DeliveryKind::classify("a.csv.bad").label(), "ignored");
    }
}
