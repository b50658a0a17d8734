//! Input row layout.
//!
//! Which columns hold the identifier and the source/destination URLs is data,
//! not control flow: a [`RowSchema`] lists them, and every row-shape decision
//! (minimum width, eligible pairs) is derived from it.

use crate::error::RowError;
use crate::types::UrlPair;
use serde::{Deserialize, Serialize};

/// One data row of the input CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based line of the input file the row started on
    pub line: u64,
    pub fields: Vec<String>,
}

impl Row {
    pub fn new(line: u64, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// Column positions of one source/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFields {
    pub name: String,
    pub source: usize,
    pub destination: usize,
}

impl PairFields {
    pub fn new<N: Into<String>>(name: N, source: usize, destination: usize) -> Self {
        Self {
            name: name.into(),
            source,
            destination,
        }
    }
}

/// Layout of an input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSchema {
    /// Column holding the product identifier (SKU)
    pub id_field: usize,

    /// Pairs, in the order they are listed in the row
    pub pairs: Vec<PairFields>,
}

impl Default for RowSchema {
    fn default() -> Self {
        Self {
            id_field: 0,
            pairs: vec![
                PairFields::new("primary", 8, 11),
                PairFields::new("secondary", 9, 12),
                PairFields::new("tertiary", 10, 13),
            ],
        }
    }
}

impl RowSchema {
    /// Smallest number of fields a row needs to be usable.
    pub fn min_fields(&self) -> usize {
        self.pairs
            .iter()
            .flat_map(|p| [p.source, p.destination])
            .chain(std::iter::once(self.id_field))
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Reject rows that are too short for this schema.
    pub fn check(&self, row: &Row) -> Result<(), RowError> {
        let expected = self.min_fields();
        if row.fields.len() < expected {
            return Err(RowError::TooShort {
                line: row.line,
                expected,
                found: row.fields.len(),
            });
        }
        Ok(())
    }

    /// Identifier of the row, empty if the column is missing.
    pub fn identifier<'a>(&self, row: &'a Row) -> &'a str {
        row.field(self.id_field).unwrap_or("")
    }

    /// Pairs of the row whose source and destination are both non-empty.
    ///
    /// Fields are taken verbatim; the transport trims the request target.
    pub fn eligible_pairs(&self, row: &Row) -> Vec<UrlPair> {
        self.pairs
            .iter()
            .filter_map(|fields| {
                let source = row.field(fields.source)?;
                let destination = row.field(fields.destination)?;
                if source.is_empty() || destination.is_empty() {
                    return None;
                }
                Some(UrlPair {
                    name: fields.name.clone(),
                    source: source.to_string(),
                    destination: destination.to_string(),
                })
            })
            .collect()
    }

    /// Structural problems that make the schema unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.pairs.is_empty() {
            return Err("Schema must define at least one URL pair".to_string());
        }
        for (i, pair) in self.pairs.iter().enumerate() {
            if pair.name.trim().is_empty() {
                return Err(format!("Schema pair #{} has an empty name", i + 1));
            }
            if pair.source == pair.destination {
                return Err(format!(
                    "Schema pair '{}' uses column {} for both source and destination",
                    pair.name, pair.source
                ));
            }
            if self.pairs[..i].iter().any(|other| other.name == pair.name) {
                return Err(format!("Duplicate schema pair name '{}'", pair.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(len: usize, set: &[(usize, &str)]) -> Row {
        let mut fields = vec![String::new(); len];
        for (i, v) in set {
            fields[*i] = v.to_string();
        }
        Row::new(2, fields)
    }

    #[test]
    fn test_default_schema_needs_fourteen_fields() {
        let schema = RowSchema::default();
        assert_eq!(schema.min_fields(), 14);
        assert!(schema.check(&row_with(14, &[])).is_ok());
        assert_eq!(
            schema.check(&row_with(13, &[])),
            Err(RowError::TooShort {
                line: 2,
                expected: 14,
                found: 13
            })
        );
    }

    #[test]
    fn test_eligible_pairs_require_both_fields() {
        let schema = RowSchema::default();
        let row = row_with(
            14,
            &[
                (0, "SKU-9"),
                (8, "https://shop/a"),
                (11, "https://shop/b"),
                (9, "https://shop/c"),
                (13, "https://shop/d"),
            ],
        );

        let pairs = schema.eligible_pairs(&row);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "primary");
        assert_eq!(pairs[0].source, "https://shop/a");
        assert_eq!(pairs[0].destination, "https://shop/b");
        assert_eq!(schema.identifier(&row), "SKU-9");
    }

    #[test]
    fn test_fields_are_kept_verbatim() {
        let schema = RowSchema::default();
        let row = row_with(
            14,
            &[
                (8, " "),
                (11, "https://shop/b"),
                (9, " https://shop/c "),
                (12, "https://shop/d"),
            ],
        );

        let pairs = schema.eligible_pairs(&row);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].source, " ");
        assert_eq!(pairs[1].source, " https://shop/c ");
    }

    #[test]
    fn test_custom_schema() {
        let schema = RowSchema {
            id_field: 1,
            pairs: vec![PairFields::new("only", 2, 3)],
        };
        assert_eq!(schema.min_fields(), 4);
        let row = Row::new(5, vec!["x".into(), "id".into(), "s".into(), "d".into()]);
        assert_eq!(schema.identifier(&row), "id");
        assert_eq!(schema.eligible_pairs(&row).len(), 1);
    }

    #[test]
    fn test_validate() {
        assert!(RowSchema::default().validate().is_ok());

        let empty = RowSchema {
            id_field: 0,
            pairs: vec![],
        };
        assert!(empty.validate().is_err());

        let dup = RowSchema {
            id_field: 0,
            pairs: vec![PairFields::new("a", 1, 2), PairFields::new("a", 3, 4)],
        };
        assert!(dup.validate().unwrap_err().contains("Duplicate"));

        let same = RowSchema {
            id_field: 0,
            pairs: vec![PairFields::new("a", 1, 1)],
        };
        assert!(same.validate().is_err());
    }
}
