//! Validation helpers for DTOs.

use std::num::IntErrorKind;

use validator::{Validate, ValidationError, ValidationErrors};

use crate::dto::canvas::SnapshotQuery;

/// Parsed snapshot dimensions. Upper bounds depend on configuration and are checked by the
/// snapshot service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Validate)]
pub struct GridDimensions {
    /// Requested column count.
    #[validate(range(min = 1, message = "columns must be a positive integer"))]
    pub columns: i64,
    /// Requested row count.
    #[validate(range(min = 1, message = "rows must be a positive integer"))]
    pub rows: i64,
}

impl GridDimensions {
    /// Parse and validate the raw query, reporting every offending field at once.
    pub fn from_query(query: &SnapshotQuery) -> Result<Self, ValidationErrors> {
        let columns = parse_dimension("columns", query.columns.as_deref());
        let rows = parse_dimension("rows", query.rows.as_deref());

        match (columns, rows) {
            (Ok(columns), Ok(rows)) => {
                let dims = Self { columns, rows };
                dims.validate()?;
                Ok(dims)
            }
            (columns, rows) => {
                let mut errors = ValidationErrors::new();
                if let Err(err) = columns {
                    errors.add("columns", err);
                }
                if let Err(err) = rows {
                    errors.add("rows", err);
                }
                Err(errors)
            }
        }
    }
}

/// Parse a required decimal integer query value.
///
/// Integers outside the `i64` range saturate, so an overflowing value is still reported as
/// too large rather than malformed.
///
/// # Examples
///
/// ```ignore
/// parse_dimension("rows", Some("32"))                   // Ok(32)
/// parse_dimension("rows", Some("99999999999999999999")) // Ok(i64::MAX)
/// parse_dimension("rows", Some("3.5"))                  // Err - not an integer
/// parse_dimension("rows", None)                         // Err - missing
/// ```
pub fn parse_dimension(field: &'static str, raw: Option<&str>) -> Result<i64, ValidationError> {
    let Some(raw) = raw else {
        let mut err = ValidationError::new("missing");
        err.message = Some(format!("{field} is required").into());
        return Err(err);
    };

    match raw.parse::<i64>() {
        Ok(value) => Ok(value),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => Ok(i64::MAX),
        Err(err) if *err.kind() == IntErrorKind::NegOverflow => Ok(i64::MIN),
        Err(_) => {
            let mut err = ValidationError::new("not_an_integer");
            err.message = Some(format!("{field} must be an integer (got `{raw}`)").into());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(columns: Option<&str>, rows: Option<&str>) -> SnapshotQuery {
        SnapshotQuery {
            columns: columns.map(str::to_owned),
            rows: rows.map(str::to_owned),
        }
    }

    #[test]
    fn test_valid_dimensions() {
        assert_eq!(
            GridDimensions::from_query(&query(Some("2"), Some("1"))).unwrap(),
            GridDimensions {
                columns: 2,
                rows: 1
            }
        );
    }

    #[test]
    fn test_missing_or_non_numeric_dimensions() {
        assert!(GridDimensions::from_query(&query(None, Some("1"))).is_err());
        assert!(GridDimensions::from_query(&query(Some("2"), None)).is_err());
        assert!(GridDimensions::from_query(&query(Some("abc"), Some("1"))).is_err());
        assert!(GridDimensions::from_query(&query(Some("2"), Some("1.5"))).is_err());
        assert!(GridDimensions::from_query(&query(Some(""), Some("1"))).is_err());
    }

    #[test]
    fn test_overflowing_dimensions_saturate() {
        assert_eq!(
            parse_dimension("columns", Some("99999999999999999999")).unwrap(),
            i64::MAX
        );
        let huge_negative = query(Some("2"), Some("-99999999999999999999"));
        let err = GridDimensions::from_query(&huge_negative).unwrap_err();
        assert!(err.field_errors().contains_key("rows"));
    }

    #[test]
    fn test_non_positive_dimensions() {
        let err = GridDimensions::from_query(&query(Some("0"), Some("-4"))).unwrap_err();
        let fields = err.field_errors();
        assert!(fields.contains_key("columns"));
        assert!(fields.contains_key("rows"));
    }
}
