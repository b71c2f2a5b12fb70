//! Table name resolution for backup files.
//!
//! A backup holds one file per table, named after the table in plural form
//! (`companies.csv.gz`, `jobs.csv.gz`). The catalog name is the singular,
//! derived lexically from the file name alone.

use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Invalid regex pattern"));

/// Whether `value` can be used as a catalog database or table name.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_identifier(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Derive a table name from a source object path.
///
/// Takes the final path segment and applies the first matching rule:
/// 1. `<stem>ies<suffix>` becomes `<stem>y`
/// 2. `<stem>s<suffix>` becomes `<stem>`
/// 3. `<stem><suffix>` becomes `<stem>`
///
/// A segment without the suffix is used as is. The result is sanitized into a
/// catalog identifier. Returns `None` when nothing is left of the name.
pub fn table_name(path: &str, suffix: &str) -> Option<String> {
    let segment = path.rsplit('/').next().unwrap_or(path);

    let name = match segment.strip_suffix(suffix) {
        Some(stem) => {
            if let Some(base) = stem.strip_suffix("ies") {
                format!("{base}y")
            } else if let Some(base) = stem.strip_suffix('s') {
                base.to_string()
            } else {
                stem.to_string()
            }
        }
        None => segment.to_string(),
    };

    if name.is_empty() {
        None
    } else {
        Some(sanitize_identifier(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = ".csv.gz";

    #[test]
    fn test_ies_becomes_y() {
        assert_eq!(
            table_name("exports/run-2024-02-01/companies.csv.gz", SUFFIX).as_deref(),
            Some("company")
        );
        assert_eq!(table_name("categories.csv.gz", SUFFIX).as_deref(), Some("category"));
    }

    #[test]
    fn test_trailing_s_stripped() {
        assert_eq!(table_name("a/b/jobs.csv.gz", SUFFIX).as_deref(), Some("job"));
        assert_eq!(
            table_name("a/candidates.csv.gz", SUFFIX).as_deref(),
            Some("candidate")
        );
    }

    #[test]
    fn test_only_first_rule_fires() {
        // "ies" wins over "s"; the result is not stripped again.
        assert_eq!(table_name("series.csv.gz", SUFFIX).as_deref(), Some("sery"));
        assert_eq!(table_name("address.csv.gz", SUFFIX).as_deref(), Some("addres"));
    }

    #[test]
    fn test_no_plural_pattern_keeps_stem() {
        assert_eq!(table_name("x/staff.csv.gz", SUFFIX).as_deref(), Some("staff"));
        assert_eq!(table_name("x/people.csv.gz", SUFFIX).as_deref(), Some("people"));
    }

    #[test]
    fn test_sanitized_to_identifier() {
        assert_eq!(
            table_name("x/job-applications.csv.gz", SUFFIX).as_deref(),
            Some("job_application")
        );
        assert!(is_valid_identifier(
            &table_name("x/weird name.v2.csv.gz", SUFFIX).unwrap()
        ));
    }

    #[test]
    fn test_custom_suffix_and_empty_names() {
        assert_eq!(table_name("dump/users.tsv", ".tsv").as_deref(), Some("user"));
        assert_eq!(table_name("dump/s.csv.gz", SUFFIX), None);
        assert_eq!(table_name("dump/.csv.gz", SUFFIX), None);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("xo_hire_2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("xo-hire"));
        assert!(!is_valid_identifier("db.table"));
    }
}
