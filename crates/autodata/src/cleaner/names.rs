//! Column name normalization.

use crate::types::ColumnRename;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w]").expect("Invalid regex: non-word characters"));

/// Trim, lowercase, spaces to underscores, then drop anything that is not
/// alphanumeric or underscore.
pub(crate) fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace(' ', "_");
    NON_WORD.replace_all(&lowered, "").into_owned()
}

/// Normalize every name and resolve collisions.
///
/// The first column to produce a base name keeps it. A later column with the
/// same base name gets the smallest `_{n}` suffix (n >= 1) that is neither a
/// base name of some other column nor already assigned. A name that
/// normalizes to nothing becomes `column_{position}`.
pub(crate) fn plan_renames(names: &[String]) -> Vec<ColumnRename> {
    let bases: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let base = normalize_name(name);
            if base.is_empty() {
                format!("column_{}", idx)
            } else {
                base
            }
        })
        .collect();

    let reserved: HashSet<&str> = bases.iter().map(String::as_str).collect();
    let mut assigned: HashSet<String> = HashSet::with_capacity(names.len());
    let mut renames = Vec::with_capacity(names.len());

    for (original, base) in names.iter().zip(bases.iter()) {
        let (normalized, collided) = if assigned.contains(base) {
            let mut n = 1;
            loop {
                let candidate = format!("{}_{}", base, n);
                if !reserved.contains(candidate.as_str()) && !assigned.contains(&candidate) {
                    break (candidate, true);
                }
                n += 1;
            }
        } else {
            (base.clone(), false)
        };

        assigned.insert(normalized.clone());
        renames.push(ColumnRename {
            original: original.clone(),
            normalized,
            collided,
        });
    }

    renames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn normalized(list: &[&str]) -> Vec<String> {
        plan_renames(&names(list))
            .into_iter()
            .map(|r| r.normalized)
            .collect()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(" User ID"), "user_id");
        assert_eq!(normalize_name("Email-Address!"), "emailaddress");
        assert_eq!(normalize_name("already_clean_1"), "already_clean_1");
        assert_eq!(normalize_name("  Total  Sales ($) "), "total__sales_");
    }

    #[test]
    fn test_collision_gets_suffix() {
        assert_eq!(normalized(&["Name", "name", "NAME"]), vec!["name", "name_1", "name_2"]);
    }

    #[test]
    fn test_collision_skips_reserved_names() {
        // "a_1" is a real column, so the duplicate "a" must not take it.
        assert_eq!(normalized(&["A", "a", "a_1"]), vec!["a", "a_2", "a_1"]);
    }

    #[test]
    fn test_empty_name_uses_position() {
        assert_eq!(normalized(&["!!!", "ok"]), vec!["column_0", "ok"]);
    }

    #[test]
    fn test_collided_flag() {
        let renames = plan_renames(&names(&["Id", "id"]));
        assert!(!renames[0].collided);
        assert!(renames[0].changed());
        assert!(renames[1].collided);
        assert_eq!(renames[1].normalized, "id_1");
    }

    #[test]
    fn test_idempotent_on_normalized_names() {
        let first = normalized(&["A", "a", "b c"]);
        let second: Vec<String> = plan_renames(&first).into_iter().map(|r| r.normalized).collect();
        assert_eq!(first, second);
    }
}
