//! Text normalization used for name matching and slug derivation.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical decomposition with combining marks dropped, so `É` and `E\u{301}` both fold to `E`.
pub fn fold_diacritics(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Lowercase, diacritics stripped, non-alphanumerics removed, whitespace collapsed.
pub fn normalize_name(input: &str) -> String {
    fold_diacritics(input)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic display slug: the normalized name joined with dashes.
pub fn slugify(input: &str) -> String {
    normalize_name(input).replace(' ', "-")
}

/// Folded, lowercased text for keyword classification.
pub fn fold_lower(input: &str) -> String {
    fold_diacritics(input).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_names_ignore_case_accents_and_punctuation() {
        assert_eq!(normalize_name("JUAN PÉREZ LÓPEZ"), "juan perez lopez");
        assert_eq!(normalize_name("  Juan   Perez  Lopez "), "juan perez lopez");
        assert_eq!(normalize_name("María-José O'Neill"), "mariajose oneill");
        assert_eq!(normalize_name("NUÑEZ"), "nunez");
    }

    #[test]
    fn composed_and_decomposed_accents_fold_alike() {
        assert_eq!(fold_diacritics("JUAN P\u{c9}REZ"), "JUAN PEREZ");
        assert_eq!(fold_diacritics("JUAN PE\u{301}REZ"), "JUAN PEREZ");
        assert_eq!(fold_lower("Apelaci\u{f3}n"), "apelacion");
    }

    #[test]
    fn slug_is_stable_for_equivalent_names() {
        assert_eq!(slugify("JUAN PÉREZ LÓPEZ"), "juan-perez-lopez");
        assert_eq!(slugify("juan perez lopez"), slugify("Juan Pérez López"));
        assert_eq!(slugify("***"), "");
    }
}
