//! Token-set similarity used for grouping suggestions

use std::collections::HashSet;

/// Lowercased alphanumeric tokens
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard coefficient of the token sets. Two empty texts are identical,
/// one empty text shares nothing.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);
    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    let intersection = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("Hardcoded API-key in auth.ts!");
        assert!(tokens.contains("api"));
        assert!(tokens.contains("key"));
        assert!(tokens.contains("ts"));
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("unused variable in handler", "unused variable in handler function") - 0.8).abs() < 1e-9);
        assert_eq!(jaccard("Same Words", "same words"), 1.0);
    }

    #[test]
    fn test_jaccard_empty() {
        assert_eq!(jaccard("", ""), 1.0);
        assert_eq!(jaccard("", "text"), 0.0);
        assert_eq!(jaccard("!!", "text"), 0.0);
    }
}
