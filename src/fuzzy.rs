//! Lexical fuzzy matching.
//!
//! A query is split into lowercase alphanumeric terms. Each term is aligned
//! against a field with a semi-global edit distance: the minimum number of
//! insertions, deletions, and substitutions needed to turn the term into
//! some substring of the field that begins at a token start. This tolerates
//! typos (`databse` → `database`) and partial tokens (`postg` inside
//! `postgres`), while `rust` does not match inside `infrastructure`.
//!
//! A term matches a field when its distance is within the allowed error
//! budget, which grows with term length. Short terms must match exactly.

/// Terms shorter than this must match without errors.
const MIN_FUZZY_TERM_LEN: usize = 4;

/// Split text into lowercase alphanumeric terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Maximum edit errors tolerated for a term of `len` characters.
pub fn allowed_errors(len: usize, threshold: f64) -> usize {
    if len < MIN_FUZZY_TERM_LEN {
        0
    } else {
        (len as f64 * threshold).floor() as usize
    }
}

/// Minimum edit distance between `term` and any substring of `text` that
/// starts at a token boundary.
///
/// Both inputs are expected lowercase. Runs in `O(|term| × |text|)` time
/// with a single row of state.
pub fn token_prefix_distance(term: &[char], text: &[char]) -> usize {
    if term.is_empty() {
        return 0;
    }
    if text.is_empty() {
        return term.len();
    }

    // prev[j]: distance of term[..i] against a substring ending at text[j-1].
    // Row 0 is zero only where a token starts; a mid-token start already
    // costs the whole term, which is never within budget.
    let mut prev: Vec<usize> = (0..=text.len())
        .map(|j| {
            if j == 0 || !text[j - 1].is_alphanumeric() {
                0
            } else {
                term.len()
            }
        })
        .collect();
    let mut curr = vec![0usize; text.len() + 1];

    for (i, &tc) in term.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &xc) in text.iter().enumerate() {
            let substitution = prev[j] + usize::from(tc != xc);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev.iter().copied().min().unwrap_or(term.len())
}

/// Result of aligning one term against one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermMatch {
    pub errors: usize,
    /// `1 - errors / len`, in `(0, 1]`.
    pub quality: f64,
}

/// Align a term against lowercase field text, returning a match when the
/// distance is within the error budget.
pub fn match_term(term: &[char], text: &[char], threshold: f64) -> Option<TermMatch> {
    if term.is_empty() {
        return None;
    }
    let budget = allowed_errors(term.len(), threshold);
    let errors = token_prefix_distance(term, text);
    if errors > budget {
        return None;
    }
    Some(TermMatch {
        errors,
        quality: 1.0 - errors as f64 / term.len() as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Cloud-Hosting, API & ci/cd"),
            vec!["cloud", "hosting", "api", "ci", "cd"]
        );
        assert!(tokenize("  --  ").is_empty());
    }

    #[test]
    fn test_token_prefix_is_zero() {
        assert_eq!(token_prefix_distance(&chars("data"), &chars("database")), 0);
        assert_eq!(token_prefix_distance(&chars("postg"), &chars("postgres cloud")), 0);
        assert_eq!(token_prefix_distance(&chars("cloud"), &chars("postgres cloud")), 0);
    }

    #[test]
    fn test_typo_costs_one() {
        assert_eq!(token_prefix_distance(&chars("databse"), &chars("database")), 1);
        assert_eq!(token_prefix_distance(&chars("hostng"), &chars("static hosting")), 1);
    }

    #[test]
    fn test_no_overlap_costs_full_length() {
        assert_eq!(token_prefix_distance(&chars("zzz"), &chars("abc")), 3);
        assert_eq!(token_prefix_distance(&chars("abc"), &chars("")), 3);
    }

    #[test]
    fn test_error_budget_scales_with_length() {
        assert_eq!(allowed_errors(3, 0.34), 0);
        assert_eq!(allowed_errors(4, 0.34), 1);
        assert_eq!(allowed_errors(7, 0.34), 2);
    }

    #[test]
    fn test_match_term_respects_budget() {
        let m = match_term(&chars("databse"), &chars("managed database"), 0.34).unwrap();
        assert_eq!(m.errors, 1);
        assert!(m.quality > 0.8);

        assert!(match_term(&chars("api"), &chars("apx"), 0.34).is_none());
        assert!(match_term(&chars("kubernetes"), &chars("static pages"), 0.34).is_none());
    }

    #[test]
    fn test_mid_token_start_does_not_match() {
        assert!(token_prefix_distance(&chars("base"), &chars("database")) > 0);
        assert!(match_term(&chars("rust"), &chars("cloud infrastructure"), 0.34).is_none());
        assert!(match_term(&chars("trust"), &chars("cloud infrastructure"), 0.34).is_none());
        assert!(match_term(&chars("rust"), &chars("written in rust"), 0.34).is_some());
    }

    #[test]
    fn test_unicode_text() {
        assert_eq!(token_prefix_distance(&chars("café"), &chars("le café noir")), 0);
    }
}
