//! Near-duplicate detection between code blocks.

/// Blocks at or above this similarity are considered the same block.
pub const SIMILARITY_THRESHOLD: f64 = 0.75;

/// Above this many chars, distance is computed over lines instead of chars.
const LINE_GRANULARITY_CHARS: usize = 2_000;

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein distance over any comparable sequence, two-row DP.
fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let cost = usize::from(x != y);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn ratio<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Similarity in `[0, 1]` between two texts after whitespace normalization.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_whitespace(a);
    let b = normalize_whitespace(b);
    if a == b {
        return 1.0;
    }
    if a.len().max(b.len()) > LINE_GRANULARITY_CHARS {
        // Normalization folded newlines away, so split on statement-ish tokens.
        let ta: Vec<&str> = a.split([';', '{', '}', ' ']).filter(|t| !t.is_empty()).collect();
        let tb: Vec<&str> = b.split([';', '{', '}', ' ']).filter(|t| !t.is_empty()).collect();
        return ratio(&ta, &tb);
    }
    let ca: Vec<char> = a.chars().collect();
    let cb: Vec<char> = b.chars().collect();
    ratio(&ca, &cb)
}

/// Whether two blocks are near-identical: containment or similarity at threshold.
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    let na = normalize_whitespace(a);
    let nb = normalize_whitespace(b);
    if na.is_empty() || nb.is_empty() {
        return na == nb;
    }
    if na.contains(&nb) || nb.contains(&na) {
        return true;
    }
    // Edit distance is at least the length difference.
    let (short, long) = if na.len() <= nb.len() { (&na, &nb) } else { (&nb, &na) };
    if (short.len() as f64) / (long.len() as f64) < SIMILARITY_THRESHOLD {
        return false;
    }
    similarity(&na, &nb) >= SIMILARITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        let a: Vec<char> = "kitten".chars().collect();
        let b: Vec<char> = "sitting".chars().collect();
        assert_eq!(levenshtein(&a, &b), 3);
        assert_eq!(levenshtein::<char>(&[], &b), 7);
    }

    #[test]
    fn test_whitespace_is_ignored() {
        assert_eq!(similarity("a  b\n c", "a b c"), 1.0);
    }

    #[test]
    fn test_containment_is_duplicate() {
        assert!(is_near_duplicate(
            "const a = 1;",
            "const a = 1;\nconst b = 2;\nconsole.log(a + b);"
        ));
    }

    #[test]
    fn test_small_edit_is_duplicate() {
        assert!(is_near_duplicate(
            "function add(a, b) { return a + b; }",
            "function add(x, y) { return x + y; }"
        ));
    }

    #[test]
    fn test_different_blocks_are_kept() {
        assert!(!is_near_duplicate(
            "body { margin: 0; padding: 0; }",
            "document.querySelector('#app').textContent = 'hi';"
        ));
    }
}
