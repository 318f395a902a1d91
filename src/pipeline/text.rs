use crate::models::BrandToken;

const VOWELS: [char; 5] = ['a', 'e', 'i', 'o', 'u'];

/// Cleans raw OCR output down to a single plausible brand token, or `None`
/// when everything looks like recognition noise.
///
/// Keeps lowercase alphanumerics plus hyphen/underscore, picks the longest
/// token (first wins on ties), then rejects short fragments, pure numbers,
/// single repeated characters, and vowel-less consonant runs.
pub fn normalize_brand_word(raw: &str) -> Option<BrandToken> {
    if raw.is_empty() {
        return None;
    }

    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .collect();
    // Stable sort, so the earliest of equally long tokens stays first.
    tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let best = *tokens.first()?;

    if best.len() < 3 {
        return None;
    }
    if best.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut chars = best.chars();
    let first = chars.next()?;
    if chars.all(|c| c == first) {
        return None;
    }

    let vowels = best.chars().filter(|c| VOWELS.contains(c)).count();
    let consonants = best
        .chars()
        .filter(|c| c.is_ascii_lowercase() && !VOWELS.contains(c))
        .count();
    if consonants > 2 && vowels == 0 {
        return None;
    }

    Some(BrandToken::new(best.to_string()))
}
