//! Fuzzy item-name matching
//!
//! Pure functions: identical inputs always produce identical, identically
//! ordered output, so callers can treat suggestions as a stable value.

use crate::models::{Item, ItemMatch};

/// Default minimum similarity for a catalog item to be suggested
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

/// Score `name` against every catalog item and return the best candidates
///
/// Filters to `min_similarity`, sorts by descending score with an
/// alphabetical tiebreak, and truncates to `limit`.
#[must_use]
pub fn suggest(name: &str, catalog: &[Item], limit: usize, min_similarity: f32) -> Vec<ItemMatch> {
    let mut matches: Vec<ItemMatch> = catalog
        .iter()
        .filter_map(|item| {
            let score = similarity(name, &item.name);
            (score >= min_similarity).then(|| ItemMatch {
                item_id: item.id.clone(),
                name: item.name.clone(),
                brand: item.brand.clone(),
                similarity_score: score,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity_score
            .total_cmp(&a.similarity_score)
            .then_with(|| a.name.cmp(&b.name))
    });
    matches.truncate(limit);
    matches
}

/// Normalized Levenshtein similarity over lowercased names, in [0.0, 1.0]
#[must_use]
pub fn similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = levenshtein(&a, &b);
    let max_len = a.len().max(b.len());
    #[allow(clippy::cast_precision_loss)] // item names are far below f32 precision limits
    let score = 1.0 - (distance as f32 / max_len as f32);
    score
}

/// Classic two-row Levenshtein distance over chars
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
