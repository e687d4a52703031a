//! Tag-based character recommendations

use std::collections::BTreeSet;
use vnchat_core::Character;

/// Number of characters recommended
pub const TOP_N: usize = 10;

/// A character with its similarity to the user's preferred tags
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub character: Character,
    pub score: f64,
}

/// Cosine similarity of two binary tag vectors over a shared universe
fn cosine(a: &BTreeSet<&str>, b: &BTreeSet<&str>, universe: &BTreeSet<&str>) -> f64 {
    let a: BTreeSet<_> = a.intersection(universe).collect();
    let b: BTreeSet<_> = b.intersection(universe).collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot = a.intersection(&b).count() as f64;
    dot / ((a.len() as f64).sqrt() * (b.len() as f64).sqrt())
}

/// Rank characters by cosine similarity between `user_tags` and each
/// character's tags. Characters without tags are never recommended.
pub fn recommend(user_tags: &[String], characters: &[Character], top_n: usize) -> Vec<Recommendation> {
    let tag_sets: Vec<Vec<String>> = characters.iter().map(|c| c.tags()).collect();
    let universe: BTreeSet<&str> = tag_sets.iter().flatten().map(String::as_str).collect();
    if universe.is_empty() {
        tracing::warn!("No tags found in any character");
        return Vec::new();
    }

    let user: BTreeSet<&str> = user_tags.iter().map(String::as_str).collect();
    let mut scored: Vec<Recommendation> = characters
        .iter()
        .zip(&tag_sets)
        .filter(|(_, tags)| !tags.is_empty())
        .map(|(character, tags)| {
            let tags: BTreeSet<&str> = tags.iter().map(String::as_str).collect();
            Recommendation {
                character: character.clone(),
                score: cosine(&user, &tags, &universe),
            }
        })
        .collect();

    // Stable sort keeps library order among equal scores
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_n);
    scored
}
