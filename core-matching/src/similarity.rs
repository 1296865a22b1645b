//! Similarity Scorer
//!
//! Weighted fuzzy comparison of two songs on a 0-100 scale. An exact ISRC
//! match short-circuits to 100; otherwise title, artist set and album are
//! compared on cleaned metadata.

use crate::clean::clean;
use bridge_traits::music::Song;
use std::collections::HashSet;

/// Score for two songs sharing an ISRC
pub const EXACT_MATCH_SCORE: f64 = 100.0;

const TITLE_WEIGHT: f64 = 0.45;
const ARTIST_WEIGHT: f64 = 0.45;
const ALBUM_WEIGHT: f64 = 0.10;

/// Similarity between two songs in `[0, 100]`.
///
/// Symmetric. Two songs with the same non-empty ISRC always score 100.
pub fn score(a: &Song, b: &Song) -> f64 {
    if let (Some(isrc_a), Some(isrc_b)) = (a.isrc(), b.isrc()) {
        if !isrc_a.is_empty() && isrc_a == isrc_b {
            return EXACT_MATCH_SCORE;
        }
    }

    let title = normalized_similarity(&clean(a.name()), &clean(b.name()));
    let artist = token_set_similarity(
        &clean(&a.artist_names().join(" ")),
        &clean(&b.artist_names().join(" ")),
    );
    let album = normalized_similarity(&clean(a.album()), &clean(b.album()));

    TITLE_WEIGHT * title + ARTIST_WEIGHT * artist + ALBUM_WEIGHT * album
}

/// `(1 - levenshtein / max_len) * 100`, counted in characters.
///
/// Two empty strings are identical (100).
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Intersection over union of the whitespace tokens, times 100.
///
/// 100 when both sides are empty, 0 when exactly one is.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();

    match (tokens_a.is_empty(), tokens_b.is_empty()) {
        (true, true) => return 100.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::music::ProviderKind;

    fn song(name: &str, artists: &[&str], album: &str) -> Song {
        Song::new(
            name,
            artists.iter().map(|a| a.to_string()).collect(),
            album,
            ProviderKind::Spotify,
            "id",
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_equal_isrc_is_exact_match() {
        let a = song("Completely", &["Different"], "Names").with_isrc("USRC17607839");
        let b = song("Nothing", &["Alike"], "Here").with_isrc("USRC17607839");

        assert_eq!(score(&a, &b), 100.0);
    }

    #[test]
    fn test_isrc_on_one_side_falls_back_to_metadata() {
        let a = song("Halo", &["Beyoncé"], "I Am... Sasha Fierce").with_isrc("USSM10804555");
        let b = song("Halo", &["Beyonce"], "I Am...Sasha Fierce");

        assert!(score(&a, &b) > 95.0);
    }

    #[test]
    fn test_identical_metadata_scores_100() {
        let a = song("Halo", &["Beyoncé"], "I Am... Sasha Fierce");
        assert!(approx(score(&a, &a.clone()), 100.0));
    }

    #[test]
    fn test_tags_and_feat_do_not_reduce_score() {
        let a = song("Stay (feat. Justin Bieber)", &["The Kid LAROI"], "F*CK LOVE 3");
        let b = song("Stay", &["The Kid LAROI"], "F*CK LOVE 3 (Explicit)");

        assert!(approx(score(&a, &b), 100.0));
    }

    #[test]
    fn test_artist_order_is_irrelevant() {
        let a = song("Song", &["Alpha", "Beta"], "Album");
        let b = song("Song", &["Beta", "Alpha"], "Album");

        assert!(approx(score(&a, &b), 100.0));
    }

    #[test]
    fn test_weighting() {
        // title and artist identical, albums fully different and equal length
        let a = song("Song", &["Artist"], "aaaa");
        let b = song("Song", &["Artist"], "bbbb");

        assert!(approx(score(&a, &b), 90.0));
    }

    #[test]
    fn test_score_is_symmetric() {
        let pairs = [
            (
                song("Bohemian Rhapsody", &["Queen"], "A Night at the Opera"),
                song("Bohemian Rhapsody (Remastered 2011)", &["Queen"], "A Night At The Opera"),
            ),
            (
                song("One", &["U2"], "Achtung Baby"),
                song("One", &["Metallica"], "...And Justice for All"),
            ),
            (song("", &[], ""), song("x", &["y"], "z")),
        ];

        for (a, b) in pairs {
            assert!(approx(score(&a, &b), score(&b, &a)));
        }
    }

    #[test]
    fn test_normalized_similarity() {
        assert!(approx(normalized_similarity("", ""), 100.0));
        assert!(approx(normalized_similarity("abc", "abc"), 100.0));
        assert!(approx(normalized_similarity("abcd", "abcf"), 75.0));
        assert!(approx(normalized_similarity("abc", ""), 0.0));
        // counted in characters, not bytes
        assert!(approx(normalized_similarity("東京", "東北"), 50.0));
    }

    #[test]
    fn test_token_set_similarity() {
        assert!(approx(token_set_similarity("", ""), 100.0));
        assert!(approx(token_set_similarity("a", ""), 0.0));
        assert!(approx(token_set_similarity("", "a"), 0.0));
        assert!(approx(token_set_similarity("a b", "b a"), 100.0));
        assert!(approx(token_set_similarity("a b", "b c"), 100.0 / 3.0));
        assert!(approx(token_set_similarity("a a b", "a b"), 100.0));
    }
}
