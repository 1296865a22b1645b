use crate::similarity::score;
use bridge_traits::music::Song;
use tracing::debug;

/// Removes near-duplicate songs, keeping the first occurrence.
///
/// A song is kept iff its score against every previously kept song is below
/// `threshold`. Output order follows input order. Quadratic in the number of
/// kept songs.
pub fn deduplicate(songs: Vec<Song>, threshold: f64) -> Vec<Song> {
    let input_len = songs.len();
    let mut unique: Vec<Song> = Vec::with_capacity(input_len);

    for song in songs {
        let duplicate = unique.iter().any(|kept| score(&song, kept) >= threshold);
        if !duplicate {
            unique.push(song);
        }
    }

    debug!(
        input = input_len,
        unique = unique.len(),
        threshold = threshold,
        "Deduplicated songs"
    );

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::music::ProviderKind;

    fn song(name: &str, artist: &str, provider: ProviderKind, id: &str) -> Song {
        Song::new(name, vec![artist.to_string()], "", provider, id)
    }

    #[test]
    fn test_same_isrc_across_providers_collapses() {
        let songs = vec![
            song("Halo", "Beyoncé", ProviderKind::Spotify, "sp1").with_isrc("USSM10804555"),
            song("Halo (Official Video)", "BeyonceVEVO", ProviderKind::YouTube, "yt1")
                .with_isrc("USSM10804555"),
        ];

        let unique = deduplicate(songs, 90.0);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].provider_song_id(), "sp1");
    }

    #[test]
    fn test_first_occurrence_wins_and_order_is_kept() {
        let songs = vec![
            song("Alpha", "One", ProviderKind::Spotify, "1"),
            song("Beta", "Two", ProviderKind::Spotify, "2"),
            song("Alpha (Remastered)", "One", ProviderKind::Tidal, "3"),
            song("Gamma", "Three", ProviderKind::Spotify, "4"),
        ];

        let ids: Vec<_> = deduplicate(songs, 90.0)
            .iter()
            .map(|s| s.provider_song_id().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2", "4"]);
    }

    #[test]
    fn test_threshold_100_keeps_distinct_songs() {
        let songs = vec![
            song("Alpha", "One", ProviderKind::Spotify, "1"),
            song("Alphb", "One", ProviderKind::Spotify, "2"),
            song("Beta", "Two", ProviderKind::Spotify, "3"),
        ];

        assert_eq!(deduplicate(songs.clone(), 100.0), songs);
    }

    #[test]
    fn test_cluster_count_is_order_independent() {
        let forward = vec![
            song("Alpha", "One", ProviderKind::Spotify, "1"),
            song("Alpha", "One", ProviderKind::YouTube, "2"),
            song("Beta", "Two", ProviderKind::Spotify, "3"),
            song("Beta", "Two", ProviderKind::Tidal, "4"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = deduplicate(forward, 90.0);
        let b = deduplicate(reversed, 90.0);

        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
        assert_eq!(a[0].provider_song_id(), "1");
        assert_eq!(b[0].provider_song_id(), "4");
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::new(), 90.0).is_empty());
    }
}
