//! Song metadata from video titles

use core_matching::clean;
use once_cell::sync::Lazy;
use regex::Regex;

/// `,` and `&` between artists, or a `feat.` / `ft.` marker
static ARTIST_SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[,&]\s*|\s+(?:feat|ft)\.?\s+")
        .expect("valid artist separator pattern")
});

const TOPIC_SUFFIX: &str = " - Topic";

/// Splits a video title into song name and artists.
///
/// `"A & B - Song"` yields `("Song", ["A", "B"])`. Without an artist part
/// the cleaned title is the name and the channel (minus YouTube's auto
/// generated ` - Topic` suffix) is the artist.
pub fn parse_title(title: &str, channel_title: &str) -> (String, Vec<String>) {
    let title = unescape_html(title);

    if let Some((artists, song)) = title.split_once(" - ") {
        let mut names: Vec<String> = Vec::new();
        for artist in ARTIST_SEPARATORS.split(artists.trim()) {
            let artist = artist.trim();
            if !artist.is_empty() && !names.iter().any(|n| n == artist) {
                names.push(artist.to_string());
            }
        }

        let song = song.trim();
        if !names.is_empty() && !song.is_empty() {
            return (song.to_string(), names);
        }
    }

    let channel = channel_title
        .strip_suffix(TOPIC_SUFFIX)
        .unwrap_or(channel_title)
        .trim();
    let artists = if channel.is_empty() {
        Vec::new()
    } else {
        vec![channel.to_string()]
    };

    (clean(&title), artists)
}

/// Search snippets carry HTML-escaped titles.
fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
