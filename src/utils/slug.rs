use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^A-Za-z0-9_]+").unwrap();
    static ref DASHES: Regex = Regex::new(r"-{2,}").unwrap();
}

/// Convert a game name into the directory slug used by stream listings.
pub fn game_to_slug(name: &str) -> String {
    let lowered = name.to_lowercase().replace('\'', "");
    let dashed = NON_WORD.replace_all(&lowered, "-");
    let collapsed = DASHES.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}
