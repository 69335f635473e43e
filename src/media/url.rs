//! URL canonicalization applied before every download.
//!
//! Some media hosts hand out links whose paths contain doubled separators
//! (`https://cdn.example.com//videos//clip.mp4`). Servers disagree on how to
//! treat those, so the path is collapsed to single separators before fetch.

use url::Url;

/// Collapse every run of consecutive `/` in the path of `url`.
///
/// Scheme, authority, query and fragment are left untouched.
pub fn normalize(url: &Url) -> Url {
    let path = collapse_separators(url.path());
    if path == url.path() {
        return url.clone();
    }
    let mut normalized = url.clone();
    normalized.set_path(&path);
    normalized
}

/// String form of [`normalize`].
///
/// Input that does not parse as an absolute URL is returned unchanged.
pub fn normalize_url(input: &str) -> String {
    match Url::parse(input) {
        Ok(parsed) => normalize(&parsed).to_string(),
        Err(_) => input.to_string(),
    }
}

fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_doubled_separators() {
        assert_eq!(normalize_url("http://host//a//b"), "http://host/a/b");
    }

    #[test]
    fn test_collapses_longer_runs() {
        assert_eq!(
            normalize_url("https://cdn.example.com///media////clip.mp4"),
            "https://cdn.example.com/media/clip.mp4"
        );
    }

    #[test]
    fn test_preserves_query_and_fragment() {
        assert_eq!(
            normalize_url("http://host//a//b?next=//c//d#frag//ment"),
            "http://host/a/b?next=//c//d#frag//ment"
        );
    }

    #[test]
    fn test_preserves_port_and_credentials() {
        assert_eq!(
            normalize_url("http://user:pw@host:8080//x//y.mkv"),
            "http://user:pw@host:8080/x/y.mkv"
        );
    }

    #[test]
    fn test_clean_url_is_unchanged() {
        let url = Url::parse("https://example.com/videos/clip.mp4?t=10").unwrap();
        assert_eq!(normalize(&url), url);
    }

    #[test]
    fn test_percent_encoding_survives() {
        assert_eq!(
            normalize_url("http://host//my%20video//clip%2F1.mp4"),
            "http://host/my%20video/clip%2F1.mp4"
        );
    }

    #[test]
    fn test_unparseable_input_passes_through() {
        assert_eq!(normalize_url("not a url"), "not a url");
        assert_eq!(normalize_url(""), "");
        assert_eq!(normalize_url("//host//path"), "//host//path");
    }
}
