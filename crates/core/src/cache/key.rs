//! Lookup key derivation for stored result records.

/// Normalize a URL into its result-record key.
///
/// The raw string is split on `.`, the parts are sorted and rejoined with `,`,
/// so different orderings of the same dot-separated parts share a key. This is
/// a token sort, not a hierarchical SURT transform: `example.com/a.html` and
/// `html.example.com/a` collide, and scheme or path differences are kept
/// verbatim inside whichever part they fall in.
pub fn url_key(url: &str) -> String {
    let mut parts: Vec<&str> = url.split('.').collect();
    parts.sort_unstable();
    parts.join(",")
}
