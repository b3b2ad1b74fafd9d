use std::collections::BTreeMap;
use url::Url;

/// Scheme portion of a driver URL, without touching the remainder.
///
/// Sources such as `file://./migrations` carry relative paths that the
/// WHATWG parser would mangle, so the split is done on the raw string.
pub fn scheme_of(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

/// Everything after `scheme://`, with query and fragment cut off.
pub fn opaque_of(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    Some(rest)
}

/// Splits off custom `x-` query keys before the URL reaches the underlying
/// connector. Returns the cleaned URL and the stripped key/value pairs.
pub fn strip_custom_query(raw: &str) -> Result<(String, BTreeMap<String, String>), url::ParseError> {
    let mut parsed = Url::parse(raw)?;

    let mut custom = BTreeMap::new();
    let mut kept: Vec<(String, String)> = Vec::new();
    for (key, value) in parsed.query_pairs() {
        if key.starts_with("x-") {
            custom.insert(key.into_owned(), value.into_owned());
        } else {
            kept.push((key.into_owned(), value.into_owned()));
        }
    }

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    Ok((parsed.into(), custom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_split_from_the_raw_string() {
        assert_eq!(scheme_of("file://./migrations"), Some("file"));
        assert_eq!(scheme_of("postgres://localhost:5432/app"), Some("postgres"));
        assert_eq!(scheme_of("not a url"), None);
    }

    #[test]
    fn opaque_drops_query_and_fragment() {
        assert_eq!(opaque_of("file:///var/migrations?foo=1"), Some("/var/migrations"));
        assert_eq!(opaque_of("file://./migrations#frag"), Some("./migrations"));
    }

    #[test]
    fn custom_keys_are_stripped_and_collected() {
        let (clean, custom) = strip_custom_query(
            "postgres://user:pw@localhost/app?sslmode=disable&x-migrations-table=ledger",
        )
        .unwrap();

        assert_eq!(custom.get("x-migrations-table").map(String::as_str), Some("ledger"));
        assert!(clean.contains("sslmode=disable"));
        assert!(!clean.contains("x-migrations-table"));
    }

    #[test]
    fn query_disappears_when_only_custom_keys_were_present() {
        let (clean, custom) =
            strip_custom_query("postgres://localhost/app?x-migrations-table=ledger").unwrap();
        assert_eq!(custom.len(), 1);
        assert!(!clean.contains('?'));
    }
}
