use std::collections::HashMap;

use super::{Author, clean_text};

const BYLINE_PREFIXES: &[&str] = &["presented by: ", "presented by ", "written by ", "by: ", "by "];

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    value
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &value[prefix.len()..])
}

/// Turn a raw byline into individual names: boilerplate prefixes are removed
/// and multi-author bylines are split on the literal `" and "`.
pub fn split_byline(byline: &str) -> Vec<String> {
    let Some(mut byline) = clean_text(byline) else {
        return Vec::new();
    };
    for prefix in BYLINE_PREFIXES {
        if let Some(rest) = strip_prefix_ignore_case(&byline, prefix) {
            byline = rest.trim().to_string();
            break;
        }
    }
    byline
        .split(" and ")
        .filter_map(clean_text)
        .collect()
}

/// Drop organisational bylines and duplicate names.
///
/// A trailing `", <organisation>"` is stripped from every name first, so
/// "Jane Doe, CNN" and "Jane Doe" collapse into one entry. Later duplicates
/// contribute whatever contact fields the first entry was missing.
pub fn clean_authors(authors: Vec<Author>, organisation: Option<&str>) -> Vec<Author> {
    let organisation = organisation.map(str::trim).filter(|o| !o.is_empty());
    let mut cleaned: Vec<Author> = Vec::with_capacity(authors.len());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for mut author in authors {
        if let Some(name) = author.name.take() {
            author.name = normalize_name(&name, organisation);
        }
        if !author.is_identifiable() {
            continue;
        }

        let key = author
            .name
            .as_deref()
            .or(author.url.as_deref())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match by_name.get(&key) {
            Some(&index) => merge_into(&mut cleaned[index], author),
            None => {
                by_name.insert(key, cleaned.len());
                cleaned.push(author);
            }
        }
    }

    cleaned
}

fn normalize_name(name: &str, organisation: Option<&str>) -> Option<String> {
    let mut name = clean_text(name)?;
    if let Some(organisation) = organisation {
        let suffix = format!(", {organisation}");
        if name.len() > suffix.len()
            && name
                .get(name.len() - suffix.len()..)
                .is_some_and(|tail| tail.eq_ignore_ascii_case(&suffix))
        {
            name.truncate(name.len() - suffix.len());
            name = clean_text(&name)?;
        }
        if name.eq_ignore_ascii_case(organisation) {
            return None;
        }
    }
    if name.to_ascii_lowercase().starts_with("http") {
        return None;
    }
    Some(name)
}

fn merge_into(existing: &mut Author, other: Author) {
    if existing.url.is_none() {
        existing.url = other.url;
    }
    if existing.twitter_url.is_none() {
        existing.twitter_url = other.twitter_url;
    }
    if existing.email.is_none() {
        existing.email = other.email;
    }
    if existing.image.is_none() {
        existing.image = other.image;
    }
}
