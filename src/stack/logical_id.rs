//! Logical id allocation.
//!
//! A logical id is derived from the construct path: a readable prefix made of
//! the path components, followed by eight hex digits of the path's MD5. The
//! hash keeps ids unique when two paths flatten to the same prefix, and the
//! scheme matches what the CDK toolkit produces so that templates can be
//! diffed against existing deployments.

use crate::error::{Error, Result};

/// Path component that is dropped entirely.
const HIDDEN_ID: &str = "Default";
/// Path component that is hashed but not shown in the readable prefix.
const HIDDEN_FROM_HUMAN_ID: &str = "Resource";
/// Path separator used for hashing.
const PATH_SEP: &str = "/";
const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;

/// Build the logical id for a construct path.
pub fn make_unique_id<S: AsRef<str>>(components: &[S]) -> Result<String> {
    let components: Vec<&str> = components
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| *c != HIDDEN_ID)
        .collect();

    if components.is_empty() {
        return Err(Error::Internal(
            "Unable to allocate a logical id for an empty path".to_string(),
        ));
    }

    if components.len() == 1 {
        let candidate = remove_non_alphanumeric(components[0]);
        if candidate.is_empty() {
            return Err(Error::invalid_props(
                components[0],
                "construct id has no alphanumeric characters",
            ));
        }
        if candidate.len() <= MAX_HUMAN_LEN {
            return Ok(candidate);
        }
    }

    let hash = path_hash(&components);
    let human: String = remove_dupes(&components)
        .into_iter()
        .filter(|c| *c != HIDDEN_FROM_HUMAN_ID)
        .map(remove_non_alphanumeric)
        .collect::<String>()
        .chars()
        .take(MAX_HUMAN_LEN)
        .collect();

    Ok(format!("{}{}", human, hash))
}

fn path_hash(components: &[&str]) -> String {
    let digest = md5::compute(components.join(PATH_SEP));
    let hex = format!("{:x}", digest);
    hex[..HASH_LEN].to_uppercase()
}

/// Drop components whose text is already the tail of the previous one.
fn remove_dupes<'a>(components: &[&'a str]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for component in components {
        match out.last() {
            Some(prev) if prev.ends_with(component) => {}
            _ => out.push(component),
        }
    }
    out
}

fn remove_non_alphanumeric(s: &str) -> String {
    s.chars().filter(char::is_ascii_alphanumeric).collect()
}
