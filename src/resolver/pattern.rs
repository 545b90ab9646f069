//! Repository layout patterns such as
//! `[organisation]/[module]/[revision]/[artifact](-[classifier]).[ext]`.
//!
//! `[token]` is replaced by the attribute of the same name; a token without a
//! value stays as written. A `( ... )` section disappears when one of its
//! tokens has no value or an empty one.

use std::collections::BTreeMap;

use log::trace;
use regex_lite::Regex;

use crate::repository::{Repository, TransportError};

pub const ORGANISATION: &str = "organisation";
const ORGANIZATION: &str = "organization";
const ORG_PATH: &str = "orgPath";
pub const MODULE: &str = "module";
pub const REVISION: &str = "revision";

fn lookup(attributes: &BTreeMap<&str, &str>, token: &str) -> Option<String> {
    match token {
        ORGANIZATION => attributes.get(ORGANISATION).map(|v| v.to_string()),
        ORG_PATH => attributes
            .get(ORGANISATION)
            .map(|v| v.replace('.', "/")),
        _ => attributes.get(token).map(|v| v.to_string()),
    }
}

/// Replaces the tokens of `pattern` with their attribute values.
pub fn substitute(pattern: &str, attributes: &BTreeMap<&str, &str>) -> String {
    let mut result = String::with_capacity(pattern.len());
    let mut optional: Option<(String, bool)> = None;
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '(' if optional.is_none() => optional = Some((String::new(), true)),
            ')' if optional.is_some() => {
                if let Some((section, complete)) = optional.take() {
                    if complete {
                        result.push_str(&section);
                    }
                }
            }
            '[' => {
                let token: String = chars.by_ref().take_while(|c| *c != ']').collect();
                let value = lookup(attributes, &token);
                match &mut optional {
                    Some((section, complete)) => match value {
                        Some(value) if !value.is_empty() => section.push_str(&value),
                        _ => *complete = false,
                    },
                    None => match value {
                        Some(value) => result.push_str(&value),
                        None => {
                            result.push('[');
                            result.push_str(&token);
                            result.push(']');
                        }
                    },
                }
            }
            c => match &mut optional {
                Some((section, _)) => section.push(c),
                None => result.push(c),
            },
        }
    }
    if let Some((section, _)) = optional {
        result.push('(');
        result.push_str(&section);
    }
    result
}

/// The directory holding everything of one revision: the pattern cut after
/// the segment holding `[revision]`, substituted. `None` when the revision is
/// not a whole directory of the layout.
pub fn revision_directory(pattern: &str, attributes: &BTreeMap<&str, &str>) -> Option<String> {
    let token = format!("[{REVISION}]");
    let segments: Vec<&str> = pattern.split('/').collect();
    let position = segments.iter().position(|s| *s == token)?;
    if position + 1 == segments.len() {
        return None;
    }
    Some(substitute(&segments[..=position].join("/"), attributes))
}

/// Values `token` takes in the repository for the given attributes, found by
/// listing the directory where it appears.
pub fn list_token_values(
    repository: &dyn Repository,
    pattern: &str,
    token: &str,
    attributes: &BTreeMap<&str, &str>,
) -> Result<Vec<String>, TransportError> {
    let placeholder = format!("[{token}]");
    let mut attributes: BTreeMap<&str, &str> = attributes.clone();
    attributes.insert(token, &placeholder);
    let normalized = pattern.replace(&format!("[{ORGANIZATION}]"), &format!("[{ORGANISATION}]"));
    let partial = substitute(&normalized, &attributes);

    let segments: Vec<&str> = partial.split('/').collect();
    let Some(position) = segments.iter().position(|s| s.contains(&placeholder)) else {
        return Ok(vec![]);
    };
    let parent = segments[..position].join("/");
    if parent.contains('[') {
        trace!("Cannot list {token} in {pattern}: unresolved tokens in {parent}");
        return Ok(vec![]);
    }
    let Some(matcher) = segment_regex(segments[position], &placeholder) else {
        return Ok(vec![]);
    };
    let rest = &segments[position + 1..];

    let mut values = vec![];
    for name in repository.list(&parent)? {
        let Some(value) = matcher
            .captures(&name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };
        if !rest.is_empty() {
            let remaining = rest.join("/").replace(&placeholder, &value);
            if !remaining.contains('[') {
                let location = if parent.is_empty() {
                    format!("{name}/{remaining}")
                } else {
                    format!("{parent}/{name}/{remaining}")
                };
                if repository.resource(&location)?.is_none() {
                    continue;
                }
            }
        }
        if !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}

fn segment_regex(segment: &str, placeholder: &str) -> Option<Regex> {
    let parts: Vec<String> = segment
        .split(placeholder)
        .map(|part| {
            let mut escaped = String::new();
            for (i, literal) in part.split('[').enumerate() {
                if i == 0 {
                    escaped.push_str(&regex_lite::escape(literal));
                } else {
                    let literal = literal.split_once(']').map_or(literal, |(_, rest)| rest);
                    escaped.push_str(".+");
                    escaped.push_str(&regex_lite::escape(literal));
                }
            }
            escaped
        })
        .collect();
    Regex::new(&format!("^{}$", parts.join("(.+)"))).ok()
}
