//! Request signatures: the grouping key for aggregation.
//!
//! URLs are lowercased, stripped of scheme, host and query, padded with a
//! trailing slash, and have variable path segments folded:
//! `2024-01-15` → `:date`, then `2024-01` → `:month`, then digits → `:id`.
//! Only the leading run of a segment folds and the rest is kept, so
//! `/users/42.json` becomes `/users/:id.json/` while `/v2` stays as it is.
//! Controller/action targets map to `Controller#action` unchanged.

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::InvalidRequest;
use crate::model::{CompletedRequest, RequestTarget};

lazy_static! {
    static ref SCHEME_AND_HOST: Regex = Regex::new(r"^[a-z][a-z0-9+.\-]*://[^/?#]*").unwrap();
    static ref DATE_PREFIX: Regex = Regex::new(r"^\d+-\d+-\d+").unwrap();
    static ref MONTH_PREFIX: Regex = Regex::new(r"^\d+-\d+").unwrap();
    static ref ID_PREFIX: Regex = Regex::new(r"^\d+").unwrap();
}

pub fn signature(request: &CompletedRequest) -> Result<String, InvalidRequest> {
    match &request.target {
        Some(target) => Ok(target_signature(target)),
        None => Err(InvalidRequest { line: request.line }),
    }
}

pub fn target_signature(target: &RequestTarget) -> String {
    match target {
        RequestTarget::Url(url) => normalize_url(url),
        RequestTarget::ControllerAction { controller, action } => {
            format!("{}#{}", controller, action)
        }
    }
}

pub fn normalize_url(url: &str) -> String {
    let lowered = url.to_lowercase();
    let path = SCHEME_AND_HOST.replace(&lowered, "");
    let path = match path.find('?') {
        Some(idx) => &path[..idx],
        None => &path[..],
    };

    let mut normalized = String::with_capacity(path.len() + 1);
    for (idx, segment) in path.split('/').enumerate() {
        // Only segments introduced by a slash are variable.
        if idx == 0 {
            normalized.push_str(segment);
        } else {
            normalized.push('/');
            fold_segment(segment, &mut normalized);
        }
    }
    if path.len() > 1 && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

fn fold_segment(segment: &str, out: &mut String) {
    let folded = [
        (&*DATE_PREFIX, ":date"),
        (&*MONTH_PREFIX, ":month"),
        (&*ID_PREFIX, ":id"),
    ]
    .into_iter()
    .find_map(|(re, placeholder)| re.find(segment).map(|m| (placeholder, m.end())));

    match folded {
        Some((placeholder, end)) => {
            out.push_str(placeholder);
            out.push_str(&segment[end..]);
        }
        None => out.push_str(segment),
    }
}
