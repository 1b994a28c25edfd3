//! Input validation for seed data: project names, hashtags and Instagram
//! handles.
//!
//! Every function returns the normalized form so that two spellings of the
//! same thing (`@Ace.Padel`, `https://instagram.com/ace.padel/`) reconcile to
//! the same natural key.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{DomainError, DomainResult};

pub const PROJECT_NAME_MAX_CHARS: usize = 100;
pub const HASHTAG_MAX_CHARS: usize = 100;
pub const USERNAME_MAX_CHARS: usize = 30;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9._]{1,30}$").expect("static regex"));

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}_]+$").expect("static regex"));

/// First path segments on instagram.com that are not profiles.
const RESERVED_PATHS: &[&str] = &["p", "reel", "reels", "explore", "stories", "accounts", "tv"];

const INSTAGRAM_HOSTS: &[&str] = &["instagram.com", "www.instagram.com", "m.instagram.com"];

/// Validate a project name and return it trimmed.
pub fn validate_project_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("project name must not be empty"));
    }
    if name.chars().count() > PROJECT_NAME_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "project name exceeds {PROJECT_NAME_MAX_CHARS} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(DomainError::validation(
            "project name must not contain control characters",
        ));
    }
    Ok(name.to_string())
}

/// Normalize a hashtag: one optional leading `#` is dropped and the rest is
/// lowercased.
pub fn normalize_hashtag(tag: &str) -> DomainResult<String> {
    let tag = tag.trim();
    let tag = tag.strip_prefix('#').unwrap_or(tag).to_lowercase();

    if tag.is_empty() {
        return Err(DomainError::validation("hashtag must not be empty"));
    }
    if tag.chars().count() > HASHTAG_MAX_CHARS {
        return Err(DomainError::validation(format!(
            "hashtag exceeds {HASHTAG_MAX_CHARS} characters"
        )));
    }
    if !HASHTAG_RE.is_match(&tag) {
        return Err(DomainError::validation(format!(
            "hashtag '{tag}' may only contain letters, digits and underscores"
        )));
    }
    Ok(tag)
}

/// Extract an Instagram username from a bare handle, an `@handle`, or a
/// profile URL (with or without scheme).
pub fn parse_instagram_username(input: &str) -> DomainResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DomainError::validation("instagram username must not be empty"));
    }

    let raw = if looks_like_url(input) {
        username_from_url(input)?
    } else {
        input.strip_prefix('@').unwrap_or(input).to_string()
    };

    check_username(&raw.to_lowercase())
}

/// Canonical profile URL for an already-normalized username.
pub fn instagram_profile_url(username: &str) -> String {
    format!("https://www.instagram.com/{username}/")
}

fn looks_like_url(input: &str) -> bool {
    input.contains('/') || input.to_ascii_lowercase().contains("instagram.")
}

fn username_from_url(input: &str) -> DomainResult<String> {
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| DomainError::validation(format!("invalid instagram url '{input}': {e}")))?;

    let host = url.host_str().unwrap_or_default();
    if !INSTAGRAM_HOSTS.contains(&host) {
        return Err(DomainError::validation(format!(
            "'{input}' is not an instagram profile url"
        )));
    }

    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or_else(|| DomainError::validation(format!("'{input}' has no profile path")))?;

    if RESERVED_PATHS.contains(&segment.to_ascii_lowercase().as_str()) {
        return Err(DomainError::validation(format!(
            "'{input}' points at /{segment}/, not a profile"
        )));
    }

    Ok(segment.to_string())
}

fn check_username(username: &str) -> DomainResult<String> {
    if !USERNAME_RE.is_match(username) {
        return Err(DomainError::validation(format!(
            "instagram username '{username}' must be 1-{USERNAME_MAX_CHARS} of [a-z0-9._]"
        )));
    }
    if username.starts_with('.') || username.ends_with('.') || username.contains("..") {
        return Err(DomainError::validation(format!(
            "instagram username '{username}' has a misplaced '.'"
        )));
    }
    Ok(username.to_string())
}
