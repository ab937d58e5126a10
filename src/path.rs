//! Request path validation and resolution against the base address.

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Longest request path accepted, query included.
pub const MAX_PATH_LEN: usize = 2048;

/// Checks a caller-supplied request path.
///
/// Accepts absolute paths such as `/api/inventory` or
/// `/api/inventory?category=tools`. Rejects anything that could escape the
/// base address or smuggle in another authority.
pub fn validate_path(path: &str) -> ClientResult<()> {
    let invalid = |reason: &str| Err(ClientError::InvalidInput(reason.to_string()));

    if path.is_empty() {
        return invalid("path is empty");
    }
    if path.len() > MAX_PATH_LEN {
        return invalid("path is too long");
    }
    if !path.starts_with('/') {
        return invalid("path must start with '/'");
    }
    if path.starts_with("//") || path.contains("://") {
        return invalid("path must not carry a scheme or authority");
    }
    if let Some(c) = path
        .chars()
        .find(|c| c.is_control() || c.is_whitespace() || *c == '\\' || *c == '#')
    {
        return Err(ClientError::InvalidInput(format!(
            "path contains forbidden character {:?}",
            c
        )));
    }

    let (route, _) = split_query(path);
    for segment in route.split('/') {
        let decoded = segment.replace("%2e", ".").replace("%2E", ".");
        if decoded == "." || decoded == ".." {
            return invalid("path must not contain dot segments");
        }
    }

    Ok(())
}

/// Appends a validated `path` to `base`, keeping any prefix already on the
/// base address.
pub(crate) fn resolve(base: &Url, path: &str) -> ClientResult<Url> {
    validate_path(path)?;

    let (route, query) = split_query(path);
    let mut url = base.clone();
    let joined = format!("{}{}", base.path().trim_end_matches('/'), route);
    url.set_path(&joined);
    url.set_query(query);
    Ok(url)
}

fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((route, query)) => (route, Some(query)),
        None => (path, None),
    }
}
