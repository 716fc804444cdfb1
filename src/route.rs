//! Route keys: mapping an outgoing request to its likely bucket.
//!
//! The server assigns quota buckets to route families, not to individual
//! URLs, and only reveals the bucket id after the first response. Until
//! then requests are keyed by a discriminator: the method plus the path
//! with resource ids collapsed to `:id`. Ids that follow a per-resource
//! parent segment (see [`DispatcherConfig::per_resource_parents`]) are kept
//! verbatim, because those routes are rate limited per resource.
//!
//! [`DispatcherConfig::per_resource_parents`]: crate::DispatcherConfig

use std::collections::HashSet;
use std::fmt;

/// HTTP method of an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject paths the dispatcher cannot key. Returns the reason when invalid.
pub(crate) fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path is empty".into());
    }
    if !path.starts_with('/') {
        return Err(format!("path must start with '/' (got {:?})", path));
    }
    if path.contains(char::is_whitespace) {
        return Err(format!("path contains whitespace ({:?})", path));
    }
    Ok(())
}

/// Compute the bucket discriminator for a request.
///
/// `/channels/123/messages/456` becomes `GET /channels/123/messages/:id`
/// when `channels` is a per-resource parent: the channel id scopes the
/// bucket, the message id does not.
pub fn discriminator(
    method: Method,
    path: &str,
    per_resource_parents: &HashSet<String>,
) -> String {
    let mut key = String::with_capacity(path.len() + 8);
    key.push_str(method.as_str());
    key.push(' ');

    let mut parent: Option<&str> = None;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        key.push('/');
        let keep_id = parent.is_some_and(|p| per_resource_parents.contains(p));
        if is_resource_id(segment) && !keep_id {
            key.push_str(":id");
        } else {
            key.push_str(segment);
        }
        parent = Some(segment);
    }
    if path == "/" {
        key.push('/');
    }
    key
}

fn is_resource_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
