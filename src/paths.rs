//! Locator helpers: page location parsing and base-path joining.

use crate::error::RuntimeError;

/// Page location the runtime resolves relative resources against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Scheme including the colon, e.g. `https:`
    pub protocol: String,
    pub host: String,
    pub path: String,
}

impl Location {
    pub fn parse(url: &str) -> Result<Self, RuntimeError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| RuntimeError::ConfigError(format!("Invalid location (missing scheme): {}", url)))?;
        if scheme.is_empty() {
            return Err(RuntimeError::ConfigError(format!("Invalid location (empty scheme): {}", url)));
        }

        let (host, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if host.is_empty() {
            return Err(RuntimeError::ConfigError(format!("Invalid location (empty host): {}", url)));
        }

        // Query and fragment never take part in path resolution
        let path = path.split(['?', '#']).next().unwrap_or("/");

        Ok(Self {
            protocol: format!("{}:", scheme),
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    /// `scheme://host`
    pub fn domain(&self) -> String {
        format!("{}//{}", self.protocol, self.host)
    }

    /// Directory part of the page path, with trailing slash
    pub fn directory(&self) -> String {
        match self.path.rfind('/') {
            Some(idx) => self.path[..=idx].to_string(),
            None => "/".to_string(),
        }
    }

    /// Prefix `domain` with this location's protocol unless it already has one.
    pub fn add_protocol(&self, domain: &str) -> String {
        if domain.starts_with("http") {
            domain.to_string()
        } else if domain.starts_with("//") {
            format!("{}{}", self.protocol, domain)
        } else {
            format!("{}//{}", self.protocol, domain)
        }
    }

    /// Absolute locator for a configured resource path (master files, shims, packages).
    pub fn resource_path(&self, domain: &str, src: &str) -> String {
        if src.starts_with("http") {
            src.to_string()
        } else if src.starts_with("//") {
            self.add_protocol(src)
        } else if src.starts_with('/') {
            format!("{}{}", domain, src)
        } else {
            format!("{}/{}", domain, src)
        }
    }

    /// Base path for module locators of a context
    pub fn base_path(&self, domain: &str, base_url: &str) -> String {
        if base_url.starts_with("http") || base_url.starts_with("//") {
            return rtrim_slash(&self.add_protocol(base_url)).to_string();
        }
        let url = trim_slash(base_url);
        if url.is_empty() {
            rtrim_slash(domain).to_string()
        } else {
            format!("{}/{}", rtrim_slash(domain), url)
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self {
            protocol: "http:".to_string(),
            host: "localhost".to_string(),
            path: "/".to_string(),
        }
    }
}

/// `base/path` with exactly one separator between them
pub fn join(base: &str, path: &str) -> String {
    format!("{}/{}", rtrim_slash(base), trim_slash(path))
}

pub fn ltrim_slash(val: &str) -> &str {
    val.strip_prefix('/').unwrap_or(val)
}

pub fn rtrim_slash(val: &str) -> &str {
    val.strip_suffix('/').unwrap_or(val)
}

pub fn trim_slash(val: &str) -> &str {
    rtrim_slash(ltrim_slash(val))
}
