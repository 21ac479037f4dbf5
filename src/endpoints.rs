//! Endpoint Table and Call Surface
//!
//! The Visualplatform API surface is data, not code: a flat list of endpoint
//! paths plus two overlays marking which endpoints are cacheable and which
//! accept file uploads (and through which field). The tables deserialize from
//! JSON and compile once into a [`CallSurface`] where every endpoint is
//! reachable by its literal path and by a dotted alias, both resolving to the
//! same descriptor.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::error::{Result, VisualplatformError};

/// Standard tables shipped with the crate, mirroring the upstream API.
const BUNDLED_ENDPOINTS: &str = include_str!("../data/endpoints.json");
const BUNDLED_CACHED: &str = include_str!("../data/cached.json");
const BUNDLED_UPLOADS: &str = include_str!("../data/uploads.json");

/// Upload overlay entry: an endpoint path plus the field carrying file data.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDescriptor {
    /// Endpoint path, e.g. `/api/photo/upload`.
    pub name: String,
    /// Name of the request field holding the file source.
    pub property: String,
}

/// The three endpoint tables a client is constructed from.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    paths: Vec<String>,
    cached: HashSet<String>,
    uploads: HashMap<String, String>,
}

impl EndpointTable {
    /// Build a table from its three components.
    #[must_use]
    pub fn new(paths: Vec<String>, cached: Vec<String>, uploads: Vec<UploadDescriptor>) -> Self {
        Self {
            paths,
            cached: cached.into_iter().collect(),
            uploads: uploads.into_iter().map(|u| (u.name, u.property)).collect(),
        }
    }

    /// Deserialize a table from three JSON documents: the endpoint path
    /// list, the cacheable path list and the upload descriptor list.
    pub fn from_json(endpoints: &str, cached: &str, uploads: &str) -> Result<Self> {
        let paths: Vec<String> = serde_json::from_str(endpoints)
            .map_err(|e| VisualplatformError::InvalidConfig(format!("endpoint list: {e}")))?;
        let cached: Vec<String> = serde_json::from_str(cached)
            .map_err(|e| VisualplatformError::InvalidConfig(format!("cached list: {e}")))?;
        let uploads: Vec<UploadDescriptor> = serde_json::from_str(uploads)
            .map_err(|e| VisualplatformError::InvalidConfig(format!("upload list: {e}")))?;
        Ok(Self::new(paths, cached, uploads))
    }

    /// The standard Visualplatform tables bundled with the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_ENDPOINTS, BUNDLED_CACHED, BUNDLED_UPLOADS)
    }

    /// All endpoint paths, in registration order.
    #[must_use]
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Whether `path` may be served as an unauthenticated cacheable GET.
    #[must_use]
    pub fn is_cacheable(&self, path: &str) -> bool {
        self.cached.contains(path)
    }

    /// The file-bearing field name for `path`, when the endpoint is
    /// upload-capable.
    #[must_use]
    pub fn upload_field(&self, path: &str) -> Option<&str> {
        self.uploads.get(path).map(String::as_str)
    }
}

/// One callable endpoint, with its routing metadata resolved.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    path: String,
    alias: String,
    cacheable: bool,
    upload_field: Option<String>,
}

impl EndpointDescriptor {
    /// Literal endpoint path, e.g. `/api/photo/get-upload-token`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Dotted alias, e.g. `photo.getUploadToken`.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Whether the endpoint is eligible for unauthenticated cacheable GETs.
    #[must_use]
    pub fn cacheable(&self) -> bool {
        self.cacheable
    }

    /// The file-bearing field name, when the endpoint accepts uploads.
    #[must_use]
    pub fn upload_field(&self) -> Option<&str> {
        self.upload_field.as_deref()
    }
}

/// Compiled call surface: every endpoint keyed by both its literal path and
/// its dotted alias, plus the set of namespace prefixes between them.
#[derive(Debug)]
pub struct CallSurface {
    endpoints: Vec<EndpointDescriptor>,
    index: HashMap<String, usize>,
    prefixes: HashSet<String>,
}

impl CallSurface {
    /// Compile the table into the callable surface.
    ///
    /// Duplicate paths or colliding aliases are not defended against: the
    /// last registered endpoint wins for that key.
    pub fn build(table: &EndpointTable) -> Result<Self> {
        let mut endpoints = Vec::with_capacity(table.paths().len());
        let mut index = HashMap::new();
        let mut prefixes = HashSet::new();

        for path in table.paths() {
            let segments = alias_segments(path)?;
            for i in 1..segments.len() {
                prefixes.insert(segments[..i].join("."));
            }
            let alias = segments.join(".");

            let slot = endpoints.len();
            endpoints.push(EndpointDescriptor {
                path: path.clone(),
                alias: alias.clone(),
                cacheable: table.is_cacheable(path),
                upload_field: table.upload_field(path).map(str::to_string),
            });
            index.insert(path.clone(), slot);
            index.insert(alias, slot);
        }

        Ok(Self { endpoints, index, prefixes })
    }

    /// Resolve a literal path or dotted alias to its descriptor.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&EndpointDescriptor> {
        self.index.get(key).map(|&slot| &self.endpoints[slot])
    }

    /// Whether `prefix` names a namespace grouping (a non-terminal alias
    /// prefix such as `photo` or `photo.section`).
    #[must_use]
    pub fn has_namespace(&self, prefix: &str) -> bool {
        self.prefixes.contains(prefix)
    }

    /// All registered descriptors, in table order.
    #[must_use]
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }
}

/// Split an endpoint path into alias segments. The two leading path
/// components (the empty root and the API namespace root) are dropped and
/// hyphenated segments are camelized.
fn alias_segments(path: &str) -> Result<Vec<String>> {
    let segments: Vec<String> = path
        .split('/')
        .skip(2)
        .filter(|s| !s.is_empty())
        .map(camelize)
        .collect();
    if !path.starts_with('/') || segments.is_empty() {
        return Err(VisualplatformError::InvalidConfig(format!(
            "endpoint path '{path}' is not namespaced"
        )));
    }
    Ok(segments)
}

/// `get-upload-token` becomes `getUploadToken`.
fn camelize(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper_next = false;
    for ch in segment.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    if upper_next {
        out.push('-');
    }
    out
}
