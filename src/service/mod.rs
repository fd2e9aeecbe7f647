//! Concrete service clients and the endpoint descriptor tables they share.

use async_trait::async_trait;
use serde_json::Value;

use crate::http::{ApiError, Params};

pub mod bmrs;
pub mod carbon;
pub mod octopus;
pub mod types;

pub use bmrs::BmrsService;
pub use carbon::CarbonIntensityService;
pub use octopus::OctopusService;

/// Declarative description of one remote endpoint.
///
/// `{name}` placeholders in `path` are filled from parameters of the same
/// name; every placeholder must also be listed in `required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub id: &'static str,
    pub path: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// The upstream takes a `format` query parameter (sent as `json` unless
    /// the caller picked another one).
    pub accepts_format: bool,
}

impl Endpoint {
    /// Placeholder names in the path template, in order.
    pub fn path_params(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.path;
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    fn is_known(&self, key: &str) -> bool {
        self.required.contains(&key)
            || self.optional.contains(&key)
            || (self.accepts_format && key == "format")
    }

    /// Checks `params` against the descriptor and splits them into the
    /// concrete relative path and the query parameters.
    pub fn resolve(&self, params: &Params) -> Result<(String, Params), ApiError> {
        if let Some(unknown) = params.keys().find(|k| !self.is_known(k)) {
            return Err(ApiError::api(
                format!("Unknown parameter '{}' for endpoint '{}'", unknown, self.id),
                None,
            ));
        }

        let missing: Vec<&str> = self
            .required
            .iter()
            .copied()
            .filter(|name| !params.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::api(
                format!(
                    "Missing required parameter(s) for endpoint '{}': {}",
                    self.id,
                    missing.join(", ")
                ),
                None,
            ));
        }

        let path_params = self.path_params();
        let mut path = self.path.to_string();
        for name in &path_params {
            let value = params.get(name).map(|v| v.as_str()).unwrap_or_default();
            if value.is_empty() || value.contains(['/', '?', '#']) {
                return Err(ApiError::api(
                    format!(
                        "Invalid value {:?} for path parameter '{}' of endpoint '{}'",
                        value, name, self.id
                    ),
                    None,
                ));
            }
            path = path.replace(&format!("{{{}}}", name), value);
        }

        let mut query = params.clone();
        for name in &path_params {
            query.remove(name);
        }
        if self.accepts_format && !query.contains("format") {
            query.insert("format", Some("json".into()));
        }

        Ok((path, query))
    }
}

/// Looks up `id` in a descriptor table.
pub fn find_endpoint<'a>(table: &'a [Endpoint], id: &str) -> Result<&'a Endpoint, ApiError> {
    table
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| ApiError::api(format!("Unknown endpoint '{}'", id), None))
}

/// A remote API reachable through a descriptor table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Service: Send + Sync {
    /// Short name used on the command line and in logs.
    fn name(&self) -> &'static str;

    /// The descriptor table [`fetch`](Self::fetch) resolves ids against.
    fn endpoints(&self) -> &'static [Endpoint];

    /// Calls the endpoint `endpoint_id` and returns the decoded JSON body.
    async fn fetch(&self, endpoint_id: &str, params: Params) -> Result<Value, ApiError>;
}
