//! Request parameter access shared by filters and the result cache.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;
use url::form_urlencoded;

/// Parameter name to ordered values, as supplied by the request.
pub type ParamMap = HashMap<String, Vec<String>>;

/// Query parameter names the API recognizes.
///
/// Anything outside this set is dropped when a request is parsed, so unknown
/// parameters can neither affect filtering nor fragment the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlParameterName {
    Id,
    Ids,
    Page,
    Limit,
    Sort,
    ListingId,
    Read,
    FeatureId,
}

impl UrlParameterName {
    pub const ALL: [UrlParameterName; 8] = [
        UrlParameterName::Id,
        UrlParameterName::Ids,
        UrlParameterName::Page,
        UrlParameterName::Limit,
        UrlParameterName::Sort,
        UrlParameterName::ListingId,
        UrlParameterName::Read,
        UrlParameterName::FeatureId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UrlParameterName::Id => "id",
            UrlParameterName::Ids => "ids",
            UrlParameterName::Page => "page",
            UrlParameterName::Limit => "limit",
            UrlParameterName::Sort => "sort",
            UrlParameterName::ListingId => "listing_id",
            UrlParameterName::Read => "read",
            UrlParameterName::FeatureId => "feature_id",
        }
    }

    /// Case-insensitive lookup of a recognized name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|param| param.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for UrlParameterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to the parameters of a single request.
pub trait ParameterSource: Send + Sync {
    /// Identifier of the endpoint serving the request (e.g. `error_reports`).
    fn endpoint(&self) -> &str;

    /// All values supplied for `name`, in request order.
    fn all(&self, name: &str) -> &[String];

    /// Every parameter of the request.
    fn as_map(&self) -> &ParamMap;

    /// First value supplied for `name`.
    fn first(&self, name: &str) -> Option<&str> {
        self.all(name).first().map(String::as_str)
    }
}

/// Parameters parsed from an incoming request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    endpoint: String,
    params: ParamMap,
}

impl RequestParams {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: ParamMap::new(),
        }
    }

    /// Parse a raw query string, keeping recognized names only.
    ///
    /// Blank values (`?read=`) are treated as absent.
    pub fn from_query(endpoint: impl Into<String>, query: Option<&str>) -> Self {
        let mut params = Self::new(endpoint);
        let Some(query) = query else {
            return params;
        };

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let Some(recognized) = UrlParameterName::from_name(&name) else {
                debug!(
                    endpoint = %params.endpoint,
                    parameter = %name,
                    "ignoring unrecognized query parameter"
                );
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            params.add_param(recognized, value.into_owned());
        }

        params
    }

    /// Append a value for `name`.
    pub fn add_param(&mut self, name: UrlParameterName, value: impl Into<String>) {
        self.params
            .entry(name.as_str().to_string())
            .or_default()
            .push(value.into());
    }

    pub fn with_param(mut self, name: UrlParameterName, value: impl Into<String>) -> Self {
        self.add_param(name, value);
        self
    }

    /// Replace every value of `name` with `value`.
    pub fn set_param(&mut self, name: UrlParameterName, value: impl Into<String>) {
        self.params
            .insert(name.as_str().to_string(), vec![value.into()]);
    }
}

impl ParameterSource for RequestParams {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn all(&self, name: &str) -> &[String] {
        self.params.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn as_map(&self) -> &ParamMap {
        &self.params
    }
}
