//! Request descriptors: what a transport needs to issue one request.
//!
//! A [`RequestDescriptor`] is plain data. Callers usually produce one per input
//! through a factory and let the orchestrator lay a set of *overrides* on top
//! (typically just the HTTP method). Merging is shallow: any field set in the
//! overrides replaces the base field wholesale.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// HTTP method carried by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

/// Everything needed to issue one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Resolved against `url` when `url` is relative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Query parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Free-form keys, merged key by key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor with only the method set; the shape per-method wrappers use as overrides.
    pub fn with_method_only(method: Method) -> Self {
        Self::new().method(method)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Lay `overrides` on top of `self`. Set fields in `overrides` win.
    pub fn merge(mut self, overrides: &RequestDescriptor) -> Self {
        if overrides.method.is_some() {
            self.method = overrides.method;
        }
        if overrides.url.is_some() {
            self.url = overrides.url.clone();
        }
        if overrides.base_url.is_some() {
            self.base_url = overrides.base_url.clone();
        }
        if overrides.params.is_some() {
            self.params = overrides.params.clone();
        }
        if overrides.headers.is_some() {
            self.headers = overrides.headers.clone();
        }
        if overrides.data.is_some() {
            self.data = overrides.data.clone();
        }
        if overrides.timeout_ms.is_some() {
            self.timeout_ms = overrides.timeout_ms;
        }
        for (k, v) in &overrides.extra {
            self.extra.insert(k.clone(), v.clone());
        }
        self
    }

    /// The method actually used on the wire.
    pub fn effective_method(&self) -> Method {
        self.method.unwrap_or(Method::Get)
    }
}

/// Normalize a bare URL into a descriptor.
fn descriptor_from_url(url: String) -> Result<RequestDescriptor> {
    if url.trim().is_empty() {
        return Err(Error::validation_with_context(
            "request url is empty",
            ErrorContext::new()
                .with_field_path("url")
                .with_source("request_factory"),
        ));
    }
    Ok(RequestDescriptor::new().url(url))
}

/// Anything a request factory may return.
pub trait IntoRequest {
    fn into_request(self) -> Result<RequestDescriptor>;
}

impl IntoRequest for RequestDescriptor {
    fn into_request(self) -> Result<RequestDescriptor> {
        Ok(self)
    }
}

impl IntoRequest for String {
    fn into_request(self) -> Result<RequestDescriptor> {
        descriptor_from_url(self)
    }
}

impl IntoRequest for &'static str {
    fn into_request(self) -> Result<RequestDescriptor> {
        descriptor_from_url(self.to_string())
    }
}

impl IntoRequest for url::Url {
    fn into_request(self) -> Result<RequestDescriptor> {
        Ok(RequestDescriptor::new().url(String::from(self)))
    }
}

impl<T: IntoRequest> IntoRequest for Result<T> {
    fn into_request(self) -> Result<RequestDescriptor> {
        self?.into_request()
    }
}

/// Boxed per-input descriptor factory.
pub type RequestFactory<I> = Arc<dyn Fn(&I) -> Result<RequestDescriptor> + Send + Sync>;

/// Wrap a closure returning anything [`IntoRequest`] into a [`RequestFactory`].
pub fn factory<I, F, R>(f: F) -> RequestFactory<I>
where
    F: Fn(&I) -> R + Send + Sync + 'static,
    R: IntoRequest,
{
    Arc::new(move |input: &I| f(input).into_request())
}

/// Either one fixed descriptor for every call, or a factory deriving one per input.
pub enum RequestTemplate<I> {
    Fixed(RequestDescriptor),
    Factory(RequestFactory<I>),
}

impl<I> RequestTemplate<I> {
    pub fn fixed(request: impl IntoRequest) -> Result<Self> {
        Ok(RequestTemplate::Fixed(request.into_request()?))
    }

    pub fn from_fn<F, R>(f: F) -> Self
    where
        I: 'static,
        F: Fn(&I) -> R + Send + Sync + 'static,
        R: IntoRequest,
    {
        RequestTemplate::Factory(factory(f))
    }

    /// Build the descriptor for `input` and apply `overrides`.
    pub fn resolve(&self, input: &I, overrides: &RequestDescriptor) -> Result<RequestDescriptor> {
        let base = match self {
            RequestTemplate::Fixed(d) => d.clone(),
            RequestTemplate::Factory(f) => f(input)?,
        };
        Ok(base.merge(overrides))
    }
}

impl<I> Clone for RequestTemplate<I> {
    fn clone(&self) -> Self {
        match self {
            RequestTemplate::Fixed(d) => RequestTemplate::Fixed(d.clone()),
            RequestTemplate::Factory(f) => RequestTemplate::Factory(Arc::clone(f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overrides_win_on_collision() {
        let base = RequestDescriptor::new()
            .method(Method::Get)
            .url("/items/1")
            .extra("arg", "foo");
        let merged = base.merge(&RequestDescriptor::with_method_only(Method::Patch));

        assert_eq!(merged.method, Some(Method::Patch));
        assert_eq!(merged.url.as_deref(), Some("/items/1"));
        assert_eq!(merged.extra.get("arg"), Some(&json!("foo")));
    }

    #[test]
    fn test_merge_is_shallow_for_maps() {
        let base = RequestDescriptor::new().param("a", "1").param("b", "2");
        let overrides = RequestDescriptor::new().param("c", "3");
        let merged = base.merge(&overrides);

        let params = merged.params.unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("c").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_extra_merges_key_by_key() {
        let base = RequestDescriptor::new().extra("a", 1).extra("b", 2);
        let overrides = RequestDescriptor::new().extra("b", 20).extra("c", 30);
        let merged = base.merge(&overrides);

        assert_eq!(merged.extra.get("a"), Some(&json!(1)));
        assert_eq!(merged.extra.get("b"), Some(&json!(20)));
        assert_eq!(merged.extra.get("c"), Some(&json!(30)));
    }

    #[test]
    fn test_string_normalizes_to_url() {
        let d = "https://example.com/users".into_request().unwrap();
        assert_eq!(d.url.as_deref(), Some("https://example.com/users"));
        assert_eq!(d.method, None);
        assert_eq!(d.effective_method(), Method::Get);
    }

    #[test]
    fn test_empty_url_is_a_construction_error() {
        let err = String::from("  ").into_request().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_factory_accepts_fallible_closures() {
        let f: RequestFactory<u32> = factory(|n: &u32| -> Result<String> {
            if *n == 0 {
                Err(Error::validation("zero id"))
            } else {
                Ok(format!("/items/{}", n))
            }
        });
        assert_eq!(f(&7).unwrap().url.as_deref(), Some("/items/7"));
        assert!(f(&0).is_err());
    }

    #[test]
    fn test_template_resolve() {
        let fixed: RequestTemplate<()> = RequestTemplate::fixed("/health").unwrap();
        let d = fixed
            .resolve(&(), &RequestDescriptor::with_method_only(Method::Head))
            .unwrap();
        assert_eq!(d.method, Some(Method::Head));
        assert_eq!(d.url.as_deref(), Some("/health"));

        let per_input = RequestTemplate::from_fn(|id: &String| format!("/users/{}", id));
        let d = per_input
            .resolve(&"42".to_string(), &RequestDescriptor::new())
            .unwrap();
        assert_eq!(d.url.as_deref(), Some("/users/42"));
    }

    #[test]
    fn test_serde_shape() {
        let d = RequestDescriptor::new()
            .method(Method::Post)
            .url("/x")
            .extra("arg", "foo");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v, json!({"method": "POST", "url": "/x", "arg": "foo"}));

        let back: RequestDescriptor = serde_json::from_value(v).unwrap();
        assert_eq!(back, d);
    }
}
