//! Per-request context: path parameters and typed request extensions.
//!
//! Middleware attaches per-request state (for example the authenticated
//! [`Principal`](crate::security::Principal)) through [`Extensions`]; the router
//! fills in [`PathParams`] once a route matches.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use serde::de::DeserializeOwned;

use crate::Request;

/// Type-erased request extensions map, used to inject per-request state
/// into handlers without requiring handlers to know about each other's types.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create a new empty extensions map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a value from the extensions map
    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Remove a value from the extensions map
    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters extracted from the matched route
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// Per-request context handed through the middleware pipeline to a handler.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    /// Create a new context from a request
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
            extensions: Extensions::new(),
        }
    }

    /// Create a context with already-extracted path parameters
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserialize the request body as JSON
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        self.request.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker(u32);

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ext = Extensions::new();
        ext.insert(Marker(1));
        ext.insert(String::from("hello"));
        ext.insert(Marker(2));

        assert_eq!(ext.get::<Marker>(), Some(&Marker(2)));
        assert_eq!(ext.get::<String>().map(String::as_str), Some("hello"));
        assert_eq!(ext.remove::<Marker>(), Some(Marker(2)));
        assert!(ext.get::<Marker>().is_none());
    }
}
