//! See [`Response`].

use axum::{
    body::Body,
    http::{self, header::CONTENT_TYPE, HeaderName, HeaderValue, StatusCode},
};
use serde::Serialize;

/// A wrapper for [`axum::response::Response`] that lets headers be accumulated before the status
/// and body are known.
#[derive(Debug)]
pub(crate) struct Response {
    /// The [`axum::response::Response`] value being wrapped.
    inner: axum::response::Response,
}

impl Response {
    /// Constructs a new empty `200 OK` [`Response`].
    pub(crate) fn new() -> Self {
        Self {
            inner: axum::response::Response::new(Body::empty()),
        }
    }

    /// Sets a [`StatusCode`] on the response.
    pub(crate) fn status(&mut self, status: StatusCode) -> &mut Self {
        *self.inner.status_mut() = status;

        self
    }

    /// Sets a header on the response.
    pub(crate) fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.inner.headers_mut().insert(name, value);

        self
    }

    /// Sets a header on the response, panicking if the header is invalid.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value isn't valid. Only pass values known at compile time.
    pub(crate) fn header_valid<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = <HeaderName as TryFrom<K>>::try_from(key)
            .map_err(Into::into)
            .expect("header name should be valid");
        let value = <HeaderValue as TryFrom<V>>::try_from(value)
            .map_err(Into::into)
            .expect("header value should be valid");

        self.header(name, value)
    }

    /// Sets a [`Body`] on the response.
    pub(crate) fn body<T: Into<Body>>(mut self, body: T) -> Self {
        *self.inner.body_mut() = body.into();

        self
    }

    /// Sets a [`StatusCode`] and a serialized `application/json` body on the response.
    pub(crate) fn json<T: Serialize>(mut self, status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_vec(value).expect("response body should be serializable");

        self.status(status)
            .header_valid(CONTENT_TYPE, "application/json");

        self.body(body)
    }

    /// Sets a [`StatusCode`], and sets it along with its canonical reason text (e.g. `405 Method
    /// Not Allowed`) as a `text/plain` body on the response.
    pub(crate) fn plain_error(mut self, status: StatusCode) -> Self {
        self.status(status)
            .header_valid(CONTENT_TYPE, "text/plain; charset=utf-8");

        self.body(status.to_string())
    }
}

impl axum::response::IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        self.inner
    }
}
