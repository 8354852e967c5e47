//! A consistent JSON success/error envelope for handler responses.
//!
//! [`Data<T>`] wraps a handler's output value (or an error message) and
//! serializes it straight into the response buffer with `serde_json`,
//! without an intermediate `String`/`Vec<u8>` allocation for the common
//! case of no metadata.

use crate::{Handled, Response, StatusCode};
use serde::ser::SerializeMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// A success/error envelope serialized as `{"data": value, "meta": ...}` on
/// success or `{"error": message, "meta": ...}` on failure. `meta` is only
/// present once [`with_meta`](Self::with_meta) has been called.
///
/// # Examples
/// ```
/// # shockwave::run_test(|_, resp| {
/// use shockwave::Data;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { id: u32, name: String }
///
/// let user = User { id: 1, name: "ada".into() };
/// Data::ok(user).send_data(resp)
/// # });
/// ```
#[derive(Debug)]
pub struct Data<T: Serialize> {
    data: Option<T>,
    error: Option<String>,
    status: Option<StatusCode>,
    meta: Option<Map<String, Value>>,
    headers: Option<Vec<(String, String)>>,
}

impl<T: Serialize> Data<T> {
    #[inline]
    fn success(status: StatusCode, value: T) -> Self {
        Self {
            data: Some(value),
            error: None,
            status: Some(status),
            meta: None,
            headers: None,
        }
    }

    /// `200 OK` with `value` as the `data` field.
    #[inline]
    pub fn ok(value: T) -> Self {
        Self::success(StatusCode::Ok, value)
    }

    /// `201 Created` with `value` as the `data` field.
    #[inline]
    pub fn created(value: T) -> Self {
        Self::success(StatusCode::Created, value)
    }

    /// `202 Accepted` with `value` as the `data` field.
    #[inline]
    pub fn accepted(value: T) -> Self {
        Self::success(StatusCode::Accepted, value)
    }

    /// Appends a metadata entry, serialized under the top-level `meta` key.
    /// The metadata map is only allocated the first time this is called.
    #[inline]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.meta.get_or_insert_with(Map::new).insert(key.into(), value);
        self
    }

    /// Appends a raw response header, applied in [`send_data`](Self::send_data)
    /// alongside the automatic `content-type`. The header list is only
    /// allocated the first time this is called.
    #[inline]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Vec::new).push((key.into(), value.into()));
        self
    }

    /// Overrides the status code a factory constructor set (or supplies one,
    /// if this `Data` was never given a status).
    #[inline]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets `status`, a `content-type: application/json; charset=utf-8`
    /// header (unless [`with_header`](Self::with_header) already set one),
    /// and serializes this envelope as the response body. `204 No Content`
    /// never carries a body, regardless of `data`.
    ///
    /// # Panics
    /// In debug builds, if serialization fails (e.g. a custom `Serialize`
    /// impl returns `Err`) — a success path should never produce invalid
    /// JSON, so this is treated the same as the other response-builder
    /// invariants enforced by [`Response`].
    pub fn send_data(&self, response: &mut Response) -> Handled {
        let status = self.status.unwrap_or(if self.error.is_some() {
            StatusCode::InternalServerError
        } else {
            StatusCode::Ok
        });
        response.status(status);

        let has_content_type = self
            .headers
            .as_ref()
            .is_some_and(|headers| headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")));
        if !has_content_type {
            response.header("content-type", "application/json; charset=utf-8");
        }
        if let Some(headers) = &self.headers {
            for (key, value) in headers {
                response.header(key.clone(), value.clone());
            }
        }

        if status == StatusCode::NoContent {
            return response.body("");
        }

        response.body_with(|writer| {
            if let Err(err) = serde_json::to_writer(writer, self) {
                debug_assert!(false, "Data<T> failed to serialize: {err}");
            }
        })
    }
}

impl Data<()> {
    #[inline]
    fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
            status: Some(status),
            meta: None,
            headers: None,
        }
    }

    /// `204 No Content`, with no body written regardless of `meta`/`headers`.
    #[inline]
    pub fn no_content() -> Self {
        Self {
            data: None,
            error: None,
            status: Some(StatusCode::NoContent),
            meta: None,
            headers: None,
        }
    }

    /// `400 Bad Request` with `message` as the `error` field.
    #[inline]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::BadRequest, message)
    }

    /// `401 Unauthorized` with `message` as the `error` field.
    #[inline]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::Unauthorized, message)
    }

    /// `403 Forbidden` with `message` as the `error` field.
    #[inline]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::Forbidden, message)
    }

    /// `404 Not Found` with `message` as the `error` field.
    #[inline]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::NotFound, message)
    }

    /// `500 Internal Server Error` with `message` as the `error` field.
    #[inline]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::InternalServerError, message)
    }
}

impl<T: Serialize> Serialize for Data<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = 1 + self.meta.is_some() as usize;
        let mut map = serializer.serialize_map(Some(len))?;
        match (&self.error, &self.data) {
            (Some(message), _) => map.serialize_entry("error", message)?,
            (None, Some(data)) => map.serialize_entry("data", data)?,
            (None, None) => map.serialize_entry("data", &Value::Null)?,
        }
        if let Some(meta) = &self.meta {
            map.serialize_entry("meta", meta)?;
        }
        map.end()
    }
}
