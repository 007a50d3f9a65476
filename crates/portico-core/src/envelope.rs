//! JSON response envelopes.
//!
//! REST clients always receive one of four shapes:
//!
//! | Shape     | Status  | Fields                                           |
//! |-----------|---------|--------------------------------------------------|
//! | success   | 200     | `code`, `message`, `data`, `correlation_id`      |
//! | accepted  | 202     | `code`, `id`, `message`, `data`, `correlation_id`|
//! | not found | 404     | `code`, `data`, `correlation_id`                 |
//! | failure   | 4xx/5xx | `code`, `data`, `error`, `stacktrace`, `correlation_id` |
//!
//! Empty fields are omitted. `error` and `stacktrace` are only populated in
//! development mode.

use http::{HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::body::{json, HttpResponse};
use crate::context::{RequestContext, CORRELATION_ID_HEADER};
use crate::error::ApiError;

/// A REST response waiting to be rendered.
#[derive(Debug)]
pub enum Envelope {
    /// 200 with a payload.
    Success {
        /// Response payload.
        data: Value,
    },
    /// 202 for work accepted under `id`.
    Accepted {
        /// Identifier of the accepted work.
        id: String,
        /// Response payload.
        data: Value,
    },
    /// 404.
    NotFound {
        /// Response payload.
        data: Value,
    },
    /// A 4xx/5xx failure.
    Failure {
        /// Response payload.
        data: Value,
        /// The failure.
        error: ApiError,
    },
}

#[derive(Serialize)]
struct Rendered<'a> {
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Value::is_null")]
    data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stacktrace: Option<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    correlation_id: &'a str,
}

impl Envelope {
    /// Builds a success envelope from any serializable payload.
    ///
    /// A payload that fails to serialize becomes a 500 failure.
    pub fn success<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::Success { data },
            Err(err) => Self::failure(ApiError::internal("response serialization failed").with_source(err)),
        }
    }

    /// Builds an accepted envelope.
    pub fn accepted<T: Serialize>(id: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::Accepted {
                id: id.into(),
                data,
            },
            Err(err) => Self::failure(ApiError::internal("response serialization failed").with_source(err)),
        }
    }

    /// Builds a not-found envelope without payload.
    pub fn not_found() -> Self {
        Self::NotFound { data: Value::Null }
    }

    /// Builds a failure envelope without payload.
    pub fn failure(error: ApiError) -> Self {
        Self::Failure {
            data: Value::Null,
            error,
        }
    }

    /// Returns the HTTP status this envelope renders with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::Accepted { .. } => StatusCode::ACCEPTED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Failure { error, .. } => error.status(),
        }
    }

    /// Renders the envelope into a JSON value for the given request.
    pub fn to_json(&self, ctx: &RequestContext) -> Value {
        let dev = ctx.is_development();
        let correlation_id = ctx.correlation_id().as_str();
        let code = self.status().as_u16();
        let rendered = match self {
            Self::Success { data } => Rendered {
                code,
                id: None,
                message: Some("Success"),
                data,
                error: None,
                stacktrace: None,
                correlation_id,
            },
            Self::Accepted { id, data } => Rendered {
                code,
                id: Some(id),
                message: Some("Accepted"),
                data,
                error: None,
                stacktrace: None,
                correlation_id,
            },
            Self::NotFound { data } => Rendered {
                code,
                id: None,
                message: None,
                data,
                error: None,
                stacktrace: None,
                correlation_id,
            },
            Self::Failure { data, error } => Rendered {
                code,
                id: None,
                message: None,
                data,
                error: dev.then(|| error.detail()),
                stacktrace: if dev { error.stacktrace() } else { None },
                correlation_id,
            },
        };
        serde_json::to_value(rendered).unwrap_or(Value::Null)
    }

    /// Renders the envelope into a response, echoing the correlation id header.
    pub fn into_response(self, ctx: &RequestContext) -> HttpResponse {
        let body = self.to_json(ctx).to_string();
        let mut response = json(self.status(), body);
        if let Ok(value) = HeaderValue::from_str(ctx.correlation_id().as_str()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        response
    }
}
