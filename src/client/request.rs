//! Outbound request construction.

use axum::{
    body::{Body, Bytes},
    http::{header, Method, Request, StatusCode},
};
use serde::Serialize;
use url::{form_urlencoded, Url};

use super::{ClientError, HttpClient};
use crate::http::request::CorrelationContext;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request body and the encoding it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl Payload {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ClientError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => JSON_CONTENT_TYPE,
            Self::Form(_) => FORM_CONTENT_TYPE,
        }
    }

    /// JSON bodies go out only with POST and PATCH; form bodies always.
    fn encode(&self, method: &Method) -> Result<Bytes, ClientError> {
        match self {
            Self::Json(value) if *method == Method::POST || *method == Method::PATCH => {
                Ok(Bytes::from(serde_json::to_vec(value)?))
            }
            Self::Json(_) => Ok(Bytes::new()),
            Self::Form(pairs) => Ok(Bytes::from(
                form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish(),
            )),
        }
    }
}

/// A single outbound call, built up before being sent.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: String,
    payload: Payload,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

/// Status and fully read body of an outbound call.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>, payload: Payload) -> Self {
        Self {
            method,
            url: url.into(),
            payload,
            headers: Vec::new(),
            query: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Build the wire request. With `ctx`, the call joins that request's trace.
    pub fn build(&self, ctx: Option<&CorrelationContext>) -> Result<Request<Body>, ClientError> {
        let mut url = Url::parse(&self.url)?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }

        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, self.payload.content_type());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut req = builder.body(Body::from(self.payload.encode(&self.method)?))?;
        if let Some(ctx) = ctx {
            req.extensions_mut().insert(ctx.clone());
        }
        Ok(req)
    }

    /// Execute through `client` and read the whole response body.
    pub async fn send(
        &self,
        client: &HttpClient,
        ctx: Option<&CorrelationContext>,
    ) -> Result<OutboundResponse, ClientError> {
        let response = client.execute(self.build(ctx)?).await?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(ClientError::Body)?;
        Ok(OutboundResponse { status, body })
    }
}
