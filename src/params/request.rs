use std::net::SocketAddr;

use axum::{
    async_trait,
    body::to_bytes,
    extract::{ConnectInfo, FromRequest, Request},
    http::{header::CONTENT_TYPE, HeaderMap, Method, Uri},
};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Largest request body read into parameters
const BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Untyped request parameters gathered from every place a client can put them
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub method: Method,
    pub headers: HeaderMap,
    /// `X-Real-IP` when a proxy set it, else the peer address if known
    pub ip: Option<String>,
    pub param_url: Map<String, Value>,
    /// Empty unless the body is a JSON object
    pub param_json: Map<String, Value>,
    pub param_form: Map<String, Value>,
}

impl RequestParams {
    pub fn from_parts(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        peer: Option<SocketAddr>,
        body: &[u8],
    ) -> Self {
        let ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| peer.map(|p| p.ip().to_string()));

        let param_url = uri.query().map(parse_urlencoded).unwrap_or_default();

        let param_json = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let is_form = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        let param_form = if is_form {
            std::str::from_utf8(body).map(parse_urlencoded).unwrap_or_default()
        } else {
            Map::new()
        };

        Self { method, headers, ip, param_url, param_json, param_form }
    }

    /// Parameters to validate: the query string for GET, the JSON body otherwise
    pub fn checking(&self) -> Value {
        if self.method == Method::GET {
            Value::Object(self.param_url.clone())
        } else {
            Value::Object(self.param_json.clone())
        }
    }

    pub fn content(&self) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), Value::String(v.to_string()))))
            .collect();
        serde_json::json!({
            "method": self.method.as_str(),
            "headers": headers,
            "param_url": self.param_url,
            "param_json": self.param_json,
            "param_form": self.param_form,
        })
    }
}

fn parse_urlencoded(raw: &str) -> Map<String, Value> {
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

#[async_trait]
impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let bytes = to_bytes(body, BODY_LIMIT)
            .await
            .map_err(|e| ApiError::bad_request("unreadable request body").with_prompt(e.to_string()))?;
        Ok(Self::from_parts(parts.method, &parts.uri, parts.headers, peer, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn get_requests_check_the_query_string() {
        let req = Request::builder()
            .method(Method::GET)
            .uri("/items?limit=5&name=Lao%20Xu")
            .header("x-real-ip", "10.0.0.7")
            .body(Body::empty())
            .unwrap();
        let params = RequestParams::from_request(req, &()).await.unwrap();
        assert_eq!(params.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(params.checking()["limit"], "5");
        assert_eq!(params.checking()["name"], "Lao Xu");
        assert!(params.param_json.is_empty());
    }

    #[tokio::test]
    async fn other_methods_check_the_json_body() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/items?ignored=1")
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::from(r#"{"limit": 3}"#))
            .unwrap();
        let params = RequestParams::from_request(req, &()).await.unwrap();
        assert_eq!(params.checking(), serde_json::json!({"limit": 3}));
        assert_eq!(params.content()["param_url"]["ignored"], "1");
    }

    #[test]
    fn invalid_json_and_forms() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));
        let uri: Uri = "/login".parse().unwrap();
        let params = RequestParams::from_parts(Method::POST, &uri, headers, None, b"user=a&pass=b");
        assert!(params.param_json.is_empty());
        assert_eq!(params.param_form.get("user"), Some(&Value::String("a".into())));
        assert_eq!(params.ip, None);
    }
}
