use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, Method, StatusCode},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What the server saw of a request sent to `/echo`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    /// Header names are lower-cased by the HTTP stack.
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: String,
}

/// One file part decoded by `/upload`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

/// All parts decoded by `/upload`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Upload {
    pub fields: BTreeMap<String, String>,
    pub files: Vec<UploadedFile>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", get(status).post(status))
        .route("/upload", post(upload))
        .route("/cookies", get(cookies))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        headers,
        query,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Two `Set-Cookie` headers on one response.
async fn cookies() -> (HeaderMap, &'static str) {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, HeaderValue::from_static("session=abc"));
    headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark"));
    (headers, "baked")
}

/// Answer with the status from the path and the `body` query parameter.
async fn status(
    Path(code): Path<u16>,
    Query(query): Query<StatusQuery>,
) -> (StatusCode, String) {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, query.body),
        Err(_) => (StatusCode::BAD_REQUEST, format!("invalid status code {code}")),
    }
}

async fn upload(mut multipart: Multipart) -> Result<Json<Upload>, (StatusCode, String)> {
    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content = field.bytes().await.map_err(bad_multipart)?;
        match file_name {
            Some(file_name) => upload.files.push(UploadedFile {
                field_name,
                file_name,
                content: content.to_vec(),
            }),
            None => {
                upload
                    .fields
                    .insert(field_name, String::from_utf8_lossy(&content).into_owned());
            }
        }
    }
    Ok(Json(upload))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}
