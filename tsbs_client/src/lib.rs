//! Clients for the two endpoints the benchmark talks to: the HTTP `/exec` SQL endpoint
//! ([`Client`]) and the line protocol TCP listener ([`ilp::Sender`]).

pub mod ilp;

use reqwest::{IntoUrl, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Primary error type for the [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("request URL error: {0}")]
    RequestUrl(#[from] url::ParseError),

    #[error("failed to read the API response bytes: {0}")]
    Bytes(#[source] reqwest::Error),

    #[error("failed to parse JSON response: {0}")]
    Json(#[source] serde_json::Error),

    #[error("server responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    fn request_send(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::RequestSend {
            method,
            url: url.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the SQL `/exec` HTTP endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    /// The base URL for making requests to a running server
    base_url: Url,
    /// A [`reqwest::Client`] for handling HTTP requests
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new [`Client`]
    pub fn new<U: IntoUrl>(base_url: U) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            http_client: reqwest::Client::new(),
        })
    }

    /// Create a [`Client`] for `http://{host}:{port}`
    pub fn for_host(host: &str, port: u16) -> Result<Self> {
        Self::new(format!("http://{host}:{port}"))
    }

    /// Run a SQL statement through `GET /exec?query=...`
    ///
    /// Error responses that still carry a JSON body (the server reports SQL errors this way) are
    /// returned as an [`ExecResponse`] with [`ExecResponse::error`] set, so callers can tell
    /// "table does not exist" apart from transport failures.
    ///
    /// # Example
    /// ```no_run
    /// # use tsbs_client::Client;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    /// let client = Client::for_host("localhost", 9000)?;
    /// let response = client.exec("select count(*) from cpu").await?;
    /// println!("{:?}", response.first_value());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn exec(&self, query: impl AsRef<str> + Send) -> Result<ExecResponse> {
        let url = self.base_url.join("/exec")?;
        let resp = self
            .http_client
            .get(url)
            .query(&[("query", query.as_ref())])
            .send()
            .await
            .map_err(|src| Error::request_send(Method::GET, "/exec", src))?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(Error::Bytes)?;
        match serde_json::from_slice::<ExecResponse>(&body) {
            Ok(response) => Ok(response),
            Err(e) if status.is_success() => Err(Error::Json(e)),
            Err(_) => Err(Error::ApiError {
                code: status,
                message: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }
}

/// The JSON body returned by `/exec`.
///
/// Exactly which fields are present depends on the statement: DDL answers with `ddl`, queries
/// with `dataset`, failures with `error`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecResponse {
    pub ddl: Option<String>,
    pub error: Option<String>,
    pub dataset: Option<Vec<Vec<Value>>>,
    pub count: Option<u64>,
}

impl ExecResponse {
    /// `true` if the server acknowledged a DDL statement.
    pub fn is_ddl_ok(&self) -> bool {
        self.ddl.as_deref() == Some("OK")
    }

    /// The first column of the first row, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.dataset.as_ref()?.first()?.first()
    }
}
