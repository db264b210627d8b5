//! Remote marks API.
//!
//! [`MarksApi`] is the seam the sync engine and the façade talk to;
//! [`HttpMarksApi`] implements it over REST with bearer auth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::grading::Grade;
use crate::marks::{MarkFilter, MarkRecord};
use crate::storage::Config;
use crate::sync::retry::{retry_with_backoff, RetryPolicy};
use crate::sync::types::SyncError;

/// Body of `POST /marks` and `PUT /marks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPayload {
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub class_id: String,
    pub marks_obtained: f64,
    pub grade: Grade,
    pub points: u8,
}

impl From<&MarkRecord> for MarkPayload {
    fn from(mark: &MarkRecord) -> Self {
        Self {
            student_id: mark.student_id.clone(),
            subject_id: mark.subject_id.clone(),
            exam_id: mark.exam_id.clone(),
            academic_year_id: mark.academic_year_id.clone(),
            term_id: mark.term_id.clone(),
            class_id: mark.class_id.clone(),
            marks_obtained: mark.marks_obtained,
            grade: mark.grade,
            points: mark.points,
        }
    }
}

/// Server representation of a mark.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMark {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub exam_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub class_id: String,
    pub marks_obtained: f64,
    pub grade: Grade,
    pub points: u8,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteMark {
    /// The mark as a synced local record under its server id.
    pub fn into_record(self) -> MarkRecord {
        let now = Utc::now();
        MarkRecord {
            id: self.id,
            student_id: self.student_id,
            subject_id: self.subject_id,
            exam_id: self.exam_id,
            academic_year_id: self.academic_year_id,
            term_id: self.term_id,
            class_id: self.class_id,
            marks_obtained: self.marks_obtained,
            grade: self.grade,
            points: self.points,
            timestamp: self.updated_at.unwrap_or(now),
            synced: true,
            synced_at: Some(now),
            remote_id: None,
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("unsupported id: {other}"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MarkList {
    Bare(Vec<RemoteMark>),
    Wrapped { data: Vec<RemoteMark> },
}

#[async_trait]
pub trait MarksApi: Send + Sync {
    async fn create_mark(&self, payload: &MarkPayload) -> Result<RemoteMark, SyncError>;

    async fn update_mark(&self, id: &str, payload: &MarkPayload) -> Result<RemoteMark, SyncError>;

    async fn fetch_marks(&self, filter: &MarkFilter) -> Result<Vec<RemoteMark>, SyncError>;
}

/// REST client for the marks endpoints.
#[derive(Clone)]
pub struct HttpMarksApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HttpMarksApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMarksApi")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.token.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpMarksApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: std::time::Duration) -> Result<Self, SyncError> {
        // a base without a trailing slash would lose its last segment on join
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::RemoteUnavailable {
                status: None,
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            token,
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        Ok(Self::new(
            &config.api.base_url,
            config.api.resolved_token(),
            config.api.timeout(),
        )?
        .with_retry(RetryPolicy::from_config(&config.sync)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn marks_url(&self, id: Option<&str>) -> Result<Url, SyncError> {
        let mut url = self.base_url.join("marks")?;
        if let Some(id) = id {
            url.path_segments_mut()
                .map_err(|_| SyncError::InvalidResponse("base url cannot hold a path".into()))?
                .push(id);
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<&MarkPayload>) -> Result<Value, SyncError> {
        retry_with_backoff(&self.retry, || self.send_once(method.clone(), url.clone(), body)).await
    }

    async fn send_once(&self, method: Method, url: Url, body: Option<&MarkPayload>) -> Result<Value, SyncError> {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        tracing::debug!(%method, %url, status = status.as_u16(), "marks api response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Unauthorized);
        }
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteRejection {
                status: status.as_u16(),
                message: truncate(message),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteUnavailable {
                status: Some(status.as_u16()),
                message: truncate(message),
            });
        }

        response.json::<Value>().await.map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_decode() {
        SyncError::InvalidResponse(err.to_string())
    } else {
        SyncError::RemoteUnavailable {
            status: None,
            message: err.to_string(),
        }
    }
}

fn truncate(mut message: String) -> String {
    const MAX: usize = 512;
    if message.len() > MAX {
        let mut cut = MAX;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}

fn parse<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|e| SyncError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl MarksApi for HttpMarksApi {
    async fn create_mark(&self, payload: &MarkPayload) -> Result<RemoteMark, SyncError> {
        let url = self.marks_url(None)?;
        parse(self.send(Method::POST, url, Some(payload)).await?)
    }

    async fn update_mark(&self, id: &str, payload: &MarkPayload) -> Result<RemoteMark, SyncError> {
        let url = self.marks_url(Some(id))?;
        parse(self.send(Method::PUT, url, Some(payload)).await?)
    }

    async fn fetch_marks(&self, filter: &MarkFilter) -> Result<Vec<RemoteMark>, SyncError> {
        let mut url = self.marks_url(None)?;
        {
            let pairs = filter.pairs();
            if !pairs.is_empty() {
                let mut query = url.query_pairs_mut();
                for (name, value) in pairs {
                    query.append_pair(name, value);
                }
            }
        }
        Ok(match parse::<MarkList>(self.send(Method::GET, url, None).await?)? {
            MarkList::Bare(marks) | MarkList::Wrapped { data: marks } => marks,
        })
    }
}
