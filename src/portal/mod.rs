//! Client for the university's academic-affairs portal (`zhjw`).
//!
//! The portal is a session-cookie web application: every call after login
//! rides on the `JSESSIONID` cookie the login exchange establishes, so a
//! single [`PortalClient`] owns one cookie store for its whole life.

pub mod auth;
pub mod batch;
pub mod errors;
pub mod evaluation;
pub mod form;
pub mod json;
pub mod models;

pub use batch::{Progress, ProgressEvent};
pub use errors::{CourseError, EvaluationStage, PortalError};
pub use form::{EvaluationForm, FormValue, SubmitPhase};
pub use models::Course;

use crate::utils::log_if_slow;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_PORTAL_URL: &str = "http://zhjw.scu.edu.cn";

// Endpoint paths, joined onto the configured portal URL.
const CAPTCHA_PATH: &str = "/img/captcha.jpg";
const LOGIN_PAGE_PATH: &str = "/login";
const LOGIN_PATH: &str = "/j_spring_security_check";
const EVALUATION_LIST_PATH: &str = "/student/teachingAssessment/evaluation/queryAll";
const EVALUATION_FORM_PATH: &str = "/student/teachingEvaluation/newEvaluation/evaluation/";
const EVALUATION_SAVE_PATH: &str = "/student/teachingAssessment/baseInformation/questionsAdd/doSave";

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9";
const API_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Requests slower than this are logged at WARN.
const SLOW_REQUEST: Duration = Duration::from_secs(2);

/// Connection and pacing settings for a [`PortalClient`].
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: Url,
    pub request_timeout: Duration,
    /// Pause between the draft and the final submission of one course.
    pub phase_delay: Duration,
    /// Pause after each course of a batch.
    pub course_delay: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_PORTAL_URL).expect("default portal URL is valid"),
            request_timeout: Duration::from_secs(30),
            phase_delay: Duration::from_secs(1),
            course_delay: Duration::from_secs(2),
        }
    }
}

/// Which browser header set a request imitates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    /// Top-level page loads and plain form posts.
    Page,
    /// XHR calls answered with JSON.
    Api,
}

/// A cookie-backed session against the portal.
#[derive(Debug)]
pub struct PortalClient {
    /// `None` once [`PortalClient::close`] has run.
    http: Option<reqwest::Client>,
    config: PortalConfig,
    host: HeaderValue,
    /// Set by [`PortalClient::login`] once its input has been validated.
    username: Option<String>,
}

impl PortalClient {
    pub fn new(config: PortalConfig) -> Result<Self, PortalError> {
        let host = match (config.base_url.host_str(), config.base_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(PortalError::Validation(format!(
                    "portal URL has no host: {}",
                    config.base_url
                )));
            }
        };
        let host = HeaderValue::from_str(&host)
            .map_err(|_| PortalError::Validation(format!("invalid portal host: {host}")))?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http: Some(http),
            config,
            host,
            username: None,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Username most recently passed to [`PortalClient::login`], if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Drop the HTTP client and its idle connections.
    ///
    /// Idempotent. Any request issued afterwards fails with
    /// [`PortalError::SessionClosed`].
    pub fn close(&mut self) {
        if self.http.take().is_some() {
            debug!("portal session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.is_none()
    }

    fn http(&self) -> Result<&reqwest::Client, PortalError> {
        self.http.as_ref().ok_or(PortalError::SessionClosed)
    }

    fn endpoint(&self, path: &str) -> Result<Url, PortalError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| PortalError::Validation(format!("invalid portal endpoint {path}: {e}")))
    }

    fn headers(&self, kind: RequestKind) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let accept = match kind {
            RequestKind::Page => PAGE_ACCEPT,
            RequestKind::Api => API_ACCEPT,
        };
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::DNT, HeaderValue::from_static("1"));
        headers.insert(header::HOST, self.host.clone());
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        match kind {
            RequestKind::Page => {
                headers.insert(
                    header::UPGRADE_INSECURE_REQUESTS,
                    HeaderValue::from_static("1"),
                );
            }
            RequestKind::Api => {
                headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
            }
        }
        headers
    }

    /// GET a page, failing on anything but `200 OK`.
    async fn get_page(&self, url: Url) -> Result<Response, PortalError> {
        let start = Instant::now();
        debug!(url = %url, "GET");
        let resp = self
            .http()?
            .get(url.clone())
            .headers(self.headers(RequestKind::Page))
            .send()
            .await?;
        log_if_slow(start, SLOW_REQUEST, url.path());
        ensure_ok(resp)
    }

    /// POST url-encoded `fields`. The status is left to the caller.
    async fn post_form(&self, url: Url, fields: &[(&str, &str)]) -> Result<Response, PortalError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        let start = Instant::now();
        debug!(url = %url, "POST form");
        let resp = self
            .http()?
            .post(url.clone())
            .headers(self.headers(RequestKind::Page))
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        log_if_slow(start, SLOW_REQUEST, url.path());
        Ok(resp)
    }

    /// POST a multipart body as an XHR call, failing on anything but `200 OK`.
    async fn post_multipart(
        &self,
        url: Url,
        form: reqwest::multipart::Form,
    ) -> Result<Response, PortalError> {
        let start = Instant::now();
        debug!(url = %url, "POST multipart");
        let resp = self
            .http()?
            .post(url.clone())
            .headers(self.headers(RequestKind::Api))
            .multipart(form)
            .send()
            .await?;
        log_if_slow(start, SLOW_REQUEST, url.path());
        ensure_ok(resp)
    }
}

fn ensure_ok(resp: Response) -> Result<Response, PortalError> {
    if resp.status() != StatusCode::OK {
        return Err(PortalError::UnexpectedStatus {
            url: resp.url().to_string(),
            status: resp.status().as_u16(),
        });
    }
    Ok(resp)
}
