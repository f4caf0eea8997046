//! Captcha, login token and credential submission.

use super::{
    CAPTCHA_PATH, LOGIN_PAGE_PATH, LOGIN_PATH, PortalClient, PortalError,
};
use image::DynamicImage;
use md5::{Digest, Md5};
use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Hidden input on the login page carrying the anti-forgery token.
static LOGIN_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<input type="hidden" id="tokenValue" name="tokenValue" value="(.*?)">"#)
        .unwrap()
});

const WELCOME_MARKER: &str = "欢迎您";
const BAD_CAPTCHA_MARKER: &str = "验证码不正确";
const BAD_PASSWORD_MARKER: &str = "密码错误";
const ERROR_PAGE_MARKER: &str = "错误提示";

impl PortalClient {
    /// Download and decode the login captcha.
    ///
    /// Each call yields a new image; the portal remembers the most recent
    /// one for this session.
    pub async fn fetch_captcha(&self) -> Result<DynamicImage, PortalError> {
        let resp = self.get_page(self.endpoint(CAPTCHA_PATH)?).await?;
        let bytes = resp.bytes().await?;
        let image = image::load_from_memory(&bytes).map_err(|e| PortalError::Decode {
            what: "captcha image",
            source: e.into(),
        })?;
        debug!(
            bytes = bytes.len(),
            width = image.width(),
            height = image.height(),
            "Fetched captcha"
        );
        Ok(image)
    }

    /// Read the anti-forgery token off the login page.
    pub async fn fetch_login_token(&self) -> Result<String, PortalError> {
        let resp = self.get_page(self.endpoint(LOGIN_PAGE_PATH)?).await?;
        let body = resp.text().await?;
        extract_login_token(&body)
    }

    /// Submit credentials and the captcha answer.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the portal refused
    /// without saying why. Captcha and password rejections are reported as
    /// [`PortalError::Captcha`] and [`PortalError::Credentials`].
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        captcha: &str,
    ) -> Result<bool, PortalError> {
        check_login_input(username, password, captcha)?;
        let (username, captcha) = (username.trim(), captcha.trim());
        self.username = Some(username.to_string());

        let token = self.fetch_login_token().await?;
        let hashed = hash_password(password);

        let resp = self
            .post_form(
                self.endpoint(LOGIN_PATH)?,
                &[
                    ("tokenValue", token.as_str()),
                    ("j_username", username),
                    ("j_password", hashed.as_str()),
                    ("j_captcha", captcha),
                ],
            )
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        let outcome = classify_login(status, &body);
        match &outcome {
            Ok(true) => info!(username, "Logged in"),
            Ok(false) => warn!(username, status = status.as_u16(), "Login refused"),
            Err(e) => warn!(username, error = %e, "Login rejected"),
        }
        outcome
    }
}

/// Reject login input the portal could never accept, before anything is sent.
///
/// Username and captcha are judged after trimming; the password as typed.
pub fn check_login_input(username: &str, password: &str, captcha: &str) -> Result<(), PortalError> {
    if username.trim().is_empty() || password.is_empty() || captcha.trim().is_empty() {
        return Err(PortalError::Validation(
            "学号、密码和验证码不能为空".to_string(),
        ));
    }
    Ok(())
}

fn extract_login_token(body: &str) -> Result<String, PortalError> {
    LOGIN_TOKEN_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PortalError::Parse("login page has no tokenValue input".to_string()))
}

/// Lowercase hex MD5 of the password, which is what the login form posts.
pub(crate) fn hash_password(password: &str) -> String {
    format!("{:x}", Md5::digest(password.as_bytes()))
}

/// Decide how a login attempt went from the response the portal sent back.
///
/// The portal has no structured login API, so this scans the page for
/// known markers. A plain `200` page without an error banner counts as
/// success, which also accepts pages the portal might serve for other
/// reasons (an expired session, a maintenance notice). That heuristic is
/// kept because nothing better can be inferred from the page.
pub(crate) fn classify_login(status: StatusCode, body: &str) -> Result<bool, PortalError> {
    if body.contains(WELCOME_MARKER) {
        return Ok(true);
    }
    if body.contains(BAD_CAPTCHA_MARKER) {
        return Err(PortalError::Captcha);
    }
    if body.contains(BAD_PASSWORD_MARKER) {
        return Err(PortalError::Credentials);
    }
    Ok(status == StatusCode::OK && !body.contains(ERROR_PAGE_MARKER))
}
