//! Shared fixtures for driving a `PortalClient` against a mock portal.
#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mockito::{Matcher, Mock, ServerGuard};
use quickeval::portal::{Course, PortalClient, PortalConfig};
use std::io::Cursor;
use std::time::Duration;
use url::Url;

pub const CAPTCHA_PATH: &str = "/img/captcha.jpg";
pub const LOGIN_PAGE_PATH: &str = "/login";
pub const LOGIN_PATH: &str = "/j_spring_security_check";
pub const LIST_PATH: &str = "/student/teachingAssessment/evaluation/queryAll";
pub const FORM_PATH: &str = "/student/teachingEvaluation/newEvaluation/evaluation/";
pub const SAVE_PATH: &str = "/student/teachingAssessment/baseInformation/questionsAdd/doSave";

pub const LOGIN_TOKEN: &str = "4f1c0a9e-login";

/// A client for `server` that never sleeps between phases or courses.
pub fn client_for(server: &ServerGuard) -> PortalClient {
    PortalClient::new(PortalConfig {
        base_url: Url::parse(&server.url()).unwrap(),
        request_timeout: Duration::from_secs(5),
        phase_delay: Duration::ZERO,
        course_delay: Duration::ZERO,
    })
    .unwrap()
}

pub async fn portal() -> (ServerGuard, PortalClient) {
    let server = mockito::Server::new_async().await;
    let client = client_for(&server);
    (server, client)
}

/// A small striped PNG standing in for the captcha.
pub fn captcha_png() -> Vec<u8> {
    let img = RgbImage::from_fn(40, 16, |x, _| {
        if x % 4 < 2 {
            Rgb([20, 20, 20])
        } else {
            Rgb([235, 235, 235])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn mock_captcha(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", CAPTCHA_PATH)
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(captcha_png())
}

pub fn login_page() -> String {
    format!(
        r#"<html><body><form action="/j_spring_security_check" method="post">
<input type="hidden" id="tokenValue" name="tokenValue" value="{LOGIN_TOKEN}">
<input type="text" name="j_username"><input type="password" name="j_password">
</form></body></html>"#
    )
}

pub fn mock_login_page(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", LOGIN_PAGE_PATH)
        .with_status(200)
        .with_body(login_page())
}

/// Login POST answering with `body`.
///
/// The `mock_*` helpers return builders; tests add expectations before
/// `create_async`.
pub fn mock_login(server: &mut ServerGuard, body: &str) -> Mock {
    server
        .mock("POST", LOGIN_PATH)
        .with_status(200)
        .with_body(body)
}

/// `(name, topic_id, evaluated_flag)` rows as the listing endpoint returns them.
pub fn list_body(records: &[(&str, &str, &str)]) -> String {
    let records: Vec<_> = records
        .iter()
        .map(|(name, topic, flag)| {
            serde_json::json!({
                "KCM": name,
                "KTID": topic,
                "WJBM": "0000000124",
                "SFPG": flag,
                "JSM": "张老师",
            })
        })
        .collect();
    serde_json::json!({ "data": { "records": records, "total": records.len() } }).to_string()
}

pub fn mock_list(server: &mut ServerGuard, records: &[(&str, &str, &str)]) -> Mock {
    server
        .mock("POST", LIST_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("pageNum".into(), "1".into()),
            Matcher::UrlEncoded("pageSize".into(), "30".into()),
            Matcher::UrlEncoded("flag".into(), "kt".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(list_body(records))
}

/// An evaluation page carrying `token` and the usual question kinds.
pub fn questionnaire(token: &str, topic_id: &str) -> String {
    format!(
        r#"<html><body><form id="evaluationForm">
<input type="hidden" name="tokenValue" value="{token}">
<input type="hidden" name="wjbm" value="0000000124">
<input type="hidden" name="ktid" value="{topic_id}">
<input type="radio" name="0000000401" value="10_1">
<input type="radio" name="0000000401" value="10_0.8">
<input type="checkbox" name="0000000402" value="K_课堂互动">
<input type="checkbox" name="0000000402" value="K_以上均无">
<input type="text" name="0000000403" placeholder="请输入1-100的整数">
<textarea class="form-control value_element" name="zgpj"></textarea>
</form></body></html>"#
    )
}

pub fn mock_form(server: &mut ServerGuard, topic_id: &str, token: &str) -> Mock {
    server
        .mock("GET", format!("{FORM_PATH}{topic_id}").as_str())
        .with_status(200)
        .with_body(questionnaire(token, topic_id))
}

/// Matches the multipart part carrying the phase marker.
pub fn phase_part(marker: &str) -> Matcher {
    Matcher::Regex(format!(r#"name="tjcs"\r\n\r\n{marker}\r\n"#))
}

/// Save endpoint for submissions made under `token` in the given phase.
pub fn mock_save(server: &mut ServerGuard, token: &str, marker: &str, body: &str) -> Mock {
    server
        .mock("POST", SAVE_PATH)
        .match_query(Matcher::UrlEncoded("tokenValue".into(), token.into()))
        .match_body(phase_part(marker))
        .match_header("x-requested-with", "XMLHttpRequest")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
}

pub fn course(name: &str, topic_id: &str) -> Course {
    Course {
        name: name.to_string(),
        topic_id: topic_id.to_string(),
        questionnaire_code: "0000000124".to_string(),
        evaluated_flag: "0".to_string(),
        index: 0,
    }
}
