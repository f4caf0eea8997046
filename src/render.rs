//! Plain-text rendering for the terminal: captcha art and course lists.

use crate::portal::Course;
use image::DynamicImage;
use image::imageops::{self, FilterType};
use std::fmt::Write;

/// Darkest to lightest.
const RAMP: &[u8] = b"@%#*+=-:. ";

/// Terminal cells are roughly twice as tall as they are wide.
const CELL_ASPECT: u32 = 2;

/// Render `image` as grayscale ASCII art `width` characters wide.
pub fn captcha_ascii(image: &DynamicImage, width: u32) -> String {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || width == 0 {
        return String::new();
    }
    let height = (h * width / w / CELL_ASPECT).max(1);
    let gray = imageops::resize(&image.to_luma8(), width, height, FilterType::Triangle);

    let mut out = String::with_capacity(((width + 1) * height) as usize);
    for row in gray.rows() {
        for pixel in row {
            let idx = usize::from(pixel.0[0]) * (RAMP.len() - 1) / 255;
            out.push(char::from(RAMP[idx]));
        }
        out.push('\n');
    }
    out
}

/// Numbered list of courses, 1-based as the user selects them.
pub fn course_list(courses: &[Course]) -> String {
    let mut out = String::new();
    for (i, course) in courses.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {}", i + 1, course.name);
    }
    out
}

/// What the user typed at the course prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Quit,
    /// 0-based positions.
    Courses(Vec<usize>),
}

/// Parse `1 3 4`, `a` or `0`/empty. Numbers outside `1..=count` are an error.
pub fn parse_selection(input: &str, count: usize) -> Result<Selection, String> {
    let input = input.trim();
    if input.is_empty() || input == "0" {
        return Ok(Selection::Quit);
    }
    if input.eq_ignore_ascii_case("a") {
        return Ok(Selection::All);
    }

    let mut picked = Vec::new();
    for token in input.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        let n: usize = token
            .parse()
            .map_err(|_| format!("无法识别的输入: {token}"))?;
        if n == 0 || n > count {
            return Err(format!("编号超出范围: {n} (1-{count})"));
        }
        if !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    Ok(Selection::Courses(picked))
}
