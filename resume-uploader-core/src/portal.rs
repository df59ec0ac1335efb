//! Portal profile: the URLs, UI hooks and page-text signals the workflow
//! relies on. Defaults describe Naukri; every field can be overridden from
//! the config file when the portal's markup moves.

use std::fmt;

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector, e.g. `input[type="file"]`.
    Css(String),
    /// A `<button>` whose visible text contains this string (case-insensitive).
    ButtonText(String),
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn button(text: &str) -> Self {
        Locator::ButtonText(text.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{s}`"),
            Locator::ButtonText(t) => write!(f, "button \"{t}\""),
        }
    }
}

/// Case-insensitive page-text pattern, (de)serialized as its source string.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }

    /// Every matched substring, in page order.
    pub fn matches<'a>(&'a self, haystack: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.find_iter(haystack).map(|m| m.as_str())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

// Built-in patterns are literals known to compile.
fn builtin(source: &str) -> Pattern {
    Pattern::new(source).unwrap_or_else(|e| panic!("built-in pattern {source:?} is invalid: {e}"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalProfile {
    pub name: String,
    /// Scheme + host the session cookies belong to.
    pub origin: String,
    pub login_url: String,
    pub profile_url: String,
    /// Tried in order; the first one present on the page is used.
    pub username_inputs: Vec<Locator>,
    pub password_inputs: Vec<Locator>,
    pub login_buttons: Vec<Locator>,
    pub otp_inputs: Vec<Locator>,
    pub otp_submit_buttons: Vec<Locator>,
    /// Page text meaning the portal is waiting for a one-time code.
    pub otp_markers: Vec<Pattern>,
    /// Element only rendered for a logged-in user.
    pub authenticated_marker: Locator,
    /// Page text accepted as a logged-in signal when the marker is absent.
    pub authenticated_text: Pattern,
    pub upload_inputs: Vec<Locator>,
    /// Clicking this may inject the file input into the page.
    pub upload_trigger: Locator,
    /// Page text that confirms the new file was accepted.
    pub confirmations: Vec<Pattern>,
}

impl Default for PortalProfile {
    fn default() -> Self {
        PortalProfile {
            name: "naukri".to_string(),
            origin: "https://www.naukri.com".to_string(),
            login_url: "https://www.naukri.com/nlogin/login".to_string(),
            profile_url: "https://www.naukri.com/mnjuser/profile?id=&altresid".to_string(),
            username_inputs: vec![
                Locator::css(r#"input[name="email"]"#),
                Locator::css(r#"input[name="emailId"]"#),
                Locator::css("input#eLoginNew"),
                Locator::css(r#"input[placeholder*="Email"]"#),
                Locator::css(r#"input[placeholder*="Username"]"#),
                Locator::css(r#"input[type="text"]"#),
            ],
            password_inputs: vec![
                Locator::css(r#"input[name="password"]"#),
                Locator::css("input#pwd1"),
                Locator::css(r#"input[type="password"]"#),
            ],
            login_buttons: vec![
                Locator::button("login"),
                Locator::button("submit"),
                Locator::css(r#"button[type="submit"]"#),
            ],
            otp_inputs: vec![
                Locator::css(r#"input[autocomplete="one-time-code"]"#),
                Locator::css(r#"input[name*="otp"]"#),
                Locator::css(r#"input[id*="otp"]"#),
            ],
            otp_submit_buttons: vec![Locator::button("verify"), Locator::button("submit")],
            otp_markers: vec![
                builtin(r"enter\s+(the\s+)?otp"),
                builtin(r"one[- ]time\s+password"),
                builtin(r"otp\s+(has\s+been\s+)?sent"),
            ],
            authenticated_marker: Locator::button("update resume"),
            authenticated_text: builtin(r"\blogout\b"),
            upload_inputs: vec![
                Locator::css(r#"input[type="file"]"#),
                Locator::css("input[type=file]"),
            ],
            upload_trigger: Locator::button("update resume"),
            confirmations: vec![
                builtin(r"uploaded\s+on\s*:?\s*[a-z]{3,9}\s+\d{1,2},?\s+\d{4}"),
                builtin(
                    r"resume\s+(has\s+been\s+)?(uploaded\s+successfully|successfully\s+uploaded)",
                ),
            ],
        }
    }
}

impl PortalProfile {
    pub fn shows_otp_prompt(&self, page: &str) -> bool {
        self.otp_markers.iter().any(|p| p.is_match(page))
    }

    /// Confirmation snippets currently on the page.
    pub fn confirmation_snippets(&self, page: &str) -> Vec<String> {
        self.confirmations
            .iter()
            .flat_map(|p| p.matches(page))
            .map(str::to_string)
            .collect()
    }
}

/// Date at the end of an "Uploaded on <Mon> <d>, <yyyy>" snippet.
pub fn upload_date(snippet: &str) -> Option<NaiveDate> {
    let cleaned = snippet.replace([',', ':'], " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let [month, day, year] = &tokens[tokens.len().checked_sub(3)?..] else {
        return None;
    };
    NaiveDate::parse_from_str(&format!("{month} {day} {year}"), "%b %d %Y").ok()
}
