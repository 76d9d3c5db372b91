//! Text payloads for MQTT publishers.

use std::borrow::Cow;

/// How the publisher builds each message body from `--message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSpec {
    /// No `--message`: each iteration sends `Message <i>`.
    Counter,
    /// `--message` was all digits: a random `A-Z0-9` string of that
    /// length, generated once and reused for every publish.
    Random(String),
    /// Any other `--message`: sent verbatim.
    Literal(String),
}

impl MessageSpec {
    /// Interprets the `--message` flag.
    #[must_use]
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("") => Self::Counter,
            Some(s) if s.bytes().all(|b| b.is_ascii_digit()) => match s.parse::<usize>() {
                Ok(len) => Self::Random(random_upper_alphanumeric(len)),
                Err(_) => Self::Literal(s.to_string()),
            },
            Some(s) => Self::Literal(s.to_string()),
        }
    }

    /// Body for the 1-based iteration `i`.
    #[must_use]
    pub fn render(&self, i: u64) -> Cow<'_, str> {
        match self {
            Self::Counter => Cow::Owned(format!("Message {i}")),
            Self::Random(s) | Self::Literal(s) => Cow::Borrowed(s),
        }
    }
}

/// Random string of `len` characters from `A-Z0-9`.
#[must_use]
pub fn random_upper_alphanumeric(len: usize) -> String {
    (0..len)
        .map(|_| {
            if fastrand::u8(0..36) < 26 {
                fastrand::uppercase()
            } else {
                fastrand::digit(10)
            }
        })
        .collect()
}

/// Random string of `len` characters from `a-zA-Z0-9`.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    (0..len).map(|_| fastrand::alphanumeric()).collect()
}
