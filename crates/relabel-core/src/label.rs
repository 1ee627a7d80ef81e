use serde::{Deserialize, Serialize};

pub const LABEL_PREFIX: &str = "GFS_";

/// A container image reference as written in an agent block. Never empty, and
/// free of quotes, braces, backslashes and whitespace so its basename can be
/// spliced into a single-quoted label literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(image: impl Into<String>) -> Option<Self> {
        let image = image.into();
        if image.is_empty() || image.chars().any(is_forbidden) {
            None
        } else {
            Some(Self(image))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, tag included: `registry/team/tool:1.2` -> `tool:1.2`.
    pub fn basename(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\'' | '"' | '{' | '}' | '\\') || c.is_whitespace()
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Agent selector label derived from an image.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(String);

impl Label {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn derive_label(image: &ImageRef) -> Label {
    Label(format!("{LABEL_PREFIX}{}", image.basename().replace(':', "_")))
}
