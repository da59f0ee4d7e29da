use serde_json::Value;

/// Expected shape of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Html,
    Json,
}

/// A fetched and parsed remote document.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Html { url: String, text: String },
    Json { url: String, value: Value },
}

impl Document {
    /// Parse a 2xx body. The error string describes why the body is unusable.
    pub fn parse(url: &str, format: Format, body: Vec<u8>) -> Result<Self, String> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err("empty document".into());
        }
        match format {
            Format::Html => {
                let text = String::from_utf8(body).map_err(|e| format!("body is not UTF-8: {e}"))?;
                Ok(Self::Html {
                    url: url.to_string(),
                    text,
                })
            }
            Format::Json => {
                let value = serde_json::from_slice(&body).map_err(|e| format!("invalid JSON: {e}"))?;
                Ok(Self::Json {
                    url: url.to_string(),
                    value,
                })
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Html { url, .. } | Self::Json { url, .. } => url,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Html { text, .. } => Some(text),
            Self::Json { .. } => None,
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json { value, .. } => Some(value),
            Self::Html { .. } => None,
        }
    }
}
