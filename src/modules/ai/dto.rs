use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateMetadataRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Transcript is required"))]
    pub transcript: String,
}

/// Suggested title, description and comma separated tags for a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetadataSuggestion {
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "tags_from_text_or_list")]
    pub tags: String,
}

impl MetadataSuggestion {
    /// Returned whenever the text-generation service cannot be used.
    pub fn unavailable() -> Self {
        Self {
            title: "Error generating title".to_string(),
            description: "AI Service unavailable".to_string(),
            tags: "error".to_string(),
        }
    }
}

/// Models asked for "a comma separated list" sometimes answer with a JSON array.
fn tags_from_text_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Tags::deserialize(deserializer)? {
        Tags::Text(text) => text,
        Tags::List(list) => list.join(", "),
    })
}

// generateContent wire format, reduced to the fields we read or send.

#[derive(Debug, Serialize)]
pub(super) struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Candidate {
    pub content: Option<Content>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_accept_text_or_list() {
        let text: MetadataSuggestion =
            serde_json::from_str(r#"{"title":"t","description":"d","tags":"a, b"}"#).unwrap();
        let list: MetadataSuggestion =
            serde_json::from_str(r#"{"title":"t","description":"d","tags":["a","b"]}"#).unwrap();
        assert_eq!(text, list);
    }
}
