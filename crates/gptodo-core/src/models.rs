//! Core data models for the image-to-checklist pipeline.
//!
//! These types flow from the extraction client through the reconciler
//! into the persistence store and the presentation layer.

use serde::{Deserialize, Serialize};

/// One line of an extracted checklist.
///
/// `index` is assigned once, when the item is created from the model's
/// answer, and is the identity used for toggling. Display order is derived
/// separately (see [`crate::order`]) and never rewrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            completed: false,
        }
    }
}

/// Ordered result of one extraction. May be empty: "no list detected" is a
/// valid outcome.
pub type ProcessingResult = Vec<ChecklistItem>;

/// Build checklist items from the model's ordered text segments.
///
/// Indices run `0..n` in segment order and every item starts incomplete.
pub fn items_from_segments<I, S>(segments: I) -> ProcessingResult
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    segments
        .into_iter()
        .enumerate()
        .map(|(index, text)| ChecklistItem::new(index, text))
        .collect()
}

/// An intermediate reasoning fragment shown while an extraction is running.
///
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtEvent {
    pub heading: String,
    pub body: String,
}

impl ThoughtEvent {
    /// Split a raw thought into its bold `**heading**` and the remaining body.
    ///
    /// The heading is the first `**...**` span that opens and closes on the
    /// same line. Returns `None` when there is none; such thoughts are not
    /// displayed.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut from = 0;
        while let Some(offset) = raw[from..].find("**") {
            let start = from + offset;
            let after = &raw[start + 2..];
            let line = after.split('\n').next().unwrap_or_default();
            if let Some(len) = line.find("**") {
                let mut body = String::with_capacity(raw.len());
                body.push_str(&raw[..start]);
                body.push_str(&after[len + 2..]);

                return Some(Self {
                    heading: after[..len].to_string(),
                    body: body.trim().to_string(),
                });
            }
            from = start + 1;
        }
        None
    }
}

/// Everything the persistence store knows about the current checklist.
///
/// Absent fields were never written (or were deleted).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    pub image: Option<String>,
    pub todo_list: Option<Vec<ChecklistItem>>,
    pub sort_preference: Option<bool>,
}

impl CacheRecord {
    /// An image with no recorded list: a previous extraction was interrupted
    /// after the image was cached but before its list was written.
    pub fn is_mismatched(&self) -> bool {
        self.image.is_some() && self.todo_list.is_none()
    }
}

/// Body of an extraction request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRequest {
    #[serde(rename = "base64Image", default)]
    pub base64_image: String,
}

/// One element of the final answer array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSegment {
    pub text: String,
}

/// Error body returned by the backend with a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_field() {
        let json = serde_json::to_string(&ExtractRequest {
            base64_image: "AAAA".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"base64Image":"AAAA"}"#);

        let missing: ExtractRequest = serde_json::from_str("{}").unwrap();
        assert!(missing.base64_image.is_empty());
    }

    #[test]
    fn segments_get_sequential_indices() {
        let items = items_from_segments(["Milk", "Eggs", "Bread"]);
        assert_eq!(items.len(), 3);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.index, i);
            assert!(!item.completed);
        }
        assert_eq!(items[2].text, "Bread");
    }

    #[test]
    fn segments_empty() {
        let items = items_from_segments(Vec::<String>::new());
        assert!(items.is_empty());
    }

    #[test]
    fn thought_heading_and_body() {
        let t = ThoughtEvent::parse("**Step**: looking").unwrap();
        assert_eq!(t.heading, "Step");
        assert_eq!(t.body, ": looking");
    }

    #[test]
    fn thought_heading_mid_text() {
        let t = ThoughtEvent::parse("Now **Reading lines** of the note\n").unwrap();
        assert_eq!(t.heading, "Reading lines");
        assert_eq!(t.body, "Now  of the note");
    }

    #[test]
    fn thought_without_marker() {
        assert!(ThoughtEvent::parse("plain text").is_none());
        assert!(ThoughtEvent::parse("**unterminated").is_none());
    }

    #[test]
    fn thought_heading_stays_on_one_line() {
        assert!(ThoughtEvent::parse("**a\nb** c").is_none());

        let t = ThoughtEvent::parse("**draft\n**Reading items** next").unwrap();
        assert_eq!(t.heading, "Reading items");
        assert_eq!(t.body, "**draft\n next");
    }

    #[test]
    fn thought_only_first_marker_is_heading() {
        let t = ThoughtEvent::parse("**One** then **Two**").unwrap();
        assert_eq!(t.heading, "One");
        assert_eq!(t.body, "then **Two**");
    }

    #[test]
    fn item_deserializes_without_completed() {
        let item: ChecklistItem = serde_json::from_str(r#"{"index":3,"text":"Call mom"}"#).unwrap();
        assert_eq!(item, ChecklistItem::new(3, "Call mom"));
    }

    #[test]
    fn mismatched_record() {
        let mut record = CacheRecord {
            image: Some("data:image/png;base64,AAAA".into()),
            ..Default::default()
        };
        assert!(record.is_mismatched());
        record.todo_list = Some(Vec::new());
        assert!(!record.is_mismatched());
        record.image = None;
        assert!(!record.is_mismatched());
    }
}
