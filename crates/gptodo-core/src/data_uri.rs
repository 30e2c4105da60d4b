//! Helpers for `data:` URIs holding base64 image payloads.

/// Prefix applied to bare base64 payloads before they are cached.
pub const DEFAULT_IMAGE_PREFIX: &str = "data:image/png;base64,";

/// Return the base64 payload of a data URI: everything after the first `,`.
///
/// Returns `None` when there is no comma or the payload is empty.
pub fn payload(data_uri: &str) -> Option<&str> {
    let (_, rest) = data_uri.split_once(',')?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Normalize cached image data to a data URI.
pub fn ensure_data_uri(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("{}{}", DEFAULT_IMAGE_PREFIX, image)
    }
}

/// Build a data URI from a MIME type and an already encoded payload.
pub fn build(mime_type: &str, base64_payload: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_after_comma() {
        assert_eq!(payload("data:image/jpeg;base64,/9j/4AAQ"), Some("/9j/4AAQ"));
    }

    #[test]
    fn payload_missing() {
        assert_eq!(payload("data:image/jpeg;base64,"), None);
        assert_eq!(payload("no comma here"), None);
    }

    #[test]
    fn bare_payload_gets_prefix() {
        assert_eq!(ensure_data_uri("iVBOR"), "data:image/png;base64,iVBOR");
        assert_eq!(
            ensure_data_uri("data:image/webp;base64,UklGR"),
            "data:image/webp;base64,UklGR"
        );
    }
}
