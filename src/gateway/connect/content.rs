use crate::error::Error;

/// The four content-type families the Connect gateway understands. `Proto`
/// is the default when a client doesn't specify one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Proto,
}

impl ContentKind {
    pub fn mime(self) -> &'static str {
        match self {
            ContentKind::Json => "application/json",
            ContentKind::Proto => "application/proto",
        }
    }
}

/// Parse a `Content-Type` header, ignoring parameters like `charset`. An
/// empty header is only valid for an empty body and is treated as `Proto`
/// by the caller.
pub fn parse_content_type(raw: &str) -> Result<ContentKind, Error> {
    let mime: mime::Mime = raw.parse().map_err(|_| Error::UnsupportedMedia(raw.to_string()))?;
    match (mime.type_(), mime.subtype().as_str(), mime.suffix()) {
        (mime::APPLICATION, "json", _) => Ok(ContentKind::Json),
        (mime::APPLICATION, _, Some(mime::JSON)) => Ok(ContentKind::Json),
        (mime::APPLICATION, "proto", _) | (mime::APPLICATION, "x-protobuf", _) => Ok(ContentKind::Proto),
        _ => Err(Error::UnsupportedMedia(format!("{}/{}", mime.type_(), mime.subtype()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_all_four_families() {
        assert_eq!(parse_content_type("application/json").unwrap(), ContentKind::Json);
        assert_eq!(
            parse_content_type("application/connect+json; charset=utf-8").unwrap(),
            ContentKind::Json
        );
        assert_eq!(parse_content_type("application/proto").unwrap(), ContentKind::Proto);
        assert_eq!(parse_content_type("application/x-protobuf").unwrap(), ContentKind::Proto);
    }

    #[test]
    fn rejects_unknown_media_types() {
        assert!(parse_content_type("text/plain").is_err());
    }
}
