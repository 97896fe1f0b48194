//! URI parsing for upload targets

use crate::error::{Error, Result};
use url::Url;

/// Split an `s3://bucket[/prefix]` URI into bucket and key prefix
///
/// The prefix has leading and trailing `/` removed and may be empty.
pub fn parse_s3_target(s: &str) -> Result<(String, String)> {
    let invalid = |reason: String| Error::InvalidUri {
        uri: s.to_string(),
        reason,
    };

    let url = Url::parse(s).map_err(|e| invalid(e.to_string()))?;

    if url.scheme() != "s3" {
        return Err(invalid(format!(
            "unsupported scheme '{}', expected 's3'",
            url.scheme()
        )));
    }

    let bucket = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing bucket name".to_string()))?
        .to_string();

    let prefix = url.path().trim_matches('/').to_string();

    Ok((bucket, prefix))
}
