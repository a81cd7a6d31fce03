//! Code-directory retrieval conventions.
//!
//! The upload side (out of scope here) stages each transferred file
//! under a zero-padded numeric code directory:
//!
//! ```text
//! <root>/00042/
//!     report.pdf      the content file (first name not starting '.')
//!     .meta           free-form key/value lines
//!     .headers        HTTP headers as "Key: Value" lines
//! ```
//!
//! [`Retriever`] walks those conventions over the protocol: find the
//! content file, collect its delivery headers (defaulting the content
//! type, synthesizing a disposition, backfilling the length from a
//! stat), and hand back what a front-end needs to stream the file.

use std::{collections::BTreeMap, ffi::OsString, os::unix::ffi::OsStrExt};

use airlock_core::Link;

use crate::{
    client::{Client, Listing},
    error::ClientError,
};

/// Width codes are zero-padded to.
pub const CODE_WIDTH: usize = 5;

/// Headers file name inside a code directory.
const HEADERS_FILE: &str = ".headers";

/// Content type used when `.headers` doesn't name one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Everything needed to deliver one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Full relay path of the content file; stream it with
    /// [`Client::file_chunks`] or fetch it with [`Client::get_file`].
    pub path: Vec<u8>,
    /// Content file's base name.
    pub filename: OsString,
    /// Delivery headers: whatever `.headers` held, plus a default
    /// `Content-Type`, a `Content-Disposition`, and a `Content-Length`
    /// backfilled from a stat when absent.
    pub headers: BTreeMap<String, String>,
}

/// Retrieval walk over a client connection.
pub struct Retriever<'c, L: Link> {
    client: &'c mut Client<L>,
    root: Vec<u8>,
}

impl<'c, L: Link> Retriever<'c, L> {
    /// Walk code directories under `root` (e.g. `/xfer-data`).
    pub fn new(client: &'c mut Client<L>, root: impl AsRef<[u8]>) -> Self {
        let mut root = root.as_ref().to_vec();
        while root.ends_with(b"/") {
            root.pop();
        }
        Self { client, root }
    }

    /// Zero-pad an all-numeric code to [`CODE_WIDTH`]; anything else
    /// passes through untouched.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) {
            format!("{:0>width$}", code, width = CODE_WIDTH)
        } else {
            code.to_string()
        }
    }

    fn code_dir(&self, code: &str) -> Vec<u8> {
        let mut dir = self.root.clone();
        dir.push(b'/');
        dir.extend_from_slice(code.as_bytes());
        dir
    }

    /// Locate the content file for a code: the first directory entry
    /// whose name does not start with a period.
    ///
    /// `Ok(None)` when the code directory is missing or holds nothing
    /// deliverable.
    ///
    /// # Errors
    ///
    /// Transport and protocol failures; an unknown code is an outcome.
    pub async fn content_file(&mut self, code: &str) -> Result<Option<Delivery>, ClientError> {
        let code = Self::normalize_code(code);
        let dir = self.code_dir(&code);

        let entries = match self.client.list(&dir).await {
            Ok(Listing::Entries(entries)) => entries,
            Ok(Listing::File) => return Ok(None),
            Err(ClientError::Rejected) => return Ok(None),
            Err(other) => return Err(other),
        };

        let Some(filename) = entries
            .into_iter()
            .find(|name| !name.as_bytes().starts_with(b"."))
        else {
            return Ok(None);
        };

        let mut path = dir;
        path.push(b'/');
        path.extend_from_slice(filename.as_bytes());

        Ok(Some(Delivery { path, filename, headers: BTreeMap::new() }))
    }

    /// Delivery headers for a code: the parsed `.headers` file over a
    /// `Content-Type` default. A missing or rejected `.headers` yields
    /// just the default.
    ///
    /// # Errors
    ///
    /// Transport and protocol failures.
    pub async fn headers(&mut self, code: &str) -> Result<BTreeMap<String, String>, ClientError> {
        let code = Self::normalize_code(code);
        let mut path = self.code_dir(&code);
        path.push(b'/');
        path.extend_from_slice(HEADERS_FILE.as_bytes());

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string());

        match self.client.get_file(&path).await {
            Ok(content) => {
                parse_header_lines(&content, &mut headers);
                Ok(headers)
            },
            Err(ClientError::Rejected) => Ok(headers),
            Err(other) => Err(other),
        }
    }

    /// Full retrieval walk: locate the content file, collect headers,
    /// synthesize `Content-Disposition`, and backfill
    /// `Content-Length` from a stat when `.headers` left it out.
    ///
    /// `Ok(None)` when the code has nothing to deliver ("code not
    /// found" territory for the front-end).
    ///
    /// # Errors
    ///
    /// Transport and protocol failures.
    pub async fn prepare(&mut self, code: &str) -> Result<Option<Delivery>, ClientError> {
        let Some(mut delivery) = self.content_file(code).await? else {
            return Ok(None);
        };

        delivery.headers = self.headers(code).await?;

        delivery.headers.insert(
            "Content-Disposition".to_string(),
            format!(
                "inline; filename=\"{}\"",
                delivery.filename.to_string_lossy()
            ),
        );

        if !delivery.headers.contains_key("Content-Length") {
            if let Ok(record) = self.client.stat(&delivery.path).await {
                delivery
                    .headers
                    .insert("Content-Length".to_string(), record.size().to_string());
            }
        }

        Ok(Some(delivery))
    }
}

/// Fold `Key: Value` lines into `headers`, last occurrence winning.
/// Lines without a colon are ignored.
fn parse_header_lines(content: &[u8], headers: &mut BTreeMap<String, String>) {
    let text = String::from_utf8_lossy(content);

    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            tracing::debug!(line, "ignoring header line without a colon");
            continue;
        };
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_zero_pad() {
        assert_eq!(Retriever::<airlock_core::LoopbackLink>::normalize_code("42"), "00042");
        assert_eq!(Retriever::<airlock_core::LoopbackLink>::normalize_code("123456"), "123456");
    }

    #[test]
    fn non_numeric_codes_pass_through() {
        assert_eq!(Retriever::<airlock_core::LoopbackLink>::normalize_code("ab12"), "ab12");
        assert_eq!(Retriever::<airlock_core::LoopbackLink>::normalize_code(""), "");
    }

    #[test]
    fn header_lines_parse_and_trim() {
        let mut headers = BTreeMap::new();
        parse_header_lines(
            b"Content-Type: text/plain\nX-Custom:  spaced  \nbogus line\n",
            &mut headers,
        );

        assert_eq!(headers.get("Content-Type").map(String::as_str), Some("text/plain"));
        assert_eq!(headers.get("X-Custom").map(String::as_str), Some("spaced"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn header_values_may_contain_colons() {
        let mut headers = BTreeMap::new();
        parse_header_lines(b"X-Url: https://example.test/a\n", &mut headers);
        assert_eq!(
            headers.get("X-Url").map(String::as_str),
            Some("https://example.test/a")
        );
    }
}
