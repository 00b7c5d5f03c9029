//! AS-name directory scraped from the CIDR report's autnums listing.
//!
//! Each entry in the document is one line of the form
//! `<a href="/cgi-bin/as-report?as=AS701&view=2.0">AS701  </a> VERIZON-ASN, US`.

use crate::error::{AppError, Result};
use crate::fetcher::Downloader;
use crate::fsutil::write_atomic;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// AS number (as printed in the listing) to organization name.
pub type AsNameDirectory = BTreeMap<String, String>;

/**
 * Extract `(as_number, name)` from one listing line, or None when the line
 * is not an AS anchor.
 */
pub fn match_asname_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("<a ")?;
    let close = rest.find("</a>")?;
    let anchor = &rest[..close];

    // The attributes need at least one character before the closing '>'
    let open = anchor.rfind(">AS").filter(|&idx| idx > 0)?;
    let number = anchor[open + 3..].trim_end();
    if number.is_empty() {
        return None;
    }

    let name = rest[close + 4..].trim();
    Some((number.to_string(), name.to_string()))
}

/// Build the directory from the whole document; non-matching lines are skipped.
pub fn html_to_directory(html: &str) -> AsNameDirectory {
    html.lines()
        .filter(|line| line.starts_with("<a"))
        .filter_map(match_asname_line)
        .collect()
}

// The listing is served as ISO-8859-1, where every byte is its own code point
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/**
 * Re-downloads the listing and rewrites the directory on every run
 */
#[derive(Debug, Clone)]
pub struct AsNameDirectoryBuilder {
    downloader: Downloader,
    url: String,
    output: PathBuf,
}

impl AsNameDirectoryBuilder {
    pub fn new(downloader: Downloader, url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            url: url.into(),
            output: output.into(),
        }
    }

    pub async fn build(&self) -> Result<AsNameDirectory> {
        let raw = self.downloader.fetch_bytes(&self.url).await?;
        let html = decode_latin1(&raw);
        debug!("AS-name listing decoded ({} characters)", html.len());

        let directory = html_to_directory(&html);
        let json = serde_json::to_vec(&directory).map_err(|e| AppError::Persist {
            path: self.output.clone(),
            source: e.into(),
        })?;
        write_atomic(&self.output, &json).await?;

        info!(
            "AS-name directory written to {} ({} entries)",
            self.output.display(),
            directory.len()
        );
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_match_line() {
        let line = r#"<a href="/cgi-bin/as-report?as=AS701&view=2.0">AS701 </a> VERIZON-ASN"#;
        assert_eq!(
            match_asname_line(line),
            Some(("701".to_string(), "VERIZON-ASN".to_string()))
        );
    }

    #[test]
    fn test_match_line_keeps_full_name() {
        let line = r#"<a href="/cgi-bin/as-report?as=AS1&view=2.0">AS1    </a> LVLT-1 - Level 3 Parent, LLC, US"#;
        let (number, name) = match_asname_line(line).unwrap();
        assert_eq!(number, "1");
        assert_eq!(name, "LVLT-1 - Level 3 Parent, LLC, US");
    }

    #[test]
    fn test_match_line_rejects_other_markup() {
        assert_eq!(match_asname_line("<a name=\"top\"></a>"), None);
        assert_eq!(match_asname_line("<a>AS42</a> NO-ATTRS"), None);
        assert_eq!(match_asname_line("<a href=\"x\">AS</a> EMPTY"), None);
        assert_eq!(match_asname_line("<pre>"), None);
        assert_eq!(match_asname_line(" <a href=\"x\">AS1</a> INDENTED"), None);
    }

    #[test]
    fn test_html_to_directory() {
        let html = "<html><body><pre>\n\
            <a href=\"/cgi-bin/as-report?as=AS701&view=2.0\">AS701 </a> VERIZON-ASN\n\
            <a name=\"bottom\"></a>\n\
            <a href=\"/cgi-bin/as-report?as=AS15169&view=2.0\">AS15169</a> GOOGLE, US\r\n\
            </pre></body></html>\n";

        let directory = html_to_directory(html);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory["701"], "VERIZON-ASN");
        assert_eq!(directory["15169"], "GOOGLE, US");
    }

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_latin1(b"Telef\xf3nica"), "Telefónica");
    }

    #[tokio::test]
    async fn test_build_rewrites_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("autnums.html");
        let output = dir.path().join("resources").join("as_names.json");
        std::fs::write(
            &source,
            b"<a href=\"/cgi-bin/as-report?as=AS3352&view=2.0\">AS3352 </a> TELEFONICA-DATA-ESPANA Telef\xf3nica\n",
        )
        .unwrap();
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, r#"{"1":"STALE"}"#).unwrap();

        let builder = AsNameDirectoryBuilder::new(
            Downloader::new(Duration::from_secs(5)).unwrap(),
            format!("file://{}", source.display()),
            &output,
        );
        builder.build().await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"3352": "TELEFONICA-DATA-ESPANA Telefónica"})
        );
    }
}
