use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use log::{debug, trace};
use reqwest::header::HeaderMap;
use tokio::io::AsyncWriteExt;

use crate::catalog::ChapterNumber;
use crate::error::DownloadError;
use crate::session::{HttpSession, RenderSession, js_string};

/// Fetches `url` from inside the page and resolves to a `data:` URL, or to
/// `null` when the request itself fails.
fn fetch_as_data_url(url: &str) -> String {
    format!(
        r#"(async () => {{
    try {{
        const response = await fetch({});
        const blob = await response.blob();
        return await new Promise((resolve) => {{
            const reader = new FileReader();
            reader.onload = () => resolve(reader.result);
            reader.onerror = () => resolve(null);
            reader.readAsDataURL(blob);
        }});
    }} catch (e) {{
        return null;
    }}
}})()"#,
        js_string(url)
    )
}

/// Streams `url` into `path`. A partially written file is removed on error.
pub async fn download_image(
    http: &HttpSession,
    url: &str,
    path: &Path,
    headers: HeaderMap,
) -> Result<u64, DownloadError> {
    let response = http.get(url, headers).await?;
    let mut file = tokio::fs::File::create(path).await?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let result = match chunk {
            Ok(bytes) => file.write_all(&bytes).await.map(|_| bytes.len() as u64).map_err(DownloadError::from),
            Err(e) => Err(DownloadError::from(e)),
        };
        match result {
            Ok(n) => written += n,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(path).await;
                return Err(e);
            }
        }
    }
    file.flush().await?;

    trace!("{} -> {} ({} bytes)", url, path.display(), written);
    Ok(written)
}

/// Splits a `data:` URL and decodes its base64 body.
///
/// Anything whose declared media type is not an image (an XML error page
/// served in place of the image, say) is rejected with `NotAnImage`.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, DownloadError> {
    let (header, encoded) = data_url
        .split_once(',')
        .ok_or_else(|| DownloadError::NotAnImage(String::from("payload is not a data URL")))?;
    if !header.starts_with("data:image") {
        return Err(DownloadError::NotAnImage(header.to_string()));
    }
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Script-driven fetch through the rendering session.
///
/// `Ok(None)` when the page could not fetch the URL at all.
pub async fn fetch_via_session(
    session: &dyn RenderSession,
    url: &str,
    timeout: Duration,
) -> Result<Option<Vec<u8>>, DownloadError> {
    let value = tokio::time::timeout(timeout, session.evaluate(&fetch_as_data_url(url)))
        .await
        .map_err(|_| DownloadError::Timeout(format!("script fetch of {}", url)))??;
    match value.as_str() {
        Some(data_url) => decode_data_url(data_url).map(Some),
        None => {
            debug!("script fetch of {} returned {}", url, value);
            Ok(None)
        }
    }
}

/// Script-driven fetch of `url`, written to `path` only when it decodes to an image.
pub async fn download_image_via_session(
    session: &dyn RenderSession,
    url: &str,
    path: &Path,
    timeout: Duration,
) -> Result<u64, DownloadError> {
    let bytes = fetch_via_session(session, url, timeout)
        .await?
        .ok_or_else(|| DownloadError::BrowserError(format!("the page could not fetch {}", url)))?;
    tokio::fs::write(path, &bytes).await?;
    Ok(bytes.len() as u64)
}

/// `<work_dir>/Chapter NN[.F]`
pub fn build_chapter_path(work_dir: &Path, number: ChapterNumber) -> PathBuf {
    work_dir.join(number.folder_name())
}

/// Ensures a directory exists, creating it if necessary
pub fn ensure_dir_exists(path: &Path) -> Result<(), DownloadError> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Makes a work title safe to use as a folder name on every platform.
///
/// Drops the characters Windows forbids in file names, trims whitespace and
/// dots at the edges, and guards against reserved device names.
pub fn sanitize_filename(input: &str) -> String {
    let mut result: String = input
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    result = result.trim().trim_end_matches('.').trim().to_string();

    let reserved_names = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1",
        "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if reserved_names.iter().any(|&name| result.eq_ignore_ascii_case(name)) {
        result = format!("_{}", result);
    }

    // Some filesystems cap names at 255 bytes
    if result.len() > 255 {
        let mut cut = 255;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let bytes = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_rejects_non_image_payload() {
        let result = decode_data_url("data:application/xml;base64,PEVycm9yLz4=");
        assert!(matches!(result, Err(DownloadError::NotAnImage(header)) if header == "data:application/xml;base64"));
    }

    #[test]
    fn test_fetch_script_quotes_url() {
        let script = fetch_as_data_url("https://x.org/a'b\".jpg");
        assert!(script.contains(r#"fetch("https://x.org/a'b\".jpg")"#));
    }
}
