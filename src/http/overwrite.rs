//! Local overwrite folder.
//!
//! A `GET` for `/a/b.js` is answered from `<folder>/a/b.js` when that file
//! exists. Anything else (missing files, directories, names the filesystem
//! rejects, paths with `..`) falls through to proxying.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;

use crate::error::ProxyError;

/// Serve `uri_path` from `folder` if a regular file is there.
///
/// `Ok(None)` means the request should be proxied.
pub async fn lookup(folder: &Path, method: &Method, uri_path: &str) -> Result<Option<Response>, ProxyError> {
    if *method != Method::GET {
        return Ok(None);
    }

    let Some(path) = resolve(folder, uri_path) else {
        return Ok(None);
    };

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if falls_through(&e) => return Ok(None),
        Err(source) => return Err(overwrite_error(&path, source)),
    };
    if !metadata.is_file() {
        return Ok(None);
    }

    let content = tokio::fs::read(&path)
        .await
        .map_err(|source| overwrite_error(&path, source))?;
    let mime_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();

    tracing::debug!(path = %path.display(), bytes = content.len(), "Serving overwrite file");

    let length = content.len();
    let mut response = Response::new(Body::from(content));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime_type).map_err(|_| ProxyError::InvalidHeader {
            name: "content-type",
            value: mime_type.clone(),
        })?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    Ok(Some(response))
}

/// Map a request path onto the folder. `None` when the path is not
/// representable or would leave the folder.
fn resolve(folder: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(uri_path).ok()?;
    let mut path = folder.to_path_buf();

    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

fn falls_through(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::InvalidFilename
    )
}

fn overwrite_error(path: &Path, source: std::io::Error) -> ProxyError {
    ProxyError::Overwrite {
        path: path.display().to_string(),
        source,
    }
}
