//! Artifact downloads
//!
//! `GET /download/<relative path>` serves one stem file from the output
//! root. `GET /download/<task_id>/<stem>` serves a stem of a completed task
//! by id. `GET /download/<task_id>/all` streams a zip of every stem of a
//! completed task; the archive is a temp file deleted once the response
//! body is finished or dropped.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::services::ArchiveFile;
use crate::AppState;

/// Path suffix requesting the bulk archive of a task
const ARCHIVE_SUFFIX: &str = "all";

/// What a download path refers to
#[derive(Debug, PartialEq)]
enum DownloadTarget<'a> {
    /// `<task_id>/all`
    Archive(Uuid),
    /// `<task_id>/<stem>`
    TaskStem(Uuid, &'a str),
    /// Path relative to the output root
    File(&'a str),
}

fn classify(path: &str) -> DownloadTarget<'_> {
    let mut segments = path.trim_matches('/').split('/');
    let (Some(first), Some(second), None) = (segments.next(), segments.next(), segments.next())
    else {
        return DownloadTarget::File(path);
    };

    match Uuid::parse_str(first) {
        Ok(task_id) if second == ARCHIVE_SUFFIX => DownloadTarget::Archive(task_id),
        Ok(task_id) => DownloadTarget::TaskStem(task_id, second),
        Err(_) => DownloadTarget::File(path),
    }
}

/// GET /download/*path
pub async fn download(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let file = match classify(&path) {
        DownloadTarget::Archive(task_id) => return download_archive(&state, task_id).await,
        DownloadTarget::TaskStem(task_id, stem) => {
            match state.artifacts.resolve_task_stem(task_id, stem).await {
                Ok(file) => file,
                // A canonical name can itself look like a task id
                Err(moonarch_common::Error::NotFound(_)) => state.artifacts.resolve(&path).await?,
                Err(e) => return Err(e.into()),
            }
        }
        DownloadTarget::File(relative) => state.artifacts.resolve(relative).await?,
    };
    tracing::debug!(requested = %path, file = %file.display(), "Serving artifact");

    let response = match ServeFile::new(&file).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new))
}

async fn download_archive(state: &AppState, task_id: Uuid) -> ApiResult<Response> {
    let ArchiveFile {
        file_name,
        size,
        path,
    } = state.artifacts.archive(task_id).await?;

    let file = tokio::fs::File::open(&path).await?;

    // The stream owns the temp path, so the archive outlives the handler and
    // is deleted when the body is done with it
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _archive = &path;
        chunk
    });

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
        (header::CONTENT_LENGTH, size.to_string()),
    ];

    Ok((headers, Body::from_stream(stream)).into_response())
}

/// Build download routes
pub fn download_routes() -> Router<AppState> {
    Router::new().route("/download/*path", get(download))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let id = Uuid::new_v4();
        let archive = format!("{}/all", id);
        let stem = format!("{}/vocals.wav", id);
        let slashed = format!("/{}/all/", id);
        let extra = format!("{}/all/extra", id);

        assert_eq!(classify(&archive), DownloadTarget::Archive(id));
        assert_eq!(classify(&slashed), DownloadTarget::Archive(id));
        assert_eq!(classify(&stem), DownloadTarget::TaskStem(id, "vocals.wav"));
        assert_eq!(classify("song/all"), DownloadTarget::File("song/all"));
        assert_eq!(classify("song/vocals.wav"), DownloadTarget::File("song/vocals.wav"));
        assert_eq!(classify(&extra), DownloadTarget::File(&extra));
    }
}
