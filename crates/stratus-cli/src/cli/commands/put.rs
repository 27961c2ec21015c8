//! `stratus put` – upload a file to the primary endpoint.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use stratus_core::error::ErrorKind;
use stratus_core::location::CommandLocationMode;
use stratus_core::request::{append_server_timeout, Method, RequestBody, StorageRequest};
use stratus_core::response::headers;
use stratus_core::{StorageCommand, StorageError};

use crate::cli::session::Session;

pub async fn run_put(session: &Session, path: &str, file: &Path) -> Result<()> {
    let len = std::fs::metadata(file)
        .with_context(|| format!("stat {}", file.display()))?
        .len();
    let uri = session.resource(path)?;
    let source = file.to_path_buf();
    let mut cmd: StorageCommand<Option<String>> =
        StorageCommand::new(uri, |url, timeout, body, _| {
            let mut url = url.clone();
            append_server_timeout(&mut url, timeout);
            let mut request = StorageRequest::new(Method::Put, url).with_body(body);
            request.set_header("x-ms-blob-type", "BlockBlob");
            Ok(request)
        })
        .with_credentials(session.credentials())
        .with_command_location_mode(CommandLocationMode::PrimaryOnly)
        // A reader body is consumed by one send; reopen the file for every attempt.
        .with_content(move |_| {
            let f = File::open(&source).map_err(|e| {
                StorageError::new(ErrorKind::Io, format!("open {}", source.display()), false)
                    .with_source(e)
            })?;
            Ok(Some(RequestBody::from_reader(f, Some(len))))
        })
        .with_post_process(|_, head, _, _| Ok(head.headers.get(headers::ETAG).map(str::to_string)));

    let etag = session.execute(&format!("put {}", path), &mut cmd).await?;
    println!(
        "{} bytes -> {} (etag {})",
        len,
        path,
        etag.as_deref().unwrap_or("-")
    );
    Ok(())
}
