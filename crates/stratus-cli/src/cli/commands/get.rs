//! `stratus get` – download a blob.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use stratus_core::command::rewind_writer;
use stratus_core::request::{append_server_timeout, Method, StorageRequest};
use stratus_core::{BodyTarget, StorageCommand, StorageUri};

use crate::cli::session::Session;

pub async fn run_get(session: &Session, path: &str, out: Option<&Path>) -> Result<()> {
    let uri = session.resource(path)?;
    match out {
        Some(out) => {
            let file = File::create(out).with_context(|| format!("create {}", out.display()))?;
            let sink = file.try_clone()?;
            let mut cmd = get_command::<u64>(uri, session)
                .with_body_target(BodyTarget::Writer(Box::new(sink)))
                .with_recovery_action(rewind_writer(0))
                .with_post_process(|_, _, content, _| Ok(content.length));
            let written = session.execute(&format!("get {}", path), &mut cmd).await?;
            // A failed attempt may have written past what the final one did.
            file.set_len(written)
                .with_context(|| format!("truncate {}", out.display()))?;
            println!("{} bytes -> {}", written, out.display());
        }
        None => {
            let mut cmd = get_command::<Vec<u8>>(uri, session)
                .with_body_target(BodyTarget::Buffer)
                .with_post_process(|_, _, content, _| Ok(content.data.unwrap_or_default()));
            let data = session.execute(&format!("get {}", path), &mut cmd).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn get_command<T: 'static>(uri: StorageUri, session: &Session) -> StorageCommand<T> {
    StorageCommand::new(uri, |url, timeout, _, _| {
        let mut url = url.clone();
        append_server_timeout(&mut url, timeout);
        Ok(StorageRequest::new(Method::Get, url))
    })
    .with_credentials(session.credentials())
}
