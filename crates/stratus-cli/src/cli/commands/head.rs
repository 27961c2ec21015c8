//! `stratus head` – blob properties, or "not found".

use anyhow::Result;
use stratus_core::request::{append_server_timeout, Method, StorageRequest};
use stratus_core::response::{headers, ResponseHead};
use stratus_core::StorageCommand;

use crate::cli::session::Session;

/// What a HEAD request tells us about a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Properties {
    pub content_length: Option<u64>,
    pub etag: Option<String>,
    pub content_md5: Option<String>,
    pub last_modified: Option<String>,
}

impl Properties {
    pub(crate) fn from_head(head: &ResponseHead) -> Self {
        Self {
            content_length: head.headers.content_length(),
            etag: head.headers.get(headers::ETAG).map(str::to_string),
            content_md5: head.headers.get(headers::CONTENT_MD5).map(str::to_string),
            last_modified: head.headers.get("last-modified").map(str::to_string),
        }
    }
}

pub async fn run_head(session: &Session, path: &str) -> Result<()> {
    let uri = session.resource(path)?;
    let mut cmd: StorageCommand<Option<Properties>> =
        StorageCommand::new(uri, |url, timeout, _, _| {
            let mut url = url.clone();
            append_server_timeout(&mut url, timeout);
            Ok(StorageRequest::new(Method::Head, url))
        })
        .with_credentials(session.credentials())
        .with_pre_process(|head, pending, _| match pending {
            // A retryable 404 (secondary not yet replicated) still goes to the policy.
            Some(err) if head.status == 404 && !err.is_retryable() => Ok(Some(None)),
            Some(err) => Err(err.clone()),
            None => Ok(None),
        })
        .with_post_process(|partial, head, _, _| {
            Ok(partial.unwrap_or_else(|| Some(Properties::from_head(head))))
        });

    match session.execute(&format!("head {}", path), &mut cmd).await? {
        Some(props) => {
            let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
            println!("content-length: {}", show(props.content_length.map(|n| n.to_string())));
            println!("etag:           {}", show(props.etag));
            println!("content-md5:    {}", show(props.content_md5));
            println!("last-modified:  {}", show(props.last_modified));
        }
        None => println!("{}: not found", path),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::response::ResponseHeaders;

    #[test]
    fn properties_from_head() {
        let head = ResponseHead {
            status: 200,
            reason: "OK".into(),
            headers: ResponseHeaders::from_pairs([
                ("Content-Length", "42"),
                ("ETag", "\"0x8D\""),
                ("Last-Modified", "Wed, 14 Oct 2026 10:00:00 GMT"),
            ]),
        };
        let props = Properties::from_head(&head);
        assert_eq!(props.content_length, Some(42));
        assert_eq!(props.etag.as_deref(), Some("\"0x8D\""));
        assert!(props.content_md5.is_none());
        assert_eq!(
            props.last_modified.as_deref(),
            Some("Wed, 14 Oct 2026 10:00:00 GMT")
        );
    }
}
