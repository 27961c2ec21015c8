//! Request credentials.
//!
//! The engine applies credentials on every attempt: `transform_uri` to the
//! endpoint before the request is built, `sign_request` after all headers are
//! in place. Shared-key signing lives outside this crate; anything that can
//! sign an HTTP request can implement the trait.

use std::collections::HashSet;
use std::fmt;
use url::Url;

use crate::context::OperationContext;
use crate::error::StorageError;
use crate::request::StorageRequest;

pub trait Credentials: Send + Sync + fmt::Debug {
    fn transform_uri(&self, uri: &Url) -> Url {
        uri.clone()
    }

    fn sign_request(
        &self,
        _request: &mut StorageRequest,
        _ctx: &OperationContext,
    ) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Public access; requests go out unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Credentials for Anonymous {}

/// Shared access signature appended to the query of every request.
#[derive(Clone)]
pub struct SasCredentials {
    pairs: Vec<(String, String)>,
}

impl SasCredentials {
    /// Accepts the token with or without its leading `?`.
    pub fn new(token: &str) -> Result<Self, StorageError> {
        let token = token.trim().trim_start_matches('?');
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(token.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() || !pairs.iter().any(|(k, _)| k == "sig") {
            return Err(StorageError::pre_flight("SAS token has no signature (sig)"));
        }
        Ok(Self { pairs })
    }
}

impl Credentials for SasCredentials {
    /// Parameters already on the URI win over the token's.
    fn transform_uri(&self, uri: &Url) -> Url {
        let existing: HashSet<String> = uri.query_pairs().map(|(k, _)| k.into_owned()).collect();
        let mut out = uri.clone();
        {
            let mut q = out.query_pairs_mut();
            for (k, v) in &self.pairs {
                if !existing.contains(k) {
                    q.append_pair(k, v);
                }
            }
        }
        out
    }
}

impl fmt::Debug for SasCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.pairs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("SasCredentials").field("keys", &keys).finish()
    }
}
