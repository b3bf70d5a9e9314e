//! Query-string assembly for request URLs.

use url::Url;

use crate::error::ClientError;

/// Replace the query of `base` with `params`, form-urlencoded.
///
/// Pairs are written in the iteration order of `params`. Passing a
/// `HashMap` therefore yields a query whose order changes between runs;
/// pass a slice or a `BTreeMap` when the exact string matters.
pub fn build_url<I, K, V>(base: &str, params: I) -> Result<String, ClientError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = Url::parse(base).map_err(|source| ClientError::InvalidUrl {
        url: base.to_string(),
        source,
    })?;

    url.set_query(None);
    let mut params = params.into_iter().peekable();
    if params.peek().is_some() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url.into())
}
