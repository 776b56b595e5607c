use std::future::Future;

/// Runs `op` up to `limit` times back to back, returning the first success or
/// the last error.
// TODO: add exponential backoff with jitter between attempts.
pub async fn exec_retry<T, E, F, Fut>(limit: usize, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= limit => return Err(err),
            Err(_) => attempt += 1,
        }
    }
}
