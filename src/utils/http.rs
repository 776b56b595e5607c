use reqwest::Response;

/// Largest response body kept from a remote endpoint.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Reads at most `limit` bytes of the body. The flag is `true` when the body
/// was longer and got cut off; the rest is never read.
pub async fn read_capped(mut resp: Response, limit: usize) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}
