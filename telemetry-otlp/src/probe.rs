use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info};

/// Best-effort reachability check against a collector endpoint.
///
/// Issues a single empty POST with a short timeout and expects HTTP 200.
/// Any other status or network error yields `false`. This is called exactly
/// once at manager setup: if connectivity recovers later the remote sink
/// stays disabled until the next full manager restart. Known limitation,
/// traded for never probing on the export path.
pub fn probe_connectivity(endpoint: &str, timeout: Duration) -> bool {
    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            debug!(error = %err, "cannot build probe http client");
            return false;
        }
    };
    match client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{}")
        .send()
    {
        Ok(response) if response.status() == StatusCode::OK => true,
        Ok(response) => {
            info!(
                endpoint,
                status = response.status().as_u16(),
                "collector connectivity probe rejected"
            );
            false
        }
        Err(err) => {
            info!(endpoint, error = %err, "collector connectivity probe failed");
            false
        }
    }
}
