//! Development binary that runs the refresh scheduler against log-only
//! collaborators until interrupted.

use std::io;

use refresh_scheduler::application;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = application::run().await {
        eprintln!("[scheduler] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
