//! Worker side of the process boundary

use crate::channel::{handle_request, ParseRequest, ParseResponse};
use std::io::{BufRead, Write};

/// Answers newline-delimited parse requests until the input closes
///
/// Returns the number of requests answered. Undecodable requests receive a
/// failure response rather than ending the loop.
pub fn run_worker<R: BufRead, W: Write>(input: R, mut output: W) -> std::io::Result<usize> {
    let mut handled = 0;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ParseRequest>(&line) {
            Ok(request) => handle_request(&request),
            Err(e) => {
                tracing::warn!("Worker received an invalid request: {}", e);
                ParseResponse::failure(format!("Invalid request: {}", e))
            }
        };

        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        handled += 1;
    }

    tracing::debug!("Worker input closed after {} requests", handled);
    Ok(handled)
}
