use std::io::{BufRead, BufReader, Write};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::warn;

use crate::contract::OtpPrompt;

/// Reads the one-time code from the terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinOtpPrompt;

#[async_trait]
impl OtpPrompt for StdinOtpPrompt {
    async fn prompt(&self, timeout: Duration) -> Option<String> {
        eprint!(
            "Enter the one-time code from the portal (or press Enter once you've completed it in the browser): "
        );
        let _ = std::io::stderr().flush();

        read_line_within(BufReader::new(std::io::stdin()), timeout).await
    }
}

/// Reads one trimmed line from `reader`, giving up after `timeout`.
///
/// The read runs on a detached thread: a blocked terminal read cannot be
/// cancelled, and must not keep the runtime alive once the wait is over.
pub async fn read_line_within<R>(mut reader: R, timeout: Duration) -> Option<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let read = reader.read_line(&mut line).map(|n| (n, line));
        let _ = tx.send(read);
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok((0, _)))) => {
            warn!("[OTP] stdin closed before a code was entered");
            None
        }
        Ok(Ok(Ok((_, line)))) => Some(line.trim().to_string()),
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "[OTP] Failed to read from stdin");
            None
        }
        Ok(Err(_)) => {
            warn!("[OTP] stdin reader stopped without an answer");
            None
        }
        Err(_) => {
            warn!(timeout = ?timeout, "[OTP] No code entered in time");
            None
        }
    }
}
