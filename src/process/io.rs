//! I/O primitives for communicating with the Claude CLI subprocess.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};

use super::{MessageReader, MessageWriter};
use crate::protocol::{CliMessage, OutboundMessage};
use crate::{Error, Result};

/// Reads newline-delimited JSON messages from the CLI stdout.
///
/// The CLI outputs one JSON message per line. This reader handles buffering
/// and parsing each line into a [`CliMessage`].
pub struct ProcessReader<R = ChildStdout> {
    reader: BufReader<R>,
    buffer: String,
}

impl<R: AsyncRead + Unpin + Send> ProcessReader<R> {
    /// Create a new reader over the CLI's stdout (or any byte source).
    pub fn new(stdout: R) -> Self {
        Self {
            reader: BufReader::new(stdout),
            buffer: String::with_capacity(4096),
        }
    }

    /// Read the next JSON message from the CLI.
    ///
    /// Returns `Ok(Some(message))` for each message, `Ok(None)` when EOF is reached,
    /// or `Err` on I/O or parse errors.
    pub async fn read_message(&mut self) -> Result<Option<CliMessage>> {
        loop {
            self.buffer.clear();

            let bytes_read = self
                .reader
                .read_line(&mut self.buffer)
                .await
                .map_err(Error::io)?;

            if bytes_read == 0 {
                return Ok(None);
            }

            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }

            let message: CliMessage =
                serde_json::from_str(line).map_err(|e| Error::json_parse(e, line))?;

            return Ok(Some(message));
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> MessageReader for ProcessReader<R> {
    async fn read_message(&mut self) -> Result<Option<CliMessage>> {
        ProcessReader::read_message(self).await
    }
}

/// Writes stream-json lines to the CLI stdin.
///
/// Closing stdin tells the CLI no further input will follow; it exits once
/// the current turn is finished.
pub struct ProcessWriter<W = ChildStdin> {
    stdin: Option<W>,
}

impl<W: AsyncWrite + Unpin + Send> ProcessWriter<W> {
    /// Create a new writer over the CLI's stdin (or any byte sink).
    pub fn new(stdin: W) -> Self {
        Self { stdin: Some(stdin) }
    }

    /// Serialize a message as one line and flush it.
    pub async fn write_message(&mut self, message: &OutboundMessage) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(Error::StreamClosed)?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.map_err(Error::io)?;
        stdin.flush().await.map_err(Error::io)?;
        Ok(())
    }

    /// Close stdin. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.map_err(Error::io)?;
        }
        Ok(())
    }

    /// Check whether stdin has been closed.
    pub fn is_closed(&self) -> bool {
        self.stdin.is_none()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageWriter for ProcessWriter<W> {
    async fn write_message(&mut self, message: &OutboundMessage) -> Result<()> {
        ProcessWriter::write_message(self, message).await
    }

    async fn close(&mut self) -> Result<()> {
        ProcessWriter::close(self).await
    }
}

/// Reads stderr output from the CLI process.
///
/// Stderr carries the CLI's own diagnostics; it is never part of the protocol.
pub struct StderrReader<R = ChildStderr> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> StderrReader<R> {
    /// Create a new stderr reader.
    pub fn new(stderr: R) -> Self {
        Self {
            reader: BufReader::new(stderr),
        }
    }

    /// Read the next line from stderr.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let bytes = self.reader.read_line(&mut line).await.map_err(Error::io)?;
        if bytes == 0 {
            Ok(None)
        } else {
            Ok(Some(line))
        }
    }

    /// Forward every stderr line to `tracing` until EOF.
    pub fn spawn_logger(mut self, pid: Option<u32>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.read_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim_end();
                        if !line.is_empty() {
                            tracing::debug!(target: "claude_bridge::cli", ?pid, "{line}");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(?pid, error = %e, "stopped reading CLI stderr");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::UserPrompt;

    #[test]
    fn process_reader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProcessReader>();
        assert_send_sync::<ProcessWriter>();
    }

    #[tokio::test]
    async fn reads_lines_and_skips_blanks() {
        let input: &[u8] = b"{\"type\":\"system\",\"subtype\":\"init\"}\n\n   \n{\"type\":\"result\",\"subtype\":\"success\"}\n";
        let mut reader = ProcessReader::new(input);

        let first = reader.read_message().await.unwrap().unwrap();
        assert!(matches!(first, CliMessage::System(_)));
        let second = reader.read_message().await.unwrap().unwrap();
        assert!(second.is_result());
        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_json_error() {
        let input: &[u8] = b"not json at all\n";
        let mut reader = ProcessReader::new(input);
        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, Error::JsonParse { .. }));
    }

    #[tokio::test]
    async fn writer_emits_one_line_per_message() {
        let (client, server) = tokio::io::duplex(4096);
        let mut writer = ProcessWriter::new(client);
        writer
            .write_message(&OutboundMessage::User(UserPrompt::new("hi")))
            .await
            .unwrap();
        writer
            .write_message(&OutboundMessage::interrupt("req_1"))
            .await
            .unwrap();
        writer.close().await.unwrap();
        assert!(writer.is_closed());
        writer.close().await.unwrap();

        let mut lines = BufReader::new(server).lines();
        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["type"], "user");
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["request"]["subtype"], "interrupt");
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let (client, _server) = tokio::io::duplex(64);
        let mut writer = ProcessWriter::new(client);
        writer.close().await.unwrap();
        let err = writer
            .write_message(&OutboundMessage::interrupt("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamClosed));
    }
}
