//! Frame codec (component A): `Content-Length`-prefixed frames over an
//! async byte stream.
//!
//! Grounded on `codex::mcp::jsonrpc::{writer_task, reader_task}`, which
//! drive a single-purpose read/write loop over one half of a child
//! process's stdio each; this module generalizes that shape from
//! newline-delimited JSONL to `Content-Length` header framing and from
//! `ChildStdin`/`ChildStdout` to any `AsyncWrite`/`AsyncRead`.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::RpcError;
use crate::serializer::Encoding;

/// Writes `Content-Length`-framed bodies to an `AsyncWrite` stream. Owns
/// the writer half exclusively; callers fund the single-writer discipline
/// by routing all outbound frames through one `FrameWriter`.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        FrameWriter { inner }
    }

    /// Encode and write one frame. Computes the byte length under the
    /// given encoding (only UTF-8 is implemented) and writes header + blank
    /// line + body as one logical write.
    pub async fn write_frame(&mut self, body: &str, encoding: Encoding) -> Result<(), RpcError> {
        let bytes = match encoding {
            Encoding::Utf8 => body.as_bytes(),
        };
        let header = format!("Content-Length: {}\r\n\r\n", bytes.len());
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// Reads `Content-Length`-framed bodies from an `AsyncRead` stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner: BufReader::new(inner),
        }
    }

    /// Read the next frame body. Returns `Ok(None)` on a clean end of
    /// stream observed before any header bytes arrive. Any other decode
    /// failure is fatal to the connection.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, RpcError> {
        let mut content_length: Option<usize> = None;
        let mut saw_any_header_byte = false;

        loop {
            let mut line = String::new();
            let n = self
                .inner
                .read_line(&mut line)
                .await
                .map_err(RpcError::Io)?;

            if n == 0 {
                if saw_any_header_byte || content_length.is_some() {
                    return Err(RpcError::Frame(
                        "stream ended while reading frame header".into(),
                    ));
                }
                return Ok(None);
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            saw_any_header_byte = true;

            let mut parts = trimmed.splitn(2, ':');
            let name = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();

            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = Some(
                    value
                        .parse()
                        .map_err(|_| RpcError::Frame(format!("invalid Content-Length: {value}")))?,
                );
            } else if name.eq_ignore_ascii_case("Content-Type") {
                validate_content_type(value)?;
            }
            // Unknown headers are skipped.
        }

        let len = content_length
            .ok_or_else(|| RpcError::Frame("missing Content-Length header".into()))?;

        let mut body = vec![0u8; len];
        self.inner.read_exact(&mut body).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                RpcError::Frame("body shorter than advertised Content-Length".into())
            } else {
                RpcError::Io(err)
            }
        })?;

        Ok(Some(body))
    }
}

/// Only UTF-8 is implemented; a declared non-UTF-8 charset is a decode
/// error (DESIGN.md: Open Question resolution — this port has no
/// iconv-equivalent).
fn validate_content_type(value: &str) -> Result<(), RpcError> {
    let charset = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("charset="));

    match charset {
        None => Ok(()),
        Some(charset) if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") => {
            Ok(())
        }
        Some(other) => Err(RpcError::Frame(format!(
            "unsupported Content-Type charset: {other}"
        ))),
    }
}
