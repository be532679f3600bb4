//! Blocking HTTP/1.1 client.

use super::header::{GetRequest, HttpHeader};
use super::parser::{ChunkedDecoder, FixedLengthDecoder, HeaderDecoder, LineDecoder};
use crate::runtime::{BlockingReader, DecodeError, Encode, StreamError};
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed response: {0}")]
    Malformed(#[from] DecodeError),
}

impl From<StreamError> for HttpError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Io(e) => HttpError::Io(e),
            StreamError::Decode(e) => HttpError::Malformed(e),
        }
    }
}

/// Reads response framing off a blocking stream.
pub struct HttpReader<R> {
    inner: BlockingReader<R>,
}

impl<R: Read> HttpReader<R> {
    pub fn new(stream: R, buffer_size: usize) -> Self {
        Self {
            inner: BlockingReader::new(stream, buffer_size),
        }
    }

    /// Next line, without its `CR LF`.
    pub fn read_line_crlf(&mut self) -> Result<String, HttpError> {
        Ok(self.inner.read(&mut LineDecoder::new())?)
    }

    pub fn read_header(&mut self) -> Result<HttpHeader, HttpError> {
        Ok(self.inner.read(&mut HeaderDecoder::new())?)
    }

    /// Exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, HttpError> {
        Ok(self.inner.read(&mut FixedLengthDecoder::new(len))?)
    }

    /// A complete chunked body, reassembled.
    pub fn read_chunks(&mut self) -> Result<Bytes, HttpError> {
        Ok(self.inner.read(&mut ChunkedDecoder::new())?)
    }

    /// Everything until the peer closes.
    pub fn read_to_end(&mut self) -> Result<Bytes, HttpError> {
        let mut body = Vec::new();
        self.inner.read_to_end(&mut body)?;
        Ok(Bytes::from(body))
    }

    /// Body framed as `header` describes: chunked, `Content-Length`, or
    /// read to end-of-stream.
    pub fn read_body(&mut self, header: &HttpHeader) -> Result<Bytes, HttpError> {
        if header.is_chunked() {
            self.read_chunks()
        } else if let Some(len) = header.content_length() {
            self.read_bytes(len)
        } else {
            self.read_to_end()
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.inner.get_mut()
    }
}

/// A complete response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub header: HttpHeader,
    pub body: Bytes,
}

impl HttpResponse {
    /// Body decoded with the charset announced in `Content-Type`.
    pub fn text(&self) -> String {
        decode_text(&self.body, self.header.charset()).into_owned()
    }
}

/// Decode `bytes` as `charset`. Unknown or missing charsets fall back to
/// lossy UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], charset: Option<&str>) -> Cow<'a, str> {
    let charset = charset.unwrap_or("utf-8").to_ascii_lowercase();
    match charset.as_str() {
        "iso-8859-1" | "latin1" | "latin-1" | "l1" => {
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
        "us-ascii" | "ascii" => Cow::Owned(
            bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        ),
        _ => String::from_utf8_lossy(bytes),
    }
}

/// Send a `GET` for `path` over `stream` and read the full response.
pub fn exchange<S: Read + Write>(
    stream: S,
    host: &str,
    path: &str,
    buffer_size: usize,
) -> Result<HttpResponse, HttpError> {
    let request = GetRequest::new(host, path);
    let mut encoded = BytesMut::with_capacity(request.encoded_len());
    request.encode(&mut encoded);

    let mut reader = HttpReader::new(stream, buffer_size);
    reader.get_mut().write_all(&encoded)?;
    reader.get_mut().flush()?;

    let header = reader.read_header()?;
    debug!(code = header.code(), chunked = header.is_chunked(), "Response header received");
    let body = reader.read_body(&header)?;
    Ok(HttpResponse { header, body })
}

/// Fetch `http://host:port/path`.
pub fn fetch(host: &str, port: u16, path: &str, buffer_size: usize) -> Result<HttpResponse, HttpError> {
    let stream = TcpStream::connect((host, port))?;
    info!(host, port, path, "Connected");
    exchange(stream, host, path, buffer_size)
}
