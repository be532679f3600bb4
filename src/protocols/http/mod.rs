//! HTTP/1.1 response framing and a blocking `GET` client.
//!
//! The decoders are incremental like every other protocol here, so they can
//! run inside the reactor as well as through the blocking client.

pub mod header;
pub mod parser;
pub mod reader;

pub use header::{GetRequest, HttpHeader};
pub use parser::{ChunkedDecoder, FixedLengthDecoder, HeaderDecoder, LineDecoder};
pub use reader::{decode_text, exchange, fetch, HttpError, HttpReader, HttpResponse};
