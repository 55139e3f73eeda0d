use std::convert::Infallible;
use std::io::SeekFrom;

use bytes::Bytes;
use http::Request;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

type BoxBodyError = Box<dyn std::error::Error + Send + Sync>;
pub(crate) type ReqBody = BoxBody<Bytes, BoxBodyError>;

fn map_infallible_to_box_error(never: Infallible) -> BoxBodyError {
    match never {}
}

pub(crate) fn into_hyper_request(request: Request<Bytes>) -> Request<ReqBody> {
    request.map(|body| Full::new(body).map_err(map_infallible_to_box_error).boxed())
}

pub(crate) enum ReadBodyError {
    Read(hyper::Error),
    TooLarge { actual_bytes: usize },
}

pub(crate) async fn read_all_body_limited(
    mut body: Incoming,
    max_bytes: usize,
) -> Result<Bytes, ReadBodyError> {
    let mut collected = Vec::new();
    let mut total_len = 0_usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(ReadBodyError::Read)?;
        if let Some(data) = frame.data_ref() {
            total_len = total_len.saturating_add(data.len());
            if total_len > max_bytes {
                return Err(ReadBodyError::TooLarge {
                    actual_bytes: total_len,
                });
            }
            collected.extend_from_slice(data);
        }
    }

    Ok(Bytes::from(collected))
}

/// Seekable byte source for a binary request body.
pub trait SeekableBody: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> SeekableBody for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

enum BinarySource {
    Bytes(Bytes),
    Seekable {
        reader: Box<dyn SeekableBody>,
        start: Option<u64>,
    },
    OneShot {
        reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
    },
}

/// A raw (non-JSON) request body.
///
/// Seekable sources are rewound to the position they had on the first attempt
/// before every retry. One-shot sources can be sent once, which makes the call
/// single-attempt.
pub struct BinaryBody {
    source: BinarySource,
    content_type: Option<String>,
}

impl std::fmt::Debug for BinaryBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.source {
            BinarySource::Bytes(bytes) => format!("bytes({})", bytes.len()),
            BinarySource::Seekable { start, .. } => format!("seekable(start={start:?})"),
            BinarySource::OneShot { reader } => {
                format!("one_shot(consumed={})", reader.is_none())
            }
        };
        formatter
            .debug_struct("BinaryBody")
            .field("source", &kind)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl BinaryBody {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: BinarySource::Bytes(bytes.into()),
            content_type: None,
        }
    }

    pub fn seekable(reader: impl SeekableBody + 'static) -> Self {
        Self {
            source: BinarySource::Seekable {
                reader: Box::new(reader),
                start: None,
            },
            content_type: None,
        }
    }

    pub fn one_shot(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            source: BinarySource::OneShot {
                reader: Some(Box::new(reader)),
            },
            content_type: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn configured_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_rewindable(&self) -> bool {
        !matches!(self.source, BinarySource::OneShot { .. })
    }

    /// Reads the whole body for one attempt, rewinding seekable sources first.
    pub(crate) async fn read_for_attempt(&mut self) -> std::io::Result<Bytes> {
        match &mut self.source {
            BinarySource::Bytes(bytes) => Ok(bytes.clone()),
            BinarySource::Seekable { reader, start } => {
                match *start {
                    Some(position) => {
                        reader.seek(SeekFrom::Start(position)).await?;
                    }
                    None => *start = Some(reader.stream_position().await?),
                }
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
            BinarySource::OneShot { reader } => {
                let Some(mut reader) = reader.take() else {
                    return Err(std::io::Error::other("one-shot body was already sent"));
                };
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}
