use crate::envelope;
use crate::error::ApiResult;
use crate::transport::{ApiTransport, ByteStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Command that streams the status of every filestore entry.
pub const VERIFY_COMMAND: &str = "filestore/verify";

/// Status code of a filestore entry as reported by `filestore/verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilestoreStatus(pub i32);

impl FilestoreStatus {
    pub const OK: Self = Self(0);
    pub const FILE_ERROR: Self = Self(10);
    /// The backing file no longer exists.
    pub const FILE_NOT_FOUND: Self = Self(11);
    pub const FILE_CHANGED: Self = Self(12);
    pub const OTHER_ERROR: Self = Self(20);
    pub const KEY_NOT_FOUND: Self = Self(30);

    pub fn is_orphaned(self) -> bool {
        self == Self::FILE_NOT_FOUND
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::OK => "ok",
            Self::FILE_ERROR => "error reading backing file",
            Self::FILE_NOT_FOUND => "backing file not found",
            Self::FILE_CHANGED => "backing file changed",
            Self::OTHER_ERROR => "internal error",
            Self::KEY_NOT_FOUND => "key not found",
            _ => "unknown status",
        }
    }
}

impl fmt::Display for FilestoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.describe())
    }
}

/// IPLD link form of a block key: `{"/": "<cid>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockKey {
    #[serde(rename = "/")]
    pub cid: String,
}

/// One entry of the verify stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    #[serde(rename = "Status")]
    pub status: FilestoreStatus,
    #[serde(rename = "Key")]
    pub key: BlockKey,
    #[serde(rename = "FilePath", default)]
    pub file_path: String,
    #[serde(rename = "ErrorMsg", default)]
    pub error_msg: String,
}

impl VerificationRecord {
    pub fn cid(&self) -> &str {
        &self.key.cid
    }

    pub fn is_orphaned(&self) -> bool {
        self.status.is_orphaned()
    }
}

enum Decoded {
    Record(VerificationRecord),
    NeedMore,
    Skipped,
}

/// Pull-based decoder over the open `filestore/verify` body.
///
/// The body is a sequence of JSON objects with no enclosing array. Values are
/// decoded one at a time as bytes arrive; anything that does not decode is
/// logged and skipped. Dropping the stream releases the connection.
pub struct VerifyStream {
    body: ByteStream,
    buf: Vec<u8>,
    finished: bool,
    decode_failures: u64,
}

impl VerifyStream {
    /// Opens `filestore/verify`. This call has no deadline.
    pub async fn open<T: ApiTransport + ?Sized>(transport: &T) -> ApiResult<Self> {
        let body = transport.stream(VERIFY_COMMAND).await?;
        Ok(Self::from_body(body))
    }

    pub fn from_body(body: ByteStream) -> Self {
        Self {
            body,
            buf: Vec::new(),
            finished: false,
            decode_failures: 0,
        }
    }

    /// Values that could not be decoded into a record so far.
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Next record, `Ok(None)` once the node closes the stream. An error is a
    /// transport failure and ends the stream.
    pub async fn next_record(&mut self) -> ApiResult<Option<VerificationRecord>> {
        loop {
            match self.decode_buffered() {
                Decoded::Record(record) => return Ok(Some(record)),
                Decoded::Skipped => continue,
                Decoded::NeedMore => {}
            }

            if self.finished {
                self.drain_trailing();
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buf.clear();
                    return Err(e);
                }
                None => self.finished = true,
            }
        }
    }

    fn decode_buffered(&mut self) -> Decoded {
        let (result, consumed) = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<serde_json::Value>();
            let result = values.next();
            (result, values.byte_offset())
        };

        match result {
            None => {
                self.buf.clear();
                Decoded::NeedMore
            }
            Some(Ok(value)) => {
                self.buf.drain(..consumed);
                self.convert(value)
            }
            Some(Err(e)) if e.is_eof() => Decoded::NeedMore,
            Some(Err(e)) => {
                warn!("Error decoding filestore/verify stream: {}", e);
                self.decode_failures += 1;
                self.resync();
                Decoded::Skipped
            }
        }
    }

    fn convert(&mut self, value: serde_json::Value) -> Decoded {
        match VerificationRecord::deserialize(&value) {
            Ok(record) => Decoded::Record(record),
            Err(e) => {
                self.decode_failures += 1;
                match envelope::classify_value(&value) {
                    Some(message) => warn!("filestore/verify reported an error: {}", message),
                    None => warn!("Skipping unexpected filestore/verify entry {}: {}", value, e),
                }
                Decoded::Skipped
            }
        }
    }

    // Drops the failed value's first byte and everything up to the next
    // object start.
    fn resync(&mut self) {
        let start = self
            .buf
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buf.len());
        let from = (start + 1).min(self.buf.len());
        match self.buf[from..].iter().position(|&b| b == b'{') {
            Some(offset) => {
                self.buf.drain(..from + offset);
            }
            None => self.buf.clear(),
        }
    }

    fn drain_trailing(&mut self) {
        if self.buf.iter().any(|b| !b.is_ascii_whitespace()) {
            warn!(
                "Dropping {} bytes of truncated data at end of filestore/verify stream",
                self.buf.len()
            );
            self.decode_failures += 1;
        }
        self.buf.clear();
    }
}
