//! Incremental reader for the query service's response body.
//!
//! The body is a single JSON object. Entries of its `results` array are split
//! out as raw row bytes as soon as they are complete; every other top-level
//! field is kept and decoded into metadata once the object closes.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use columnar_query::duration::parse_duration;
use columnar_query::{ErrorDescriptor, QueryMetadata, QueryMetrics, QueryWarning};
use serde::Deserialize;
use serde_json::{Map, Value};

const RESULTS_FIELD: &str = "results";

/// Failure to make sense of the body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed query response: {0}")]
pub struct MalformedResponse(String);

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Start,
    BeforeKey,
    AfterKey(String),
    BeforeValue(String),
    InRows,
    Done,
}

/// Splits a response body into rows and trailing fields.
#[derive(Debug)]
pub struct ResponseScanner {
    buf: BytesMut,
    state: State,
    rows: VecDeque<Bytes>,
    fields: Map<String, Value>,
    seen_rows: bool,
    pending: ValueScan,
}

impl Default for ResponseScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseScanner {
    /// Create a scanner at the start of a body.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: State::Start,
            rows: VecDeque::new(),
            fields: Map::new(),
            seen_rows: false,
            pending: ValueScan::default(),
        }
    }

    /// Consume the next chunk of the body.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), MalformedResponse> {
        if self.state == State::Done {
            return Ok(());
        }
        self.buf.extend_from_slice(chunk);
        while self.step()? {}
        Ok(())
    }

    /// Signal the end of the body.
    pub fn finish(&self) -> Result<(), MalformedResponse> {
        if self.state == State::Done {
            Ok(())
        } else {
            Err(MalformedResponse("unexpected end of body".into()))
        }
    }

    /// Take the next buffered row.
    pub fn pop_row(&mut self) -> Option<Bytes> {
        self.rows.pop_front()
    }

    /// Whether the `results` array has been entered.
    pub fn rows_started(&self) -> bool {
        self.seen_rows
    }

    /// Whether the closing brace of the body has been read.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Errors reported so far.
    pub fn errors(&self) -> Vec<ErrorDescriptor> {
        self.fields
            .get("errors")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<WireError>>(v).ok())
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect()
    }

    /// Decode the trailing fields.
    pub fn metadata(&self) -> Result<QueryMetadata, MalformedResponse> {
        let wire: WireMetadata = serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| MalformedResponse(e.to_string()))?;
        Ok(wire.into())
    }

    /// Advance by one token. Returns false when more input is needed.
    fn step(&mut self) -> Result<bool, MalformedResponse> {
        self.skip_whitespace();
        let Some(&byte) = self.buf.first() else {
            return Ok(false);
        };

        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                expect(byte, b'{')?;
                self.buf.advance(1);
                self.state = State::BeforeKey;
            }
            State::BeforeKey => match byte {
                b'}' => {
                    self.buf.advance(1);
                    self.state = State::Done;
                }
                b',' => {
                    self.buf.advance(1);
                    self.state = State::BeforeKey;
                }
                b'"' => {
                    let Some(end) = self.pending.resume(&self.buf)? else {
                        self.state = State::BeforeKey;
                        return Ok(false);
                    };
                    let raw = self.buf.split_to(end);
                    let key: String = serde_json::from_slice(&raw)
                        .map_err(|e| MalformedResponse(e.to_string()))?;
                    self.state = State::AfterKey(key);
                }
                other => return Err(unexpected(other)),
            },
            State::AfterKey(key) => {
                expect(byte, b':')?;
                self.buf.advance(1);
                self.state = State::BeforeValue(key);
            }
            State::BeforeValue(key) => {
                if key == RESULTS_FIELD && byte == b'[' {
                    self.buf.advance(1);
                    self.seen_rows = true;
                    self.state = State::InRows;
                    return Ok(true);
                }
                let Some(end) = self.pending.resume(&self.buf)? else {
                    self.state = State::BeforeValue(key);
                    return Ok(false);
                };
                let raw = self.buf.split_to(end);
                let value: Value = serde_json::from_slice(&raw)
                    .map_err(|e| MalformedResponse(e.to_string()))?;
                self.fields.insert(key, value);
                self.state = State::BeforeKey;
            }
            State::InRows => {
                self.state = State::InRows;
                match byte {
                    b']' => {
                        self.buf.advance(1);
                        self.state = State::BeforeKey;
                    }
                    b',' => self.buf.advance(1),
                    _ => {
                        let Some(end) = self.pending.resume(&self.buf)? else {
                            return Ok(false);
                        };
                        self.rows.push_back(self.buf.split_to(end).freeze());
                    }
                }
            }
            State::Done => return Ok(false),
        }
        Ok(true)
    }

    fn skip_whitespace(&mut self) {
        let n = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buf.advance(n);
    }
}

fn expect(byte: u8, wanted: u8) -> Result<(), MalformedResponse> {
    if byte == wanted {
        Ok(())
    } else {
        Err(unexpected(byte))
    }
}

fn unexpected(byte: u8) -> MalformedResponse {
    MalformedResponse(format!("unexpected character {:?}", char::from(byte)))
}

/// Progress through a JSON value at the start of the buffer that has not
/// fully arrived. Kept between feeds so each byte is scanned once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ValueScan {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ValueScan {
    /// Continue over `buf`, which starts with the value. Returns the value's
    /// length once it is complete, or `None` if it runs past the buffer.
    fn resume(&mut self, buf: &[u8]) -> Result<Option<usize>, MalformedResponse> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if self.pos == 0 && matches!(first, b'}' | b']' | b',' | b':') {
            return Err(unexpected(first));
        }
        let scalar = !matches!(first, b'"' | b'{' | b'[');

        while self.pos < buf.len() {
            let byte = buf[self.pos];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return Ok(Some(self.complete(self.pos + 1)));
                    }
                }
            } else if scalar {
                if matches!(byte, b',' | b'}' | b']') || byte.is_ascii_whitespace() {
                    return Ok(Some(self.complete(self.pos)));
                }
            } else {
                match byte {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            return Ok(Some(self.complete(self.pos + 1)));
                        }
                    }
                    _ => {}
                }
            }
            self.pos += 1;
        }
        Ok(None)
    }

    fn complete(&mut self, end: usize) -> usize {
        *self = Self::default();
        end
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: u32,
    #[serde(default)]
    msg: String,
}

impl From<WireError> for ErrorDescriptor {
    fn from(e: WireError) -> Self {
        ErrorDescriptor::new(e.code, e.msg)
    }
}

/// Parse the `errors` array of a complete, non-streamed body.
pub fn parse_errors(body: &[u8]) -> Vec<ErrorDescriptor> {
    #[derive(Deserialize)]
    struct Body {
        #[serde(default)]
        errors: Vec<WireError>,
    }
    serde_json::from_slice::<Body>(body)
        .map(|b| b.errors.into_iter().map(Into::into).collect())
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireMetadata {
    #[serde(rename = "requestID")]
    request_id: String,
    metrics: WireMetrics,
    warnings: Vec<WireError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireMetrics {
    elapsed_time: String,
    execution_time: String,
    result_count: u64,
    result_size: u64,
    processed_objects: u64,
}

fn wire_duration(text: &str) -> Duration {
    parse_duration(text).unwrap_or(Duration::ZERO)
}

impl From<WireMetadata> for QueryMetadata {
    fn from(wire: WireMetadata) -> Self {
        QueryMetadata {
            request_id: wire.request_id,
            metrics: QueryMetrics {
                elapsed_time: wire_duration(&wire.metrics.elapsed_time),
                execution_time: wire_duration(&wire.metrics.execution_time),
                result_count: wire.metrics.result_count,
                result_size: wire.metrics.result_size,
                processed_objects: wire.metrics.processed_objects,
            },
            warnings: wire
                .warnings
                .into_iter()
                .map(|w| QueryWarning {
                    code: w.code,
                    message: w.msg,
                })
                .collect(),
        }
    }
}
