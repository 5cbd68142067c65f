use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::errors::StompError;
use super::frame::{Command, Frame, StompItem, CR, HDR_CONTENT_LENGTH, LF, NULL};

/// Default upper bound for a single inbound frame (headers + body).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug)]
pub struct StompCodec {
    max_frame_size: usize,
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StompCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    fn check_size(&self, buffered: usize) -> Result<(), StompError> {
        if buffered > self.max_frame_size {
            return Err(StompError::FrameTooLarge {
                limit: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = StompError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // Heart-beats: bare EOL between frames
        if src[0] == LF {
            src.advance(1);
            return Ok(Some(StompItem::Heartbeat));
        }
        if src[0] == CR {
            if src.len() < 2 {
                return Ok(None);
            }
            if src[1] != LF {
                return Err(StompError::Invalid("stray CR before command".into()));
            }
            src.advance(2);
            return Ok(Some(StompItem::Heartbeat));
        }

        let (head_len, body_start) = match find_headers_end(src) {
            Some(bounds) => bounds,
            None => {
                self.check_size(src.len())?;
                return Ok(None);
            }
        };

        let (command, headers) = parse_head(&src[..head_len])?;

        let content_length = headers
            .iter()
            .find(|(k, _)| k == HDR_CONTENT_LENGTH)
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| StompError::Invalid(format!("bad content-length '{}'", v)))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let limit = self.max_frame_size;
                let end = body_start
                    .checked_add(len)
                    .ok_or(StompError::FrameTooLarge { limit })?;
                let frame_len = end
                    .checked_add(1)
                    .ok_or(StompError::FrameTooLarge { limit })?;
                if src.len() <= end {
                    self.check_size(frame_len)?;
                    return Ok(None);
                }
                if src[end] != NULL {
                    return Err(StompError::Invalid(
                        "body not terminated by NULL after content-length".into(),
                    ));
                }
                end
            }
            None => match src[body_start..].iter().position(|b| *b == NULL) {
                Some(offset) => body_start + offset,
                None => {
                    self.check_size(src.len())?;
                    return Ok(None);
                }
            },
        };

        self.check_size(body_end + 1)?;

        let frame_bytes = src.split_to(body_end + 1).freeze();
        let body = frame_bytes.slice(body_start..body_end);

        Ok(Some(StompItem::Frame(Frame {
            command,
            headers,
            body,
        })))
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = StompError;

    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            StompItem::Heartbeat => {
                dst.put_u8(LF);
                Ok(())
            }
            StompItem::Frame(frame) => <Self as Encoder<Frame>>::encode(self, frame, dst),
        }
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = StompError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let escape = frame.command.escapes_headers();

        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(LF);

        for (name, value) in &frame.headers {
            if escape {
                put_escaped(dst, name);
                dst.put_u8(b':');
                put_escaped(dst, value);
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(LF);
        }

        if !frame.body.is_empty() && frame.get_header(HDR_CONTENT_LENGTH).is_none() {
            dst.put_slice(HDR_CONTENT_LENGTH.as_bytes());
            dst.put_u8(b':');
            dst.put_slice(frame.body.len().to_string().as_bytes());
            dst.put_u8(LF);
        }

        dst.put_u8(LF);
        dst.extend_from_slice(&frame.body);
        dst.put_u8(NULL);
        Ok(())
    }
}

// ========================================
// HELPERS
// ========================================

/// Returns `(header block length, body offset)` once the blank line is buffered.
fn find_headers_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == LF {
            if buf.get(i + 1) == Some(&LF) {
                return Some((i, i + 2));
            }
            if buf.get(i + 1) == Some(&CR) && buf.get(i + 2) == Some(&LF) {
                return Some((i, i + 3));
            }
        }
        i += 1;
    }
    None
}

fn parse_head(block: &[u8]) -> Result<(Command, Vec<(String, String)>), StompError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| StompError::Invalid("headers are not UTF-8".into()))?;

    let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));

    let raw_command = lines.next().unwrap_or_default();
    let command = Command::parse(raw_command)
        .ok_or_else(|| StompError::Invalid(format!("unknown command '{}'", raw_command)))?;

    let escaped = command.escapes_headers();
    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::Invalid(format!("header without ':' in '{}'", line)))?;
        if escaped {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok((command, headers))
}

fn put_escaped(dst: &mut BytesMut, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '\\' => dst.put_slice(b"\\\\"),
            '\n' => dst.put_slice(b"\\n"),
            '\r' => dst.put_slice(b"\\r"),
            ':' => dst.put_slice(b"\\c"),
            other => {
                let mut tmp = [0u8; 4];
                dst.put_slice(other.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

fn unescape(raw: &str) -> Result<String, StompError> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(StompError::Invalid(format!(
                    "undefined escape sequence '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
