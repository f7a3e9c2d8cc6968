use super::Value;
use crate::error::{FetchError, Result};
use std::collections::BTreeMap;
use std::ops::Range;

/// Nesting beyond this is rejected rather than recursed into
const MAX_DEPTH: usize = 64;

/// Decode a complete bencoded document. Trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value> {
    let mut decoder = Decoder::new(data);
    let value = decoder.value(0)?;
    if decoder.pos != data.len() {
        return Err(bencode_err(format!(
            "{} trailing bytes",
            data.len() - decoder.pos
        )));
    }
    Ok(value)
}

/// Exact encoded bytes of the value stored under `key` in the top-level
/// dictionary, as they appear in `data`.
pub fn raw_entry<'a>(data: &'a [u8], key: &[u8]) -> Result<Option<&'a [u8]>> {
    let mut decoder = Decoder::new(data);
    for (entry_key, span) in decoder.top_level_spans()? {
        if entry_key == key {
            return Ok(Some(&data[span]));
        }
    }
    Ok(None)
}

fn bencode_err(msg: impl Into<String>) -> FetchError {
    FetchError::Bencode(msg.into())
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| bencode_err("unexpected end of input"))
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(bencode_err("nesting too deep"));
        }

        match self.peek()? {
            b'i' => self.int().map(Value::Int),
            b'l' => {
                self.pos += 1;
                let mut list = Vec::new();
                while self.peek()? != b'e' {
                    list.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Value::List(list))
            }
            b'd' => {
                self.pos += 1;
                let mut dict = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key = self.bytes()?.to_vec();
                    let value = self.value(depth + 1)?;
                    dict.insert(key, value);
                }
                self.pos += 1;
                Ok(Value::Dict(dict))
            }
            b'0'..=b'9' => self.bytes().map(|b| Value::Bytes(b.to_vec())),
            c => Err(bencode_err(format!(
                "invalid token {:?} at offset {}",
                c as char, self.pos
            ))),
        }
    }

    /// Walk the top-level dictionary, returning each key with the byte range
    /// of its encoded value.
    fn top_level_spans(&mut self) -> Result<Vec<(Vec<u8>, Range<usize>)>> {
        if self.peek()? != b'd' {
            return Err(bencode_err("document is not a dictionary"));
        }
        self.pos += 1;

        let mut spans = Vec::new();
        while self.peek()? != b'e' {
            let key = self.bytes()?.to_vec();
            let start = self.pos;
            self.value(1)?;
            spans.push((key, start..self.pos));
        }
        self.pos += 1;
        Ok(spans)
    }

    fn int(&mut self) -> Result<i64> {
        self.pos += 1; // 'i'
        let digits = self.until(b'e')?;
        let text = std::str::from_utf8(digits).map_err(|_| bencode_err("invalid integer"))?;

        let unsigned = text.strip_prefix('-').unwrap_or(text);
        if unsigned.is_empty()
            || (unsigned.len() > 1 && unsigned.starts_with('0'))
            || text == "-0"
        {
            return Err(bencode_err(format!("invalid integer {:?}", text)));
        }

        text.parse::<i64>()
            .map_err(|_| bencode_err(format!("invalid integer {:?}", text)))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let digits = self.until(b':')?;
        let len = std::str::from_utf8(digits)
            .ok()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| bencode_err("invalid string length"))?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| bencode_err("string length exceeds data"))?;

        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Bytes up to `delim`, consuming the delimiter.
    fn until(&mut self, delim: u8) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == delim)
            .ok_or_else(|| bencode_err("unterminated token"))?;
        self.pos += len + 1;
        Ok(&rest[..len])
    }
}
