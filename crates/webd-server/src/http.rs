//! Incremental HTTP/1.x request parser
//!
//! Character-level state machines that resume across socket reads: the
//! request line waits in the buffer until its terminating `\r` arrives, and
//! the header machine carries its state (plus the partially accumulated
//! key/value) between calls, so feeding the parser one byte at a time gives
//! the same result as feeding it the whole request.
//!
//! Consumed bytes are drained from the front of the buffer; anything after
//! a completed request (pipelined follow-up requests, a POST body) is left
//! untouched for the caller.

/// Request method. Any other token on the request line is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
}

/// HTTP version. Only 1.0 and 1.1 are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V10,
    V11,
}

/// Request-level machine: where the connection is in the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    ParseUri,
    ParseHeaders,
    RecvBody,
    Analyze,
    Finish,
}

/// Header-line machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    Start,
    Key,
    Colon,
    SpacesAfterColon,
    Value,
    Cr,
    Lf,
    EndCr,
    EndLf,
}

/// Outcome of one parse step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parse {
    /// Step complete, advance the request machine.
    Success,
    /// Need more bytes.
    Again,
    /// Malformed input; the request is unrecoverable.
    Error,
}

/// Longest accepted header value, bytes.
const MAX_VALUE_LEN: usize = 255;

/// Headers in arrival order, case-sensitive keys as received.
/// A key observed twice overwrites in place.
#[derive(Debug, Default)]
pub struct Headers {
    items: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn insert(&mut self, key: String, value: String) {
        for (k, v) in self.items.iter_mut() {
            if *k == key {
                *v = value;
                return;
            }
        }
        self.items.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Resumable request parser. One per connection; `reset` prepares it for
/// the next request on a kept-alive connection.
#[derive(Debug)]
pub struct Parser {
    pub state: ProcessState,
    hstate: HeaderState,
    pub method: Method,
    pub version: Version,
    pub target: String,
    pub headers: Headers,
    cur_key: Vec<u8>,
    cur_value: Vec<u8>,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ProcessState::ParseUri,
            hstate: HeaderState::Start,
            method: Method::Get,
            version: Version::V11,
            target: String::new(),
            headers: Headers::new(),
            cur_key: Vec::new(),
            cur_value: Vec::new(),
        }
    }

    /// Back to the initial state for the next request. The caller keeps
    /// its inbound buffer — pipelined bytes already read must survive.
    pub fn reset(&mut self) {
        self.state = ProcessState::ParseUri;
        self.hstate = HeaderState::Start;
        self.target.clear();
        self.headers.clear();
        self.cur_key.clear();
        self.cur_value.clear();
    }

    /// Parse `METHOD SP TARGET SP HTTP/VER` once a full line is buffered.
    ///
    /// On success the line and its `\r` are drained (the `\n` stays; the
    /// header machine skips it). The target is stored without its leading
    /// slash and with any `?query` stripped; an empty or bare-`/` target
    /// becomes `index.html`.
    pub fn parse_request_line(&mut self, buf: &mut Vec<u8>) -> Parse {
        let pos = match buf.iter().position(|&b| b == b'\r') {
            Some(p) => p,
            None => return Parse::Again,
        };
        let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
        buf.drain(..=pos);

        let sp = match line.find(' ') {
            Some(i) => i,
            None => return Parse::Error,
        };
        self.method = match &line[..sp] {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            _ => return Parse::Error,
        };

        let rest = &line[sp..];
        let slash = match rest.find('/') {
            Some(i) => i,
            None => {
                // No target at all: serve the index.
                self.target = "index.html".to_string();
                self.version = Version::V11;
                return Parse::Success;
            }
        };
        let after = &rest[slash..];
        let sp2 = match after.find(' ') {
            Some(i) => i,
            None => return Parse::Error,
        };
        if sp2 > 1 {
            let raw = &after[1..sp2];
            let stripped = raw.split('?').next().unwrap_or("");
            self.target = if stripped.is_empty() {
                "index.html".to_string()
            } else {
                stripped.to_string()
            };
        } else {
            self.target = "index.html".to_string();
        }

        let tail = &after[sp2..];
        let vslash = match tail.find('/') {
            Some(i) => i,
            None => return Parse::Error,
        };
        let ver = &tail[vslash + 1..];
        self.version = match ver.get(..3) {
            Some("1.0") => Version::V10,
            Some("1.1") => Version::V11,
            _ => return Parse::Error,
        };
        Parse::Success
    }

    /// Step the header machine over the buffered bytes.
    ///
    /// Lines are `Key: Value\r\n` — the separator is exactly colon plus one
    /// space; empty keys, empty values, and values longer than 255 bytes
    /// are errors. A blank line ends the block. Bytes are consumed as they
    /// are examined, so the machine picks up mid-line after a short read.
    pub fn parse_headers(&mut self, buf: &mut Vec<u8>) -> Parse {
        let mut consumed = 0usize;
        let mut outcome = Parse::Again;

        for &b in buf.iter() {
            consumed += 1;
            match self.hstate {
                HeaderState::Start => {
                    if b == b'\n' {
                        // Trailing LF of the request line.
                        continue;
                    }
                    if b == b'\r' {
                        // A CR here opens the terminating blank line of a
                        // header-less request.
                        self.hstate = HeaderState::EndCr;
                        continue;
                    }
                    self.hstate = HeaderState::Key;
                    self.cur_key.clear();
                    self.cur_key.push(b);
                }
                HeaderState::Key => {
                    if b == b':' {
                        if self.cur_key.is_empty() {
                            outcome = Parse::Error;
                            break;
                        }
                        self.hstate = HeaderState::Colon;
                    } else if b == b'\r' || b == b'\n' {
                        outcome = Parse::Error;
                        break;
                    } else {
                        self.cur_key.push(b);
                    }
                }
                HeaderState::Colon => {
                    if b == b' ' {
                        self.hstate = HeaderState::SpacesAfterColon;
                    } else {
                        outcome = Parse::Error;
                        break;
                    }
                }
                HeaderState::SpacesAfterColon => {
                    if b == b'\r' || b == b'\n' {
                        // Empty value.
                        outcome = Parse::Error;
                        break;
                    }
                    self.hstate = HeaderState::Value;
                    self.cur_value.clear();
                    self.cur_value.push(b);
                }
                HeaderState::Value => {
                    if b == b'\r' {
                        self.hstate = HeaderState::Cr;
                    } else if self.cur_value.len() >= MAX_VALUE_LEN {
                        outcome = Parse::Error;
                        break;
                    } else {
                        self.cur_value.push(b);
                    }
                }
                HeaderState::Cr => {
                    if b == b'\n' {
                        let key = String::from_utf8_lossy(&self.cur_key).into_owned();
                        let value = String::from_utf8_lossy(&self.cur_value).into_owned();
                        self.headers.insert(key, value);
                        self.hstate = HeaderState::Lf;
                    } else {
                        outcome = Parse::Error;
                        break;
                    }
                }
                HeaderState::Lf => {
                    if b == b'\r' {
                        self.hstate = HeaderState::EndCr;
                    } else {
                        self.hstate = HeaderState::Key;
                        self.cur_key.clear();
                        self.cur_key.push(b);
                    }
                }
                HeaderState::EndCr => {
                    if b == b'\n' {
                        self.hstate = HeaderState::EndLf;
                        outcome = Parse::Success;
                    } else {
                        outcome = Parse::Error;
                    }
                    break;
                }
                HeaderState::EndLf => {
                    // Terminal; reached only via reset misuse. Consume
                    // nothing further.
                    consumed -= 1;
                    outcome = Parse::Success;
                    break;
                }
            }
        }

        buf.drain(..consumed);
        outcome
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> (Parser, Vec<u8>, Parse) {
        let mut parser = Parser::new();
        let mut buf = input.to_vec();
        let line = parser.parse_request_line(&mut buf);
        if line != Parse::Success {
            return (parser, buf, line);
        }
        let hdrs = parser.parse_headers(&mut buf);
        (parser, buf, hdrs)
    }

    #[test]
    fn test_simple_get() {
        let (p, buf, outcome) = parse_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(outcome, Parse::Success);
        assert_eq!(p.method, Method::Get);
        assert_eq!(p.version, Version::V11);
        assert_eq!(p.target, "index.html");
        assert_eq!(p.headers.get("Host"), Some("x"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bare_slash_resolves_to_index() {
        let (p, _, outcome) = parse_all(b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(outcome, Parse::Success);
        assert_eq!(p.target, "index.html");
    }

    #[test]
    fn test_query_string_stripped() {
        let (p, _, outcome) = parse_all(b"GET /page.html?a=1&b=2 HTTP/1.0\r\n\r\n");
        assert_eq!(outcome, Parse::Success);
        assert_eq!(p.target, "page.html");
        assert_eq!(p.version, Version::V10);
    }

    #[test]
    fn test_query_only_target_resolves_to_index() {
        let (p, _, outcome) = parse_all(b"GET /?a=1 HTTP/1.1\r\n\r\n");
        assert_eq!(outcome, Parse::Success);
        assert_eq!(p.target, "index.html");
    }

    #[test]
    fn test_unknown_method_rejected() {
        let mut parser = Parser::new();
        let mut buf = b"FOO /x HTTP/1.1\r\n\r\n".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Error);
    }

    #[test]
    fn test_method_must_match_exactly() {
        let mut parser = Parser::new();
        let mut buf = b"GETX /x HTTP/1.1\r\n\r\n".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Error);
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut parser = Parser::new();
        let mut buf = b"GET /x HTTP/2.0\r\n\r\n".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Error);
    }

    #[test]
    fn test_request_line_waits_for_cr() {
        let mut parser = Parser::new();
        let mut buf = b"GET /x HTT".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Again);
        assert_eq!(buf, b"GET /x HTT");

        buf.extend_from_slice(b"P/1.1\r\n");
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Success);
        assert_eq!(parser.target, "x");
    }

    #[test]
    fn test_empty_header_block_terminates() {
        let mut parser = Parser::new();
        let mut buf = b"HEAD /favicon.ico HTTP/1.1\r\n\r\n".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Success);
        assert_eq!(parser.parse_headers(&mut buf), Parse::Success);
        assert_eq!(parser.method, Method::Head);
        assert_eq!(parser.target, "favicon.ico");
        assert!(parser.headers.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_separator_must_be_colon_space() {
        let mut parser = Parser::new();
        parser.state = ProcessState::ParseHeaders;
        let mut buf = b"Host:x\r\n\r\n".to_vec();
        assert_eq!(parser.parse_headers(&mut buf), Parse::Error);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut parser = Parser::new();
        let mut buf = b": v\r\n\r\n".to_vec();
        assert_eq!(parser.parse_headers(&mut buf), Parse::Error);
    }

    #[test]
    fn test_empty_value_rejected() {
        let mut parser = Parser::new();
        let mut buf = b"Host: \r\n\r\n".to_vec();
        assert_eq!(parser.parse_headers(&mut buf), Parse::Error);
    }

    #[test]
    fn test_overlong_value_rejected() {
        let mut parser = Parser::new();
        let mut line = b"K: ".to_vec();
        line.extend(std::iter::repeat(b'v').take(256));
        line.extend_from_slice(b"\r\n\r\n");
        assert_eq!(parser.parse_headers(&mut line), Parse::Error);

        // 255 bytes is still fine.
        let mut parser = Parser::new();
        let mut line = b"K: ".to_vec();
        line.extend(std::iter::repeat(b'v').take(255));
        line.extend_from_slice(b"\r\n\r\n");
        assert_eq!(parser.parse_headers(&mut line), Parse::Success);
        assert_eq!(parser.headers.get("K").unwrap().len(), 255);
    }

    #[test]
    fn test_duplicate_key_overwrites_in_place() {
        let mut parser = Parser::new();
        let mut buf = b"A: 1\r\nB: 2\r\nA: 3\r\n\r\n".to_vec();
        assert_eq!(parser.parse_headers(&mut buf), Parse::Success);
        assert_eq!(parser.headers.len(), 2);
        assert_eq!(parser.headers.get("A"), Some("3"));

        // Arrival order preserved, first sighting wins the position.
        let order: Vec<&str> = parser.headers.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn test_keys_case_sensitive() {
        let mut parser = Parser::new();
        let mut buf = b"host: a\r\nHost: b\r\n\r\n".to_vec();
        assert_eq!(parser.parse_headers(&mut buf), Parse::Success);
        assert_eq!(parser.headers.len(), 2);
        assert_eq!(parser.headers.get("host"), Some("a"));
        assert_eq!(parser.headers.get("Host"), Some("b"));
    }

    #[test]
    fn test_pipelined_bytes_left_in_buffer() {
        let mut parser = Parser::new();
        let mut buf = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\n\r\n".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Success);
        assert_eq!(parser.parse_headers(&mut buf), Parse::Success);
        assert_eq!(buf, b"GET /b HTTP/1.1\r\n\r\n");

        // The leftover parses as a complete second request after reset.
        parser.reset();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Success);
        assert_eq!(parser.parse_headers(&mut buf), Parse::Success);
        assert_eq!(parser.target, "b");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_byte_at_a_time_totality() {
        // Feeding one byte at a time must reach the same terminal state,
        // returning only Again along the way.
        let input: &[u8] = b"GET /hello HTTP/1.1\r\nConnection: keep-alive\r\nHost: h\r\n\r\n";
        let mut parser = Parser::new();
        let mut buf: Vec<u8> = Vec::new();
        let mut done_line = false;
        let mut done_headers = false;

        for &b in input {
            buf.push(b);
            if !done_line {
                match parser.parse_request_line(&mut buf) {
                    Parse::Success => done_line = true,
                    Parse::Again => continue,
                    Parse::Error => panic!("unexpected parse error"),
                }
            }
            if done_line && !done_headers {
                match parser.parse_headers(&mut buf) {
                    Parse::Success => done_headers = true,
                    Parse::Again => continue,
                    Parse::Error => panic!("unexpected header error"),
                }
            }
        }

        assert!(done_line && done_headers);
        assert_eq!(parser.target, "hello");
        assert_eq!(parser.headers.get("Connection"), Some("keep-alive"));
        assert_eq!(parser.headers.get("Host"), Some("h"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_blank_line_still_terminates() {
        // The terminating CRLF arriving in two reads must not be skipped.
        let mut parser = Parser::new();
        let mut buf = b"GET /x HTTP/1.1\r\nHost: h\r\n\r".to_vec();
        assert_eq!(parser.parse_request_line(&mut buf), Parse::Success);
        assert_eq!(parser.parse_headers(&mut buf), Parse::Again);

        buf.extend_from_slice(b"\n");
        assert_eq!(parser.parse_headers(&mut buf), Parse::Success);
    }

    #[test]
    fn test_reset_idempotent() {
        let mut parser = Parser::new();
        let mut buf = b"GET /x HTTP/1.0\r\nA: 1\r\n\r\n".to_vec();
        parser.parse_request_line(&mut buf);
        parser.parse_headers(&mut buf);

        parser.reset();
        let state1 = (parser.state, parser.target.clone(), parser.headers.len());
        parser.reset();
        let state2 = (parser.state, parser.target.clone(), parser.headers.len());
        assert_eq!(state1, state2);
        assert_eq!(parser.state, ProcessState::ParseUri);
        assert!(parser.target.is_empty());
        assert!(parser.headers.is_empty());
    }

    #[test]
    fn test_garbage_never_wedges() {
        // Arbitrary junk either errors out or keeps asking for more bytes;
        // the machine never diverges or panics.
        let junk: &[&[u8]] = &[
            b"\r\n\r\n",
            b"GET\r\n",
            b"GET  HTTP/1.1\r\n\r\n",
            b"G\x00T /x HTTP/1.1\r\n\r\n",
            b"POST /x HTTP/9.9\r\n\r\n",
        ];
        for input in junk {
            let mut parser = Parser::new();
            let mut buf = input.to_vec();
            let outcome = parser.parse_request_line(&mut buf);
            assert!(matches!(outcome, Parse::Error | Parse::Again | Parse::Success));
        }
    }
}
