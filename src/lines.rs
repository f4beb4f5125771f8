//! Byte stream to text line adapter

use crate::inflate::ByteSink;

/// Receives complete lines, without the trailing newline
pub trait LineHandler {
    fn handle_line(&mut self, line: &str);
}

impl LineHandler for Vec<String> {
    fn handle_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Splits decompressed bytes on `\n` and hands each line to a [`LineHandler`].
///
/// Lines are decoded only once complete, so multi-byte characters split across
/// chunks survive. A trailing `\r` is dropped and invalid UTF-8 is replaced.
pub struct LineSplitter<H> {
    partial: Vec<u8>,
    handler: H,
    lines: u64,
}

impl<H: LineHandler> LineSplitter<H> {
    pub fn new(handler: H) -> Self {
        Self {
            partial: Vec::new(),
            handler,
            lines: 0,
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    fn emit(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        self.lines += 1;
        self.handler.handle_line(&line);
    }
}

impl<H: LineHandler> ByteSink for LineSplitter<H> {
    fn feed(&mut self, data: &[u8]) {
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.partial.is_empty() {
                self.emit(head);
            } else {
                self.partial.extend_from_slice(head);
                let line = std::mem::take(&mut self.partial);
                self.emit(&line);
            }
            rest = &tail[1..];
        }
        self.partial.extend_from_slice(rest);
    }

    fn close(&mut self) {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.emit(&line);
        }
    }
}
