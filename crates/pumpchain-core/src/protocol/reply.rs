//! Reply decoding
//!
//! A reply is a run of CR/LF-delimited lines. Line 1 carries either the
//! answer payload or one of the error tokens `?`, `NA`, `OOR`; the final
//! line is the prompt, an optional address echo followed by the
//! one-character status symbol.
//!
//! ```text
//! "\r\n12.20 ml/hr\r\n01>"  ->  ["", "12.20 ml/hr", "01>"]
//! ```

/// Error tokens the firmware can place on line 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `?`: unrecognised instruction
    Syntax,
    /// `NA`: not applicable in the current state
    NotApplicable,
    /// `OOR`: value outside firmware limits
    OutOfRange,
}

/// The trailing prompt of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prompt {
    /// Address echoed in front of the status symbol, if any
    pub address: Option<u8>,
    /// Raw status symbol (`:`, `>`, `<`, `*`, ...)
    pub symbol: char,
}

/// Every status symbol any family sends at the end of a reply
pub const STATUS_SYMBOLS: &[char] = &[':', '>', '<', '*', '/', '^'];

/// A reply split into lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    lines: Vec<String>,
}

/// Split on `\r\n`, `\r` or `\n`; a trailing terminator adds no empty line
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            '\n' => lines.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

impl Reply {
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self::from_text(&String::from_utf8_lossy(raw))
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            lines: split_lines(text),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line 1, or "" when the reply is shorter
    pub fn payload(&self) -> &str {
        self.lines.get(1).map(String::as_str).unwrap_or("")
    }

    /// Error token on line 1, checked in firmware precedence order
    pub fn fault(&self) -> Option<Fault> {
        let line = self.payload();
        if line.contains('?') {
            Some(Fault::Syntax)
        } else if line.contains("NA") {
            Some(Fault::NotApplicable)
        } else if line.contains("OOR") {
            Some(Fault::OutOfRange)
        } else {
            None
        }
    }

    /// Decode the final line as a prompt
    pub fn prompt(&self) -> Option<Prompt> {
        let last = self.lines.last()?.trim();
        let symbol = last.chars().last()?;
        if !STATUS_SYMBOLS.contains(&symbol) {
            return None;
        }
        let prefix = &last[..last.len() - symbol.len_utf8()];
        if prefix.is_empty() {
            return Some(Prompt {
                address: None,
                symbol,
            });
        }
        if !prefix.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let address = prefix.parse::<u8>().ok()?;
        Some(Prompt {
            address: Some(address),
            symbol,
        })
    }
}
