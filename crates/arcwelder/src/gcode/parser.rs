//! Gcode tokenizer: one source line to a command word plus named parameters.

use crate::error::ParseError;

/// A single parsed parameter word, e.g. `X10.25`.
#[derive(Debug, Clone, PartialEq)]
pub struct GcodeParam {
    /// Parameter letter, normalized to uppercase.
    pub letter: char,
    /// Numeric value, absent for bare flag words like the `X` in `G28 X`.
    pub value: Option<f64>,
    /// The numeric text exactly as written, used to observe input precision.
    pub raw: String,
}

/// A parsed command word with its parameters, e.g. `G1 X10 Y0 E5`.
#[derive(Debug, Clone, PartialEq)]
pub struct GcodeCommand {
    /// Command letter: `G`, `M` or `T`.
    pub letter: char,
    /// Major command number: the `92` in `G92.1`.
    pub major: u16,
    /// Sub-command number: the `1` in `G92.1`.
    pub minor: Option<u8>,
    /// Parameters in source order.
    pub params: Vec<GcodeParam>,
}

impl GcodeCommand {
    /// Whether this is the plain command `letter``major` with no sub-number.
    #[must_use]
    pub fn is(&self, letter: char, major: u16) -> bool {
        self.letter == letter && self.major == major && self.minor.is_none()
    }

    /// Looks up a parameter by letter.
    #[must_use]
    pub fn param(&self, letter: char) -> Option<&GcodeParam> {
        self.params.iter().find(|p| p.letter == letter)
    }

    /// The value of a parameter, when present with a number.
    #[must_use]
    pub fn param_value(&self, letter: char) -> Option<f64> {
        self.param(letter).and_then(|p| p.value)
    }

    /// Canonical command word, e.g. `G1` or `G92.1`.
    #[must_use]
    pub fn word(&self) -> String {
        self.minor.map_or_else(
            || format!("{}{}", self.letter, self.major),
            |minor| format!("{}{}.{minor}", self.letter, self.major),
        )
    }
}

/// A tokenized source line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// The command, absent for blank and comment-only lines.
    pub command: Option<GcodeCommand>,
    /// Text following the first `;`, without the semicolon.
    pub comment: Option<String>,
}

impl ParsedLine {
    /// Whether the line holds neither a command nor a comment.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.command.is_none() && self.comment.is_none()
    }
}

/// Tokenizes one line of gcode.
///
/// Accepts leading/trailing whitespace, lowercase words, `N` line numbers
/// and `*` checksums (both skipped), bare flag parameters, and `;` comments.
///
/// # Errors
///
/// Returns [`ParseError`] when the command word is not `G`/`M`/`T`, when a
/// command or parameter number cannot be parsed, or when a stray numeric
/// token appears without a letter.
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    let (code, comment) = match line.split_once(';') {
        Some((code, comment)) => (code, Some(comment.to_string())),
        None => (line, None),
    };

    let tokens = tokenize(line, code)?;
    let mut iter = tokens.into_iter();

    let mut first = iter.next();
    if let Some(token) = &first {
        if token.letter == 'N' {
            first = iter.next();
        }
    }

    let Some(head) = first else {
        return Ok(ParsedLine {
            command: None,
            comment,
        });
    };

    if !matches!(head.letter, 'G' | 'M' | 'T') {
        return Err(error(line, format!("unknown command letter `{}`", head.letter)));
    }
    let (major, minor) = parse_command_number(line, &head.raw)?;

    let mut params = Vec::new();
    for token in iter {
        let value = if token.raw.is_empty() {
            None
        } else {
            Some(parse_f64(line, token.letter, &token.raw)?)
        };
        params.push(GcodeParam {
            letter: token.letter,
            value,
            raw: token.raw,
        });
    }

    Ok(ParsedLine {
        command: Some(GcodeCommand {
            letter: head.letter,
            major,
            minor,
            params,
        }),
        comment,
    })
}

/// Counts fractional digits in a parameter's raw text, e.g. 5 for `10.12345`.
#[must_use]
pub fn fractional_digits(raw: &str) -> u8 {
    raw.split_once('.').map_or(0, |(_, frac)| {
        let digits = frac.chars().take_while(char::is_ascii_digit).count();
        u8::try_from(digits).unwrap_or(u8::MAX)
    })
}

struct Token {
    letter: char,
    raw: String,
}

fn tokenize(line: &str, code: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '*' {
            // Checksum: the rest of the line is for the transport layer.
            break;
        }
        if !ch.is_ascii_alphabetic() {
            return Err(error(line, format!("unexpected character `{ch}`")));
        }
        chars.next();
        let letter = ch.to_ascii_uppercase();

        let mut raw = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() || matches!(next, '+' | '-' | '.') {
                raw.push(next);
                chars.next();
            } else {
                break;
            }
        }
        tokens.push(Token { letter, raw });
    }

    Ok(tokens)
}

fn parse_command_number(line: &str, raw: &str) -> Result<(u16, Option<u8>), ParseError> {
    let (major_raw, minor_raw) = match raw.split_once('.') {
        Some((major, minor)) => (major, Some(minor)),
        None => (raw, None),
    };

    if major_raw.is_empty() || !major_raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(error(line, format!("invalid command number `{raw}`")));
    }
    let major = major_raw
        .parse::<u16>()
        .map_err(|err| error(line, format!("invalid command number `{raw}`: {err}")))?;

    let minor = match minor_raw {
        Some(minor_raw) => Some(
            minor_raw
                .parse::<u8>()
                .map_err(|err| error(line, format!("invalid sub-command `{raw}`: {err}")))?,
        ),
        None => None,
    };

    Ok((major, minor))
}

fn parse_f64(line: &str, letter: char, raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>()
        .map_err(|err| error(line, format!("invalid value for `{letter}`: {err}")))
}

fn error(line: &str, reason: String) -> ParseError {
    ParseError {
        line: line.to_string(),
        reason,
    }
}
