//! The name-pattern micro-language: literal text interleaved with bracketed
//! fields.
//!
//! A pattern such as `"image[001]_[name]"` consists of literals and fields.
//! A field is `[name]` or `[name, arg, arg, ...]`. Doubled delimiters
//! (`[[` and `]]`) escape literal brackets. Arguments may themselves be
//! wrapped in `[...]` to preserve commas and spaces, with the same doubling
//! escapes inside. A field the substitution callback does not recognize (or
//! a field with an unterminated delimiter) is reproduced verbatim in the
//! output, so a half-typed pattern still renders as typed.

/// One parsed element of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text, escapes already resolved.
    Literal(String),
    /// A `[name, args...]` field occurrence.
    Field {
        /// Field name, whitespace-trimmed.
        name: String,
        /// Parsed arguments.
        args: Vec<String>,
        /// The original pattern text of this field, used when the field is
        /// not recognized.
        raw: String,
    },
}

/// One field occurrence handed to the substitution callback.
#[derive(Debug, Clone, Copy)]
pub struct FieldCall<'a> {
    /// Index of this field among all field occurrences in the pattern.
    ///
    /// Two identical fields in one pattern get distinct indices, which is
    /// what lets numbering fields advance independently.
    pub occurrence: usize,
    /// Field name.
    pub name: &'a str,
    /// Field arguments.
    pub args: &'a [String],
}

/// A compiled name pattern.
#[derive(Debug, Clone)]
pub struct StringPattern {
    tokens: Vec<Token>,
}

impl StringPattern {
    /// Parse a pattern. Parsing never fails; malformed field syntax becomes
    /// literal text.
    pub fn parse(pattern: &str) -> Self {
        Self {
            tokens: tokenize(pattern),
        }
    }

    /// The parsed tokens, in pattern order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Render the pattern, resolving each field through `resolve`.
    ///
    /// `resolve` returns `None` for fields it does not recognize (or whose
    /// arguments it rejects); such fields are reproduced verbatim.
    pub fn substitute<F>(&self, mut resolve: F) -> String
    where
        F: FnMut(FieldCall<'_>) -> Option<String>,
    {
        let mut output = String::new();
        let mut occurrence = 0;

        for token in &self.tokens {
            match token {
                Token::Literal(text) => output.push_str(text),
                Token::Field { name, args, raw } => {
                    let call = FieldCall {
                        occurrence,
                        name,
                        args,
                    };
                    occurrence += 1;
                    match resolve(call) {
                        Some(value) => output.push_str(&value),
                        None => output.push_str(raw),
                    }
                }
            }
        }

        output
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '[' if chars.get(i + 1) == Some(&'[') => {
                literal.push('[');
                i += 2;
            }
            ']' if chars.get(i + 1) == Some(&']') => {
                literal.push(']');
                i += 2;
            }
            '[' => match parse_field(&chars, i) {
                Some((token, end)) => {
                    flush_literal(&mut tokens, &mut literal);
                    tokens.push(token);
                    i = end;
                }
                None => {
                    // Unterminated field; the remainder of the pattern is
                    // reproduced verbatim.
                    literal.extend(&chars[i..]);
                    i = chars.len();
                }
            },
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush_literal(&mut tokens, &mut literal);
    tokens
}

fn flush_literal(tokens: &mut Vec<Token>, literal: &mut String) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

/// Parse one field starting at the `[` at `start`. Returns the token and
/// the index just past the closing `]`, or `None` if the field never
/// terminates cleanly.
fn parse_field(chars: &[char], start: usize) -> Option<(Token, usize)> {
    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    // Set after a bracket-delimited argument closes; only `,`, `]` and
    // whitespace may follow until the next segment starts.
    let mut after_delimited = false;
    let mut current_is_delimited = false;
    let mut i = start + 1;

    let end = loop {
        let &c = chars.get(i)?;

        if after_delimited {
            match c {
                ',' => {
                    segments.push(std::mem::take(&mut current));
                    after_delimited = false;
                    current_is_delimited = false;
                    i += 1;
                }
                ']' => {
                    segments.push(std::mem::take(&mut current));
                    break i + 1;
                }
                _ if c.is_whitespace() => i += 1,
                _ => return None,
            }
            continue;
        }

        match c {
            ',' => {
                push_plain_segment(&mut segments, &mut current);
                i += 1;
            }
            ']' => {
                push_plain_segment(&mut segments, &mut current);
                break i + 1;
            }
            '[' => {
                // A delimited argument may only start a fresh segment; a
                // bracket in the middle of a plain segment makes the whole
                // field malformed.
                if !current.trim().is_empty() || current_is_delimited {
                    return None;
                }
                let (content, next) = parse_delimited_arg(chars, i)?;
                current = content;
                current_is_delimited = true;
                after_delimited = true;
                i = next;
            }
            c => {
                current.push(c);
                i += 1;
            }
        }
    };

    // The first segment is the field name; it cannot be bracket-delimited.
    let name = segments.first().map(|s| s.trim().to_string())?;
    let args: Vec<String> = segments
        .into_iter()
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .collect();

    let raw: String = chars[start..end].iter().collect();
    Some((Token::Field { name, args, raw }, end))
}

fn push_plain_segment(segments: &mut Vec<String>, current: &mut String) {
    segments.push(std::mem::take(current).trim().to_string());
}

/// Parse a `[...]`-delimited argument starting at the `[` at `start`.
/// Returns the unescaped content and the index just past the closing `]`.
fn parse_delimited_arg(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut content = String::new();
    let mut i = start + 1;

    loop {
        let &c = chars.get(i)?;
        match c {
            '[' if chars.get(i + 1) == Some(&'[') => {
                content.push('[');
                i += 2;
            }
            ']' if chars.get(i + 1) == Some(&']') => {
                content.push(']');
                i += 2;
            }
            ']' => return Some((content, i + 1)),
            '[' => return None,
            c => {
                content.push(c);
                i += 1;
            }
        }
    }
}
