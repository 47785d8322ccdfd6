use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Longest first so that greedy matching works.
const PUNCTUATION: &[&str] = &[
    "...", "===", "!==", "=>", "==", "!=", "||", "&&", "??", "?.", "<=", ">=", "{", "}", "(", ")",
    "[", "]", ";", ",", ":", ".", "=", "!", "-", "+", "*", "/", "%", "<", ">", "?", "&", "|", "^",
    "~",
];

/// Tokens up to the first lexical error, plus that error if there was one.
///
/// Statements that were fully tokenized before the error still run.
pub fn tokenize(source: &str) -> (Vec<Spanned>, Option<ScriptError>) {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        line_start: true,
        tokens: Vec::new(),
    };
    let error = lexer.run().err();
    (lexer.tokens, error)
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line_start: bool,
    tokens: Vec<Spanned>,
}

impl Lexer<'_> {
    fn run(&mut self) -> Result<(), ScriptError> {
        let source = self.source;
        while self.pos < self.bytes.len() {
            let rest = &source[self.pos..];
            let Some(ch) = rest.chars().next() else {
                break;
            };

            if ch == '\n' {
                self.line_start = true;
                self.pos += 1;
                continue;
            }
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
                continue;
            }
            if rest.starts_with("//") || rest.starts_with("<!--") || (self.line_start && rest.starts_with("-->")) {
                self.skip_line();
                continue;
            }
            if rest.starts_with("/*") {
                self.skip_block_comment()?;
                continue;
            }

            self.line_start = false;
            let offset = self.pos;
            let token = if ch == '"' || ch == '\'' || ch == '`' {
                Token::Str(self.string(ch)?)
            } else if ch.is_ascii_digit() || (ch == '.' && rest[1..].starts_with(|c: char| c.is_ascii_digit())) {
                Token::Number(self.number()?)
            } else if is_ident_start(ch) {
                Token::Ident(self.ident())
            } else if let Some(punct) = PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
                self.pos += punct.len();
                Token::Punct(*punct)
            } else {
                return Err(ScriptError::Syntax {
                    offset,
                    message: format!("unexpected character {ch:?}"),
                });
            };
            self.tokens.push(Spanned { token, offset });
        }
        Ok(())
    }

    fn skip_line(&mut self) {
        match self.source[self.pos..].find('\n') {
            Some(end) => self.pos += end,
            None => self.pos = self.bytes.len(),
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        match self.source[self.pos + 2..].find("*/") {
            Some(end) => {
                if self.source[self.pos..self.pos + 2 + end].contains('\n') {
                    self.line_start = true;
                }
                self.pos += end + 4;
                Ok(())
            }
            None => Err(ScriptError::Syntax {
                offset: start,
                message: "unterminated comment".to_string(),
            }),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        for ch in self.source[self.pos..].chars() {
            if is_ident_continue(ch) {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        self.source[start..self.pos].to_string()
    }

    fn number(&mut self) -> Result<f64, ScriptError> {
        let source = self.source;
        let start = self.pos;
        let rest = &source[start..];
        if rest.starts_with("0x") || rest.starts_with("0X") {
            let digits: String = rest[2..].chars().take_while(char::is_ascii_hexdigit).collect();
            self.pos += 2 + digits.len();
            return u64::from_str_radix(&digits, 16)
                .map(|n| n as f64)
                .map_err(|_| ScriptError::Syntax {
                    offset: start,
                    message: "invalid hex literal".to_string(),
                });
        }

        let bytes = self.bytes;
        let mut end = start;
        let mut seen_exponent = false;
        while end < bytes.len() {
            let b = bytes[end];
            let exponent_sign = matches!(b, b'+' | b'-') && end > start && matches!(bytes[end - 1], b'e' | b'E');
            if b.is_ascii_digit() || b == b'.' || exponent_sign {
                end += 1;
            } else if matches!(b, b'e' | b'E') && !seen_exponent {
                seen_exponent = true;
                end += 1;
            } else {
                break;
            }
        }
        self.pos = end;
        self.source[start..end].parse::<f64>().map_err(|_| ScriptError::Syntax {
            offset: start,
            message: format!("invalid number {:?}", &self.source[start..end]),
        })
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptError> {
        let source = self.source;
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = source[self.pos..].char_indices().peekable();

        let unterminated = || ScriptError::Syntax {
            offset: start,
            message: "unterminated string".to_string(),
        };

        loop {
            let Some((index, ch)) = chars.next() else {
                return Err(unterminated());
            };
            match ch {
                c if c == quote => {
                    self.pos += index + 1;
                    return Ok(out);
                }
                '$' if quote == '`' && chars.peek().is_some_and(|(_, c)| *c == '{') => {
                    return Err(ScriptError::Unsupported {
                        offset: self.pos + index,
                        construct: "template interpolation",
                    });
                }
                '\n' if quote != '`' => return Err(unterminated()),
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        return Err(unterminated());
                    };
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'v' => out.push('\u{b}'),
                        '0' => out.push('\0'),
                        '\n' => {}
                        '\r' => {
                            if chars.peek().is_some_and(|(_, c)| *c == '\n') {
                                chars.next();
                            }
                        }
                        'x' => {
                            let code = take_hex(&mut chars, 2).ok_or_else(unterminated)?;
                            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                        'u' => {
                            let code = if chars.peek().is_some_and(|(_, c)| *c == '{') {
                                chars.next();
                                let mut code = 0u32;
                                loop {
                                    match chars.next() {
                                        Some((_, '}')) => break,
                                        Some((_, c)) if c.is_ascii_hexdigit() => {
                                            code = code.saturating_mul(16).saturating_add(c.to_digit(16).unwrap_or(0));
                                        }
                                        _ => return Err(unterminated()),
                                    }
                                }
                                code
                            } else {
                                take_hex(&mut chars, 4).ok_or_else(unterminated)?
                            };
                            out.push(decode_utf16_escape(code, &mut chars));
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }
}

type CharIndices<'s> = std::iter::Peekable<std::str::CharIndices<'s>>;

fn take_hex(chars: &mut CharIndices<'_>, count: usize) -> Option<u32> {
    let mut code = 0u32;
    for _ in 0..count {
        let (_, c) = chars.next()?;
        code = code * 16 + c.to_digit(16)?;
    }
    Some(code)
}

/// Combine a `\uD83D\uDE00` style surrogate pair into one scalar value.
fn decode_utf16_escape(code: u32, chars: &mut CharIndices<'_>) -> char {
    if (0xD800..0xDC00).contains(&code) {
        let mut lookahead = chars.clone();
        if let (Some((_, '\\')), Some((_, 'u'))) = (lookahead.next(), lookahead.next())
            && let Some(low) = take_hex(&mut lookahead, 4)
            && (0xDC00..0xE000).contains(&low)
        {
            *chars = lookahead;
            let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER);
        }
        return char::REPLACEMENT_CHARACTER;
    }
    char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphabetic()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch == '$' || ch.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let (tokens, error) = tokenize(source);
        assert_eq!(error, None);
        tokens.into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            tokens(r#"window["a-b"] = {x: 1.5e3, y: 'q'};"#),
            vec![
                Token::Ident("window".into()),
                Token::Punct("["),
                Token::Str("a-b".into()),
                Token::Punct("]"),
                Token::Punct("="),
                Token::Punct("{"),
                Token::Ident("x".into()),
                Token::Punct(":"),
                Token::Number(1500.0),
                Token::Punct(","),
                Token::Ident("y".into()),
                Token::Punct(":"),
                Token::Str("q".into()),
                Token::Punct("}"),
                Token::Punct(";"),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokens("<!--\n// line\n/* block\n */ a\n-->"),
            vec![Token::Ident("a".into())]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""a\nb\u0041\x42\/\u{1F600}\uD83D\uDE00""#),
            vec![Token::Str("a\nbAB/\u{1F600}\u{1F600}".into())]
        );
        assert_eq!(tokens("`multi\nline`"), vec![Token::Str("multi\nline".into())]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("0x1F .5 10 2e-3"),
            vec![
                Token::Number(31.0),
                Token::Number(0.5),
                Token::Number(10.0),
                Token::Number(0.002),
            ]
        );
    }

    #[test]
    fn test_error_keeps_earlier_tokens() {
        let (tokens, error) = tokenize("a = 1; b = 'unterminated");
        assert_eq!(tokens.len(), 6);
        assert!(matches!(error, Some(ScriptError::Syntax { offset: 11, .. })));
    }

    #[test]
    fn test_template_interpolation_unsupported() {
        let (_, error) = tokenize("x = `${y}`");
        assert!(matches!(error, Some(ScriptError::Unsupported { .. })));
    }
}
