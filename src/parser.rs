//! Splits template source into literal text and tags.

/// A piece of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Literal(String),
    /// Trimmed body of a `{% ... %}` tag.
    Control(&'a str),
    /// Trimmed body of a `{{ ... }}` tag.
    Variable(&'a str),
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    literal: String,
    tokens: Vec<Token<'a>>,
    /// Only whitespace, comments and control tags seen since the last newline.
    line_is_blank: bool,
    /// A standalone tag ended on the current line without consuming its line break.
    tag_on_line: bool,
}

impl<'a> Tokenizer<'a> {
    const fn new(input: &'a str) -> Self {
        Tokenizer {
            input,
            pos: 0,
            literal: String::new(),
            tokens: Vec::new(),
            line_is_blank: true,
            tag_on_line: false,
        }
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    fn peek(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn flush_literal(&mut self) {
        if !self.literal.is_empty() {
            let literal = std::mem::take(&mut self.literal);
            self.tokens.push(Token::Literal(literal));
        }
    }

    /// Drop the indentation that precedes a standalone tag on its line.
    fn strip_indent(&mut self) {
        let keep = self.literal.rfind('\n').map_or(0, |i| i + 1);
        self.literal.truncate(keep);
    }

    /// Consume one line break directly after a standalone tag.
    fn consume_newline(&mut self) {
        if self.peek("\r\n") {
            self.pos += 2;
        } else if self.peek("\n") {
            self.pos += 1;
        } else {
            self.tag_on_line = true;
            return;
        }
        self.line_is_blank = true;
        self.tag_on_line = false;
    }

    /// Find the end of a tag body starting at the current position, honouring double quotes
    /// and backslash escapes. Returns the byte offset of `close`.
    fn find_close(&self, close: &str) -> Option<usize> {
        let mut quoted = false;
        let mut escaped = false;

        for (i, c) in self.rest().char_indices() {
            if escaped {
                escaped = false;
            } else if c == '"' {
                quoted = !quoted;
            } else if c == '\\' {
                escaped = true;
            } else if !quoted && self.rest().get(i..).is_some_and(|r| r.starts_with(close)) {
                return Some(self.pos + i);
            }
        }

        None
    }

    /// Keep an unterminated tag as literal text.
    fn unterminated(&mut self) {
        self.literal.push_str(self.rest());
        self.pos = self.input.len();
    }

    fn comment(&mut self) {
        let Some(end) = self.rest().get(2..).and_then(|body| body.find("#}")) else {
            self.unterminated();
            return;
        };

        let standalone = self.line_is_blank;
        if standalone {
            self.strip_indent();
        }
        self.pos += end + 4;
        if standalone {
            self.consume_newline();
        }
    }

    fn control(&mut self) {
        let start = self.pos + 2;
        self.pos = start;
        let Some(end) = self.find_close("%}") else {
            self.pos = start - 2;
            self.unterminated();
            return;
        };

        let standalone = self.line_is_blank;
        if standalone {
            self.strip_indent();
        }
        self.flush_literal();

        let body = self.input.get(start..end).unwrap_or_default().trim();
        self.tokens.push(Token::Control(body));
        self.pos = end + 2;
        if standalone {
            self.consume_newline();
        }
    }

    fn variable(&mut self) {
        let start = self.pos + 2;
        self.pos = start;
        let Some(end) = self.find_close("}}") else {
            self.pos = start - 2;
            self.unterminated();
            return;
        };

        self.flush_literal();
        let body = self.input.get(start..end).unwrap_or_default().trim();
        self.tokens.push(Token::Variable(body));
        self.pos = end + 2;
        self.line_is_blank = false;
    }

    fn run(mut self) -> Vec<Token<'a>> {
        while let Some(c) = self.rest().chars().next() {
            if self.peek("{#") {
                self.comment();
            } else if self.peek("{%") {
                self.control();
            } else if self.peek("{{") {
                self.variable();
            } else {
                self.literal.push(c);
                self.pos += c.len_utf8();
                if c == '\n' {
                    self.line_is_blank = true;
                    self.tag_on_line = false;
                } else if self.tag_on_line || !c.is_whitespace() {
                    // Whitespace after a tag is content, not indentation.
                    self.line_is_blank = false;
                }
            }
        }

        self.flush_literal();
        self.tokens
    }
}

/// Split `input` into literal runs and tag bodies.
///
/// Comments are dropped. A comment or control tag that only has whitespace before it on its
/// line is standalone: that indentation is removed and one line break directly after the tag
/// is consumed. Variable tags never remove whitespace. A tag without a closing delimiter is
/// kept as literal text.
pub(crate) fn tokenize(input: &str) -> Vec<Token<'_>> {
    let tokens = Tokenizer::new(input).run();
    log::trace!("tokenized template into {} tokens", tokens.len());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Token<'_> {
        Token::Literal(s.to_owned())
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_plain_text() {
        assert_eq!(tokenize("Hello, World!"), vec![lit("Hello, World!")]);
        assert_eq!(tokenize(""), vec![]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_variable_tags() {
        assert_eq!(
            tokenize("Hello, {{  name  }}!"),
            vec![lit("Hello, "), Token::Variable("name"), lit("!")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_quoted_delimiters_do_not_close_tags() {
        assert_eq!(
            tokenize(r#"{{ name|format(" M ()}}\",|:.j, Y") }}"#),
            vec![Token::Variable(r#"name|format(" M ()}}\",|:.j, Y")"#)]
        );
        assert_eq!(
            tokenize(r#"{% if a == "%}" %}x{% endif %}"#),
            vec![
                Token::Control(r#"if a == "%}""#),
                lit("x"),
                Token::Control("endif"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_standalone_control_lines_are_removed() {
        assert_eq!(
            tokenize("<ul>\n  {% for i in items %}\n  <li>{{ i }}</li>\n  {% endfor %}\n</ul>"),
            vec![
                lit("<ul>\n"),
                Token::Control("for i in items"),
                lit("  <li>"),
                Token::Variable("i"),
                lit("</li>\n"),
                Token::Control("endfor"),
                lit("</ul>"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_crlf_line_endings() {
        assert_eq!(
            tokenize("a\r\n{% if x %}\r\nb\r\n{% endif %}\r\nc"),
            vec![
                lit("a\r\n"),
                Token::Control("if x"),
                lit("b\r\n"),
                Token::Control("endif"),
                lit("c"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_inline_control_keeps_whitespace() {
        assert_eq!(
            tokenize("a {% if x %}b{% endif %} c\n"),
            vec![
                lit("a "),
                Token::Control("if x"),
                lit("b"),
                Token::Control("endif"),
                lit(" c\n"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_trailing_content_keeps_line_break() {
        assert_eq!(
            tokenize("  {% if x %} tail\nnext"),
            vec![Token::Control("if x"), lit(" tail\nnext")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_consecutive_control_tags_on_one_line() {
        assert_eq!(
            tokenize("{% block a %}{% endblock %}\nafter"),
            vec![
                Token::Control("block a"),
                Token::Control("endblock"),
                lit("after"),
            ]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_whitespace_between_control_tags_is_kept() {
        assert_eq!(
            tokenize("{% if a %} {% endif %}\nX"),
            vec![
                Token::Control("if a"),
                lit(" "),
                Token::Control("endif"),
                lit("\nX"),
            ]
        );
        assert_eq!(
            tokenize("{# note #}\t{% if a %}\nX"),
            vec![lit("\t"), Token::Control("if a"), lit("\nX")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_variable_tag_makes_line_non_blank() {
        assert_eq!(
            tokenize("{{ a }}{% if b %}\nx"),
            vec![Token::Variable("a"), Token::Control("if b"), lit("\nx")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_comments() {
        assert_eq!(
            tokenize("{# Header #}\n<div>\n    {# Content #}\n    {{ content }}\n</div>\n{# Footer #}"),
            vec![
                lit("<div>\n    "),
                Token::Variable("content"),
                lit("\n</div>\n"),
            ]
        );
        assert_eq!(
            tokenize("Line 1\n{# This is\na multiline\ncomment #}\nLine 2"),
            vec![lit("Line 1\nLine 2")]
        );
        assert_eq!(
            tokenize("Hello {# inline #}World"),
            vec![lit("Hello World")]
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unterminated_tags_stay_literal() {
        assert_eq!(tokenize("a {{ b"), vec![lit("a {{ b")]);
        assert_eq!(tokenize("a {% if"), vec![lit("a {% if")]);
        assert_eq!(tokenize("a {# note"), vec![lit("a {# note")]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_unicode_literals() {
        assert_eq!(
            tokenize("héllo {{ wörld }} ✓"),
            vec![lit("héllo "), Token::Variable("wörld"), lit(" ✓")]
        );
    }
}
