use crate::parser::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// Text copied to the output as is.
    Literal(String),
    /// A `{{ expr|filters }}` tag, or a control tag that is not a keyword.
    Variable(String),
    If {
        condition: String,
        body: Vec<Node>,
    },
    ElseIf {
        condition: String,
        body: Vec<Node>,
    },
    Else {
        body: Vec<Node>,
    },
    /// A loop; `header` is everything after `for`, e.g. `key, value in items`.
    For {
        header: String,
        body: Vec<Node>,
    },
    Block {
        name: String,
        body: Vec<Node>,
    },
    Extends {
        target: String,
    },
    Include {
        target: String,
    },
}

impl Node {
    /// Child nodes of a block-like node; empty for leaves.
    pub(crate) fn body(&self) -> &[Self] {
        match self {
            Self::If { body, .. }
            | Self::ElseIf { body, .. }
            | Self::Else { body }
            | Self::For { body, .. }
            | Self::Block { body, .. } => body,
            Self::Literal(_) | Self::Variable(_) | Self::Extends { .. } | Self::Include { .. } => {
                &[]
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    If,
    ElseIf,
    Else,
    For,
    Block,
}

/// A node whose closing tag has not been seen yet.
struct Frame {
    opener: Opener,
    expression: String,
    body: Vec<Node>,
}

impl Frame {
    fn into_node(self) -> Node {
        let Self {
            opener,
            expression,
            body,
        } = self;
        match opener {
            Opener::If => Node::If {
                condition: expression,
                body,
            },
            Opener::ElseIf => Node::ElseIf {
                condition: expression,
                body,
            },
            Opener::Else => Node::Else { body },
            Opener::For => Node::For {
                header: expression,
                body,
            },
            Opener::Block => Node::Block {
                name: expression,
                body,
            },
        }
    }
}

#[derive(Default)]
struct Builder {
    root: Vec<Node>,
    open: Vec<Frame>,
}

impl Builder {
    fn append(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(frame) => frame.body.push(node),
            None => self.root.push(node),
        }
    }

    fn open(&mut self, opener: Opener, expression: &str) {
        self.open.push(Frame {
            opener,
            expression: expression.to_owned(),
            body: Vec::new(),
        });
    }

    fn close(&mut self, tag: &str) {
        match self.open.pop() {
            Some(frame) => self.append(frame.into_node()),
            None => log::warn!("ignoring `{tag}` with no open block"),
        }
    }

    fn control(&mut self, body: &str) {
        match body {
            "endif" | "endfor" | "endblock" => self.close(body),
            "else" => {
                self.close(body);
                self.open(Opener::Else, "");
            }
            _ => {
                if let Some(condition) = keyword(body, "elseif") {
                    self.close(body);
                    self.open(Opener::ElseIf, condition);
                } else if let Some(condition) = keyword(body, "if") {
                    self.open(Opener::If, condition);
                } else if let Some(header) = keyword(body, "for") {
                    self.open(Opener::For, header);
                } else if let Some(name) = keyword(body, "block") {
                    self.open(Opener::Block, name);
                } else if let Some(target) = keyword(body, "extends") {
                    self.append(Node::Extends {
                        target: target.to_owned(),
                    });
                } else if let Some(target) = keyword(body, "include") {
                    self.append(Node::Include {
                        target: target.to_owned(),
                    });
                } else {
                    self.append(Node::Variable(body.to_owned()));
                }
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(frame) = self.open.pop() {
            log::warn!(
                "implicitly closing unterminated {:?} `{}` at end of template",
                frame.opener,
                frame.expression
            );
            self.append(frame.into_node());
        }
        self.root
    }
}

/// Strip a leading keyword that is followed by whitespace, returning the trimmed remainder.
fn keyword<'a>(body: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = body.strip_prefix(keyword)?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

/// Build the node tree for a token stream.
///
/// Closing tags close whatever block is innermost. A closing tag with nothing open is
/// ignored and blocks still open at the end of input are closed implicitly.
pub(crate) fn build(tokens: Vec<Token<'_>>) -> Vec<Node> {
    let mut builder = Builder::default();

    for token in tokens {
        match token {
            Token::Literal(text) => builder.append(Node::Literal(text)),
            Token::Variable(expression) => builder.append(Node::Variable(expression.to_owned())),
            Token::Control(body) => builder.control(body),
        }
    }

    let nodes = builder.finish();
    log::trace!("built template tree with {} top-level nodes", nodes.len());
    nodes
}
