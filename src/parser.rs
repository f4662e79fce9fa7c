use crate::Span;
use crate::config::ParserConfig;
use crate::lexer::{LexerError, Token, TokenKind, Tokens, tokens};
use crate::types::{Node, SpecialForm};
use std::iter::Peekable;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax Error [at {}]: expected {expected} but received '{}'", .found.span, .found.kind)]
    UnexpectedToken { found: Token, expected: String },
    #[error("Syntax Error: unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("Syntax Error [at {span}]: invalid identifier '{name}'")]
    InvalidIdentifier { name: String, span: Span },
    #[error("Syntax Error [at {span}]: '{name}' is a reserved keyword")]
    ReservedKeyword { name: String, span: Span },
    #[error(
        "Syntax Error [at {span}]: invalid test condition, expected (<op> a b) with <op> one of < > <= >= = but received '{found}'"
    )]
    InvalidTestCondition { found: String, span: Span },
    #[error("Syntax Error [at {span}]: '{form}' is not allowed here")]
    MisplacedForm { form: SpecialForm, span: Span },
    #[error("Syntax Error [at {span}]: nesting deeper than {limit} levels")]
    NestingTooDeep { limit: usize, span: Span },
    #[error("Syntax Error [at {span}]: unexpected text after the last form")]
    TrailingInput { span: Span },
    #[error("Lexer Error during parse: {0}")]
    Lexer(#[from] LexerError),
}

// Result type alias for convenience
pub type ParseResult<T> = Result<T, ParseError>;

/// Every top-level form of the input, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub forms: Vec<Node>,
    /// Span of text after the last form that was skipped without being parsed.
    pub trailing: Option<Span>,
}

impl Program {
    /// The only form, when the input held exactly one.
    pub fn into_single(mut self) -> Option<Node> {
        if self.forms.len() == 1 {
            self.forms.pop()
        } else {
            None
        }
    }
}

// Which forms may appear right after an opening paren.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormContext {
    TopLevel,
    Operand,
    LambdaBody,
}

const ARITHMETIC_OPERATORS: [&str; 4] = ["+", "-", "*", "/"];
const COMPARISON_OPERATORS: [&str; 5] = ["<", ">", "<=", ">=", "="];

/// Letter or underscore, then letters, digits, underscores or hyphens.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

pub struct Parser<'source> {
    // Tokens are pulled lazily so text after the last form is never scanned.
    tokens: Peekable<Tokens<'source>>,
    input_len: usize,
    config: ParserConfig,
    depth: usize,
}

impl<'source> Parser<'source> {
    pub fn new(input: &'source str, config: ParserConfig) -> Self {
        Parser {
            tokens: tokens(input).peekable(),
            input_len: input.len(),
            config,
            depth: 0,
        }
    }

    // Consumes the next token; running out means `expected` never came.
    fn next_token(&mut self, expected: &str) -> ParseResult<Token> {
        match self.tokens.next() {
            Some(Ok(token)) => Ok(token),
            Some(Err(err)) => Err(err.into()),
            None => Err(ParseError::UnexpectedEof {
                expected: expected.to_string(),
            }),
        }
    }

    fn peek_kind(&mut self) -> ParseResult<Option<&TokenKind>> {
        match self.tokens.peek() {
            Some(Ok(token)) => Ok(Some(&token.kind)),
            Some(Err(err)) => Err(err.clone().into()),
            None => Ok(None),
        }
    }

    fn expect_lparen(&mut self, expected: &str) -> ParseResult<Span> {
        match self.next_token(expected)? {
            Token {
                kind: TokenKind::LParen,
                span,
            } => Ok(span),
            found => Err(ParseError::UnexpectedToken {
                found,
                expected: expected.to_string(),
            }),
        }
    }

    fn expect_rparen(&mut self, expected: &str) -> ParseResult<Span> {
        match self.next_token(expected)? {
            Token {
                kind: TokenKind::RParen,
                span,
            } => Ok(span),
            found => Err(ParseError::UnexpectedToken {
                found,
                expected: expected.to_string(),
            }),
        }
    }

    // Runs `parse` one paren level deeper, refusing to go past the configured limit.
    fn nested<T>(
        &mut self,
        open: Span,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= self.config.max_depth {
            return Err(ParseError::NestingTooDeep {
                limit: self.config.max_depth,
                span: open,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Parses forms until the input no longer continues with `(`.
    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut forms = vec![self.parse_form()?];
        let trailing = loop {
            let trailing_start = match self.tokens.peek() {
                None => break None,
                Some(Ok(token)) if token.kind == TokenKind::LParen => None,
                Some(Ok(Token { span, .. })) | Some(Err(LexerError { span, .. })) => {
                    Some(span.start)
                }
            };
            match trailing_start {
                Some(start) => break Some(Span::new(start, self.input_len)),
                None => forms.push(self.parse_form()?),
            }
        };

        if let Some(span) = trailing {
            if self.config.reject_trailing_input {
                return Err(ParseError::TrailingInput { span });
            }
            warn!(%span, "ignoring trailing input after the last form");
        }
        Ok(Program { forms, trailing })
    }

    /// Parses one parenthesised top-level form.
    pub fn parse_form(&mut self) -> ParseResult<Node> {
        let open = self.expect_lparen("'(' to start a form")?;
        let node = self.nested(open, |p| p.parse_form_body(open, FormContext::TopLevel))?;
        debug!(form = %node, "parsed form");
        Ok(node)
    }

    // Called with the opening paren already consumed; consumes through the closing one.
    fn parse_form_body(&mut self, open: Span, context: FormContext) -> ParseResult<Node> {
        let head = self.next_token("an operator, keyword or procedure")?;
        let keyword = match &head.kind {
            TokenKind::Symbol(name) if ARITHMETIC_OPERATORS.contains(&name.as_str()) => {
                let operator = Node::new_symbol(name.clone(), head.span);
                return self.parse_arithmetic(open, operator);
            }
            TokenKind::Symbol(name) => SpecialForm::from_keyword(name),
            TokenKind::LParen => {
                let callee = self.parse_callee(head)?;
                return self.parse_call(open, callee);
            }
            TokenKind::Number(_) | TokenKind::RParen => {
                return Err(ParseError::UnexpectedToken {
                    found: head,
                    expected: "an operator, keyword or procedure".to_string(),
                });
            }
        };

        match (keyword, context) {
            (None, _) => {
                let callee = self.identifier(head)?;
                self.parse_call(open, callee)
            }
            (Some(SpecialForm::Define), FormContext::TopLevel) => self.parse_define(open, head.span),
            (Some(SpecialForm::If), _) => self.parse_if(open, head.span),
            (Some(SpecialForm::Quote), _) => self.parse_quote(open, head.span),
            (Some(SpecialForm::Lambda), FormContext::LambdaBody) => {
                self.parse_lambda(open, head.span)
            }
            (Some(form), _) => Err(ParseError::MisplacedForm {
                form,
                span: head.span,
            }),
        }
    }

    // Validates a symbol token as a name that can be bound or referenced.
    fn identifier(&self, token: Token) -> ParseResult<Node> {
        match token.kind {
            TokenKind::Symbol(name) => {
                if SpecialForm::from_keyword(&name).is_some() {
                    Err(ParseError::ReservedKeyword {
                        name,
                        span: token.span,
                    })
                } else if is_identifier(&name) {
                    Ok(Node::new_symbol(name, token.span))
                } else {
                    Err(ParseError::InvalidIdentifier {
                        name,
                        span: token.span,
                    })
                }
            }
            _ => Err(ParseError::UnexpectedToken {
                found: token,
                expected: "an identifier".to_string(),
            }),
        }
    }

    /// A number, an identifier, or a parenthesised expression.
    fn parse_operand(&mut self) -> ParseResult<Node> {
        let token = self.next_token("a number, identifier or '('")?;
        match token.kind {
            TokenKind::Number(n) => Ok(Node::new_number(n, token.span)),
            TokenKind::Symbol(_) => self.identifier(token),
            TokenKind::LParen => {
                let open = token.span;
                self.nested(open, |p| p.parse_form_body(open, FormContext::Operand))
            }
            TokenKind::RParen => Err(ParseError::UnexpectedToken {
                found: token,
                expected: "a number, identifier or '('".to_string(),
            }),
        }
    }

    // (OP a b): exactly two operands, a third one is a syntax error.
    fn parse_arithmetic(&mut self, open: Span, operator: Node) -> ParseResult<Node> {
        let left = self.parse_operand()?;
        let right = self.parse_operand()?;
        let close = self.expect_rparen("')' after exactly two operands")?;
        Ok(Node::new_list(vec![operator, left, right], open.merge(close)))
    }

    // The callee is an identifier or, when it starts with '(', another call.
    fn parse_callee(&mut self, token: Token) -> ParseResult<Node> {
        match token.kind {
            TokenKind::LParen => {
                let open = token.span;
                self.nested(open, |p| {
                    let inner = p.next_token("a procedure")?;
                    let callee = p.parse_callee(inner)?;
                    p.parse_call(open, callee)
                })
            }
            _ => self.identifier(token),
        }
    }

    // Collects arguments until the closing paren.
    fn parse_call(&mut self, open: Span, callee: Node) -> ParseResult<Node> {
        let mut elements = vec![callee];
        loop {
            match self.peek_kind()? {
                Some(TokenKind::RParen) => {
                    let close = self.expect_rparen("')'")?;
                    return Ok(Node::new_list(elements, open.merge(close)));
                }
                Some(_) => elements.push(self.parse_operand()?),
                None => {
                    return Err(ParseError::UnexpectedEof {
                        expected: "')' to close the procedure call".to_string(),
                    });
                }
            }
        }
    }

    // (define name 10) or (define name (lambda ...))
    fn parse_define(&mut self, open: Span, keyword: Span) -> ParseResult<Node> {
        let name_token = self.next_token("an identifier to define")?;
        let name = self.identifier(name_token)?;

        let value_token = self.next_token("a number or (lambda ...)")?;
        let value = match value_token.kind {
            TokenKind::Number(n) => Node::new_number(n, value_token.span),
            TokenKind::LParen => {
                let value_open = value_token.span;
                self.nested(value_open, |p| {
                    let head = p.next_token("'lambda'")?;
                    match &head.kind {
                        TokenKind::Symbol(s)
                            if SpecialForm::from_keyword(s) == Some(SpecialForm::Lambda) =>
                        {
                            p.parse_lambda(value_open, head.span)
                        }
                        _ => Err(ParseError::UnexpectedToken {
                            found: head,
                            expected: "'lambda'".to_string(),
                        }),
                    }
                })?
            }
            _ => {
                return Err(ParseError::UnexpectedToken {
                    found: value_token,
                    expected: "a number or (lambda ...)".to_string(),
                });
            }
        };

        let close = self.expect_rparen("')' to close define")?;
        Ok(Node::new_list(
            vec![
                Node::new_symbol(SpecialForm::Define.keyword(), keyword),
                name,
                value,
            ],
            open.merge(close),
        ))
    }

    // (lambda (params...) body)
    fn parse_lambda(&mut self, open: Span, keyword: Span) -> ParseResult<Node> {
        let params_open = self.expect_lparen("'(' to start the parameter list")?;
        let mut params = Vec::new();
        let params_close = loop {
            let token = self.next_token("a parameter name or ')'")?;
            match token.kind {
                TokenKind::RParen => break token.span,
                _ => params.push(self.identifier(token)?),
            }
        };

        let body_token = self.next_token("a lambda body")?;
        let body = match body_token.kind {
            TokenKind::Number(n) => Node::new_number(n, body_token.span),
            TokenKind::Symbol(_) => self.identifier(body_token)?,
            TokenKind::LParen => {
                let body_open = body_token.span;
                self.nested(body_open, |p| {
                    p.parse_form_body(body_open, FormContext::LambdaBody)
                })?
            }
            TokenKind::RParen => {
                return Err(ParseError::UnexpectedToken {
                    found: body_token,
                    expected: "a lambda body".to_string(),
                });
            }
        };

        let close = self.expect_rparen("')' after the lambda body")?;
        Ok(Node::new_list(
            vec![
                Node::new_symbol(SpecialForm::Lambda.keyword(), keyword),
                Node::new_list(params, params_open.merge(params_close)),
                body,
            ],
            open.merge(close),
        ))
    }

    // (if (<op> a b) consequent alternate)
    fn parse_if(&mut self, open: Span, keyword: Span) -> ParseResult<Node> {
        let test = self.parse_test()?;
        let consequent = self.parse_operand()?;
        let alternate = self.parse_operand()?;
        let close = self.expect_rparen("')' after the alternate branch")?;
        Ok(Node::new_list(
            vec![
                Node::new_symbol(SpecialForm::If.keyword(), keyword),
                test,
                consequent,
                alternate,
            ],
            open.merge(close),
        ))
    }

    fn parse_test(&mut self) -> ParseResult<Node> {
        let token = self.next_token("a test condition")?;
        if token.kind != TokenKind::LParen {
            return Err(ParseError::InvalidTestCondition {
                found: token.kind.to_string(),
                span: token.span,
            });
        }
        let open = token.span;
        self.nested(open, |p| {
            let operator = p.next_token("a comparison operator")?;
            let operator = match operator.kind {
                TokenKind::Symbol(name) if COMPARISON_OPERATORS.contains(&name.as_str()) => {
                    Node::new_symbol(name, operator.span)
                }
                kind => {
                    return Err(ParseError::InvalidTestCondition {
                        found: kind.to_string(),
                        span: operator.span,
                    });
                }
            };
            let left = p.parse_operand()?;
            let right = p.parse_operand()?;
            let close = p.expect_rparen("')' to close the test condition")?;
            Ok(Node::new_list(vec![operator, left, right], open.merge(close)))
        })
    }

    // (quote datum): the datum is kept verbatim, symbols are not validated.
    fn parse_quote(&mut self, open: Span, keyword: Span) -> ParseResult<Node> {
        let token = self.next_token("an expression to quote")?;
        let datum = self.parse_datum(token)?;
        let close = self.expect_rparen("')' after the quoted expression")?;
        Ok(Node::new_list(
            vec![Node::new_symbol(SpecialForm::Quote.keyword(), keyword), datum],
            open.merge(close),
        ))
    }

    fn parse_datum(&mut self, token: Token) -> ParseResult<Node> {
        match token.kind {
            TokenKind::Number(n) => Ok(Node::new_number(n, token.span)),
            TokenKind::Symbol(s) => Ok(Node::new_symbol(s, token.span)),
            TokenKind::LParen => {
                let open = token.span;
                self.nested(open, |p| {
                    let mut items = Vec::new();
                    loop {
                        let next = p.next_token("')' to close the quoted list")?;
                        if next.kind == TokenKind::RParen {
                            return Ok(Node::new_list(items, open.merge(next.span)));
                        }
                        items.push(p.parse_datum(next)?);
                    }
                })
            }
            TokenKind::RParen => Err(ParseError::UnexpectedToken {
                found: token,
                expected: "an expression to quote".to_string(),
            }),
        }
    }
}

/// Parses program text into its top-level forms with the default configuration.
pub fn parse(input: &str) -> ParseResult<Program> {
    parse_with_config(input, &ParserConfig::default())
}

pub fn parse_with_config(input: &str, config: &ParserConfig) -> ParseResult<Program> {
    Parser::new(input, *config).parse_program()
}
