use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::Cancel;
use crate::context::QueryContext;
use crate::error::{ForwarderError, Result};
use crate::pipeline::node::{ChainNode, NodeMatcher, RecursiveExecutable};
use crate::pipeline::walker::ChainWalker;

/// A parsed boolean expression over named matchers: `AND`, `OR`, `NOT`,
/// parentheses, and bare identifiers. No external expression-language
/// dependency — this grammar is small enough to hand-roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    And,
    Or,
    Not,
    LParen,
    RParen,
    Ident(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.bump();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ForwarderError::ConfigInvalid(
                        "condition expression: expected ')'".into(),
                    )),
                }
            }
            other => Err(ForwarderError::ConfigInvalid(format!(
                "condition expression: unexpected token near {other:?}"
            ))),
        }
    }
}

/// Parses a condition expression such as `A AND (NOT B OR C)`.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ForwarderError::ConfigInvalid(
            "condition expression: trailing tokens".into(),
        ));
    }
    Ok(expr)
}

struct Evaluator<'a> {
    ctx: &'a QueryContext,
    matchers: &'a HashMap<String, Arc<dyn NodeMatcher>>,
    cache: HashMap<String, bool>,
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, expr: &Expr) -> Result<bool> {
        match expr {
            Expr::Var(name) => {
                if let Some(v) = self.cache.get(name) {
                    return Ok(*v);
                }
                let matcher = self.matchers.get(name).ok_or_else(|| {
                    ForwarderError::ConfigInvalid(format!("condition: unknown matcher `{name}`"))
                })?;
                let v = matcher.eval(self.ctx)?;
                self.cache.insert(name.clone(), v);
                Ok(v)
            }
            Expr::Not(inner) => Ok(!self.eval(inner)?),
            Expr::And(a, b) => Ok(self.eval(a)? && self.eval(b)?),
            Expr::Or(a, b) => Ok(self.eval(a)? || self.eval(b)?),
        }
    }
}

/// Runs `then_chain` when `expr` evaluates true against the configured
/// named matchers, else `else_chain` if present. Each named matcher is
/// evaluated at most once per query, lazily, due to `&&`/`||`
/// short-circuiting in `Evaluator::eval`.
pub struct ConditionNode {
    expr: Expr,
    matchers: HashMap<String, Arc<dyn NodeMatcher>>,
    then_chain: Arc<Vec<ChainNode>>,
    else_chain: Option<Arc<Vec<ChainNode>>>,
}

impl ConditionNode {
    pub fn new(
        expr: Expr,
        matchers: HashMap<String, Arc<dyn NodeMatcher>>,
        then_chain: Arc<Vec<ChainNode>>,
        else_chain: Option<Arc<Vec<ChainNode>>>,
    ) -> Self {
        Self {
            expr,
            matchers,
            then_chain,
            else_chain,
        }
    }
}

#[async_trait]
impl RecursiveExecutable for ConditionNode {
    async fn execute(
        &self,
        ctx: &mut QueryContext,
        _walker: &mut ChainWalker,
        cancel: &Cancel,
    ) -> Result<()> {
        let mut evaluator = Evaluator {
            ctx,
            matchers: &self.matchers,
            cache: HashMap::new(),
        };
        let truthy = evaluator.eval(&self.expr)?;

        if truthy {
            ChainWalker::new(self.then_chain.clone())
                .run(ctx, cancel)
                .await
        } else if let Some(else_chain) = &self.else_chain {
            ChainWalker::new(else_chain.clone()).run(ctx, cancel).await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_precedence_and_parens() {
        let expr = parse("A AND (NOT B OR C)").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Var("A".into())),
                Box::new(Expr::Or(
                    Box::new(Expr::Not(Box::new(Expr::Var("B".into())))),
                    Box::new(Expr::Var("C".into())),
                )),
            )
        );
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(parse("(A AND B").is_err());
    }
}
