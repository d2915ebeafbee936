//! Native structural-selector grammar.
//!
//! This is the substrate the rule compiler leans on: the fragments it cannot
//! express imperatively are handed to this grammar as plain selector strings
//! and evaluated by `matcher`. The supported surface is deliberately the
//! structural core (type/id/class/attribute selectors, combinators, selector
//! lists, `:scope`, `:not`/`:is`/`:where`, a few tree pseudos). Anything else
//! is a compile-time error, so a rule using it is rejected up front rather
//! than misbehaving at run time.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of selector")]
    UnexpectedEnd,
    #[error("unsupported pseudo-class ':{0}'")]
    UnsupportedPseudo(String),
    #[error("empty selector")]
    Empty,
    #[error("dangling combinator")]
    DanglingCombinator,
}

/// Attribute comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[attr]`
    Exists,
    /// `[attr=v]`
    Equals,
    /// `[attr~=v]` - whitespace-separated word
    Includes,
    /// `[attr|=v]` - exact or dash-prefixed
    DashMatch,
    /// `[attr^=v]`
    Prefix,
    /// `[attr$=v]`
    Suffix,
    /// `[attr*=v]`
    Substring,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleSelector {
    Universal,
    Type(String),
    Id(String),
    Class(String),
    Attribute {
        name: String,
        op: AttrOp,
        value: Option<String>,
        case_insensitive: bool,
    },
    /// `:scope` - the node the query is rooted at
    Scope,
    Not(SelectorList),
    Is(SelectorList),
    Where(SelectorList),
    FirstChild,
    LastChild,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

/// Left-to-right sequence of (compound, combinator-to-next).
/// The last combinator is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexSelector {
    pub sequence: Vec<(CompoundSelector, Option<Combinator>)>,
}

/// Comma-separated selector alternatives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectorList(pub Vec<ComplexSelector>);

/// Parse a comma-separated native selector list.
pub fn parse_selector_list(input: &str) -> Result<SelectorList, SelectorError> {
    let mut scanner = Scanner::new(input);
    let list = scanner.parse_list(None)?;
    scanner.skip_ws();
    match scanner.peek() {
        None => Ok(list),
        Some(c) => Err(SelectorError::UnexpectedChar(c)),
    }
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn is_ident_start(c: char) -> bool {
        c.is_alphabetic() || c == '_' || c == '\\' || !c.is_ascii()
    }

    fn is_ident_char(c: char) -> bool {
        c.is_alphanumeric() || c == '-' || c == '_' || c == '\\' || !c.is_ascii()
    }

    fn parse_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
                continue;
            }
            if Self::is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn parse_list(&mut self, terminator: Option<char>) -> Result<SelectorList, SelectorError> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex(terminator)?);
            self.skip_ws();
            if !self.eat(',') {
                break;
            }
        }
        Ok(SelectorList(list))
    }

    fn parse_complex(
        &mut self,
        terminator: Option<char>,
    ) -> Result<ComplexSelector, SelectorError> {
        let mut sequence = Vec::new();
        let mut current = self.parse_compound(false)?;
        while let Some(comb) = self.parse_combinator(terminator)? {
            let next = self.parse_compound(true)?;
            sequence.push((current, Some(comb)));
            current = next;
        }
        sequence.push((current, None));
        Ok(ComplexSelector { sequence })
    }

    /// Returns the combinator to the next compound, or `None` when the
    /// complex selector ends here (list comma, nested terminator, or end).
    fn parse_combinator(
        &mut self,
        terminator: Option<char>,
    ) -> Result<Option<Combinator>, SelectorError> {
        let saw_ws = self.skip_ws();
        match self.peek() {
            Some('>') => {
                self.pos += 1;
                self.skip_ws();
                Ok(Some(Combinator::Child))
            }
            Some('+') => {
                self.pos += 1;
                self.skip_ws();
                Ok(Some(Combinator::NextSibling))
            }
            Some('~') => {
                self.pos += 1;
                self.skip_ws();
                Ok(Some(Combinator::SubsequentSibling))
            }
            Some(',') => Ok(None),
            Some(c) if Some(c) == terminator => Ok(None),
            None => Ok(None),
            Some(_) if saw_ws => Ok(Some(Combinator::Descendant)),
            Some(c) => Err(SelectorError::UnexpectedChar(c)),
        }
    }

    fn parse_compound(&mut self, after_combinator: bool) -> Result<CompoundSelector, SelectorError> {
        let mut simples = Vec::new();
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    simples.push(SimpleSelector::Universal);
                }
                Some('#') => {
                    self.pos += 1;
                    let name = self.parse_ident();
                    if name.is_empty() {
                        return Err(self.err_here());
                    }
                    simples.push(SimpleSelector::Id(name));
                }
                Some('.') => {
                    self.pos += 1;
                    let name = self.parse_ident();
                    if name.is_empty() {
                        return Err(self.err_here());
                    }
                    simples.push(SimpleSelector::Class(name));
                }
                Some('[') => simples.push(self.parse_attribute()?),
                Some(':') => simples.push(self.parse_pseudo()?),
                Some(c) if Self::is_ident_start(c) => {
                    simples.push(SimpleSelector::Type(self.parse_ident()));
                }
                _ => break,
            }
        }
        if simples.is_empty() {
            return Err(if after_combinator {
                SelectorError::DanglingCombinator
            } else {
                match self.peek() {
                    Some(c) => SelectorError::UnexpectedChar(c),
                    None => SelectorError::Empty,
                }
            });
        }
        Ok(CompoundSelector { simples })
    }

    fn parse_pseudo(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.pos += 1; // ':'
        if self.eat(':') {
            let name = self.parse_ident();
            return Err(SelectorError::UnsupportedPseudo(format!(":{name}")));
        }
        let name = self.parse_ident().to_lowercase();
        if name.is_empty() {
            return Err(self.err_here());
        }
        if self.eat('(') {
            let inner = match name.as_str() {
                "not" | "is" | "where" => self.parse_list(Some(')'))?,
                _ => return Err(SelectorError::UnsupportedPseudo(name)),
            };
            self.skip_ws();
            if !self.eat(')') {
                return Err(self.err_here());
            }
            return Ok(match name.as_str() {
                "not" => SimpleSelector::Not(inner),
                "is" => SimpleSelector::Is(inner),
                _ => SimpleSelector::Where(inner),
            });
        }
        match name.as_str() {
            "scope" => Ok(SimpleSelector::Scope),
            "first-child" => Ok(SimpleSelector::FirstChild),
            "last-child" => Ok(SimpleSelector::LastChild),
            "empty" => Ok(SimpleSelector::Empty),
            _ => Err(SelectorError::UnsupportedPseudo(name)),
        }
    }

    fn parse_attribute(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.pos += 1; // '['
        self.skip_ws();
        let name = self.parse_ident();
        if name.is_empty() {
            return Err(self.err_here());
        }
        self.skip_ws();

        if self.eat(']') {
            return Ok(SimpleSelector::Attribute {
                name,
                op: AttrOp::Exists,
                value: None,
                case_insensitive: false,
            });
        }

        let op = match self.bump() {
            Some('=') => AttrOp::Equals,
            Some('~') if self.eat('=') => AttrOp::Includes,
            Some('|') if self.eat('=') => AttrOp::DashMatch,
            Some('^') if self.eat('=') => AttrOp::Prefix,
            Some('$') if self.eat('=') => AttrOp::Suffix,
            Some('*') if self.eat('=') => AttrOp::Substring,
            Some(c) => return Err(SelectorError::UnexpectedChar(c)),
            None => return Err(SelectorError::UnexpectedEnd),
        };

        self.skip_ws();
        let value = self.parse_attr_value()?;
        self.skip_ws();

        let mut case_insensitive = false;
        if self.peek().is_some_and(|c| c == 'i' || c == 'I') {
            self.pos += 1;
            case_insensitive = true;
            self.skip_ws();
        } else if self.peek().is_some_and(|c| c == 's' || c == 'S') {
            self.pos += 1;
            self.skip_ws();
        }

        if !self.eat(']') {
            return Err(self.err_here());
        }
        Ok(SimpleSelector::Attribute {
            name,
            op,
            value: Some(value),
            case_insensitive,
        })
    }

    fn parse_attr_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.bump() {
                        Some('\\') => {
                            if let Some(escaped) = self.bump() {
                                out.push(escaped);
                            }
                        }
                        Some(c) if c == quote => return Ok(out),
                        Some(c) => out.push(c),
                        None => return Err(SelectorError::UnexpectedEnd),
                    }
                }
            }
            Some(c) if Self::is_ident_char(c) => Ok(self.parse_ident()),
            Some(c) => Err(SelectorError::UnexpectedChar(c)),
            None => Err(SelectorError::UnexpectedEnd),
        }
    }

    fn err_here(&self) -> SelectorError {
        match self.peek() {
            Some(c) => SelectorError::UnexpectedChar(c),
            None => SelectorError::UnexpectedEnd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(input: &str) -> ComplexSelector {
        let list = parse_selector_list(input).expect("selector should parse");
        assert_eq!(list.0.len(), 1);
        list.0.into_iter().next().unwrap()
    }

    #[test]
    fn parses_compound_of_simples() {
        let complex = one("div.banner#main[href^=\"http\"]");
        assert_eq!(complex.sequence.len(), 1);
        let compound = &complex.sequence[0].0;
        assert_eq!(compound.simples.len(), 4);
        assert_eq!(compound.simples[0], SimpleSelector::Type("div".into()));
        assert_eq!(compound.simples[1], SimpleSelector::Class("banner".into()));
        assert_eq!(compound.simples[2], SimpleSelector::Id("main".into()));
        assert_eq!(
            compound.simples[3],
            SimpleSelector::Attribute {
                name: "href".into(),
                op: AttrOp::Prefix,
                value: Some("http".into()),
                case_insensitive: false,
            }
        );
    }

    #[test]
    fn parses_combinator_sequence() {
        let complex = one("div > .x + span ~ a b");
        let combs: Vec<_> = complex.sequence.iter().map(|(_, c)| *c).collect();
        assert_eq!(
            combs,
            vec![
                Some(Combinator::Child),
                Some(Combinator::NextSibling),
                Some(Combinator::SubsequentSibling),
                Some(Combinator::Descendant),
                None,
            ]
        );
    }

    #[test]
    fn parses_scope_and_nested_lists() {
        let complex = one(":scope > div:not(.ad, #x)");
        assert_eq!(
            complex.sequence[0].0.simples,
            vec![SimpleSelector::Scope]
        );
        let compound = &complex.sequence[1].0;
        assert_eq!(compound.simples[0], SimpleSelector::Type("div".into()));
        match &compound.simples[1] {
            SimpleSelector::Not(list) => assert_eq!(list.0.len(), 2),
            other => panic!("expected :not, got {other:?}"),
        }
    }

    #[test]
    fn selector_list_splits_on_top_level_commas() {
        let list = parse_selector_list("span, .marker").unwrap();
        assert_eq!(list.0.len(), 2);
    }

    #[test]
    fn rejects_unsupported_pseudo() {
        assert_eq!(
            parse_selector_list("div:hover"),
            Err(SelectorError::UnsupportedPseudo("hover".into()))
        );
        assert!(matches!(
            parse_selector_list("div::before"),
            Err(SelectorError::UnsupportedPseudo(_))
        ));
    }

    #[test]
    fn rejects_dangling_combinator() {
        assert_eq!(
            parse_selector_list("div >"),
            Err(SelectorError::DanglingCombinator)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_selector_list("").is_err());
        assert!(parse_selector_list("div)").is_err());
        assert!(parse_selector_list("[=x]").is_err());
    }
}
