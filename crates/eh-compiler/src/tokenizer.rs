//! Rule tokenizer.
//!
//! Walks one rule string and produces the intermediate token stream: raw
//! structural fragments, combinator literals, and extended-predicate
//! invocations with their raw argument text. Simple selectors accumulate
//! into a raw buffer (attribute blocks are captured whole, without
//! descending into their internal grammar); a registry pseudo-class flushes
//! the buffer and becomes an `Extended` token; an unknown pseudo-class is
//! passed through verbatim to the native grammar.

use std::fmt;

use serde::Serialize;

use crate::ParseError;

/// Names of supported extended pseudo-classes, used both by the registry
/// lookup and by the extended-`:not` argument probe.
const REGISTRY_NAMES: &[&str] = &[
    "contains",
    "has-text",
    "-abp-contains",
    "matches-css",
    "matches-path",
    "matches-attr",
    "min-text-length",
    "upward",
    "has",
    "-abp-has",
];

/// The closed set of extended predicate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtKind {
    Contains,
    MatchesCss,
    MatchesPath,
    MatchesAttr,
    MinTextLength,
    Upward,
    Has,
    Not,
}

impl ExtKind {
    /// Whether the predicate is a filter/traversal that needs a non-empty
    /// starting candidate set. `matches-path` ignores its input's identity.
    pub fn requires_context(self) -> bool {
        !matches!(self, ExtKind::MatchesPath)
    }
}

/// Registry lookup by (lowercased) pseudo-class name, aliases included.
pub fn lookup(name: &str) -> Option<ExtKind> {
    match name {
        "contains" | "has-text" | "-abp-contains" => Some(ExtKind::Contains),
        "matches-css" => Some(ExtKind::MatchesCss),
        "matches-path" => Some(ExtKind::MatchesPath),
        "matches-attr" => Some(ExtKind::MatchesAttr),
        "min-text-length" => Some(ExtKind::MinTextLength),
        "upward" => Some(ExtKind::Upward),
        "has" | "-abp-has" => Some(ExtKind::Has),
        _ => None,
    }
}

/// `:not` stays native unless its argument itself uses extended predicates.
/// Quoted attribute values are skipped so text like `[x=":has(a)"]` cannot
/// make the argument look extended.
fn uses_extended(arg: &str) -> bool {
    let mut outside = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in arg.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            q @ ('"' | '\'') => match quote {
                Some(open) if open == q => quote = None,
                Some(_) => {}
                None => quote = Some(q),
            },
            c if quote.is_none() => outside.push(c),
            _ => {}
        }
    }
    let lower = outside.to_lowercase();
    REGISTRY_NAMES
        .iter()
        .any(|name| lower.contains(&format!(":{name}(")))
}

/// Intermediate representation token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IrToken {
    /// Native structural fragment, passed to the host grammar verbatim.
    Raw { literal: String },
    /// One of ' ', '>', '+', '~'.
    Combinator { literal: char },
    /// Extended predicate invocation with its raw argument text.
    Extended {
        ext: ExtKind,
        name: String,
        arg: String,
    },
}

impl fmt::Display for IrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrToken::Raw { literal } => write!(f, "Raw({literal})"),
            IrToken::Combinator { literal } => write!(f, "Comb({literal})"),
            IrToken::Extended { name, arg, .. } => write!(f, "Ext(:{name}({arg}))"),
        }
    }
}

/// Re-serialize a token stream to its canonical rule text. Tokenizing the
/// result yields the same stream back.
pub fn canonical(tokens: &[IrToken]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            IrToken::Raw { literal } => out.push_str(literal),
            IrToken::Combinator { literal } => out.push(*literal),
            IrToken::Extended { name, arg, .. } => {
                out.push(':');
                out.push_str(name);
                out.push('(');
                out.push_str(arg);
                out.push(')');
            }
        }
    }
    out
}

/// Tokenize one rule into its intermediate representation.
pub fn tokenize(rule: &str) -> Result<Vec<IrToken>, ParseError> {
    Lexer::new(rule).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
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

    fn run(&mut self) -> Result<Vec<IrToken>, ParseError> {
        let mut out = Vec::new();
        let mut buf = String::new();
        let mut pending_ws = false;

        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                pending_ws = true;
                self.pos += 1;
                continue;
            }
            if matches!(c, '>' | '+' | '~') {
                flush_raw(&mut buf, &mut out);
                out.push(IrToken::Combinator { literal: c });
                pending_ws = false;
                self.pos += 1;
                continue;
            }

            // Start of a compound part: pending whitespace between two parts
            // is the descendant combinator.
            let follows_part = !buf.is_empty()
                || matches!(
                    out.last(),
                    Some(IrToken::Raw { .. } | IrToken::Extended { .. })
                );
            if pending_ws && follows_part {
                flush_raw(&mut buf, &mut out);
                out.push(IrToken::Combinator { literal: ' ' });
            }
            pending_ws = false;

            match c {
                '#' | '.' => {
                    self.pos += 1;
                    let ident = self.ident();
                    if ident.is_empty() {
                        return Err(self.err_here());
                    }
                    buf.push(c);
                    buf.push_str(&ident);
                }
                '*' => {
                    buf.push('*');
                    self.pos += 1;
                }
                '[' => buf.push_str(&self.bracket_block()?),
                ':' => self.pseudo(&mut buf, &mut out)?,
                c if is_ident_start(c) => buf.push_str(&self.ident()),
                c => return Err(ParseError::UnexpectedChar(c)),
            }
        }

        flush_raw(&mut buf, &mut out);
        Ok(out)
    }

    fn pseudo(&mut self, buf: &mut String, out: &mut Vec<IrToken>) -> Result<(), ParseError> {
        self.pos += 1; // ':'

        // Pseudo-elements pass through to the native grammar untouched.
        if self.peek() == Some(':') {
            self.pos += 1;
            let name = self.ident();
            buf.push_str("::");
            buf.push_str(&name);
            if self.peek() == Some('(') {
                let (_, raw) = self.paren_block()?;
                buf.push_str(&raw);
            }
            return Ok(());
        }

        let name = self.ident();
        if name.is_empty() {
            return Err(self.err_here());
        }
        let name_lc = name.to_lowercase();

        let arg = if self.peek() == Some('(') {
            Some(self.paren_block()?)
        } else {
            None
        };

        let ext = lookup(&name_lc).or_else(|| {
            (name_lc == "not"
                && arg.as_ref().is_some_and(|(inner, _)| uses_extended(inner)))
            .then_some(ExtKind::Not)
        });

        match ext {
            Some(ext) => {
                let Some((inner, _)) = arg else {
                    return Err(ParseError::MissingArgument(name_lc));
                };
                let inner = inner.trim().to_string();
                if inner.is_empty() {
                    return Err(ParseError::MissingArgument(name_lc));
                }
                flush_raw(buf, out);
                out.push(IrToken::Extended {
                    ext,
                    name: name_lc,
                    arg: inner,
                });
            }
            None => {
                buf.push(':');
                buf.push_str(&name);
                if let Some((_, raw)) = arg {
                    buf.push_str(&raw);
                }
            }
        }
        Ok(())
    }

    /// Consume a balanced `(...)` block. Returns (inner text, raw text with
    /// parentheses), quote- and escape-aware.
    fn paren_block(&mut self) -> Result<(String, String), ParseError> {
        self.pos += 1; // '('
        let mut inner = String::new();
        let mut depth = 1usize;
        loop {
            match self.bump() {
                Some('\\') => {
                    inner.push('\\');
                    if let Some(escaped) = self.bump() {
                        inner.push(escaped);
                    }
                }
                Some(quote @ ('"' | '\'')) => {
                    inner.push(quote);
                    self.quoted_into(&mut inner, quote)?;
                }
                Some('(') => {
                    depth += 1;
                    inner.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok((inner.clone(), format!("({inner})")));
                    }
                    inner.push(')');
                }
                Some(c) => inner.push(c),
                None => return Err(ParseError::Unterminated('(')),
            }
        }
    }

    /// Consume a `[...]` attribute block whole.
    fn bracket_block(&mut self) -> Result<String, ParseError> {
        self.pos += 1; // '['
        let mut out = String::from("[");
        loop {
            match self.bump() {
                Some('\\') => {
                    out.push('\\');
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                Some(quote @ ('"' | '\'')) => {
                    out.push(quote);
                    self.quoted_into(&mut out, quote)?;
                }
                Some(']') => {
                    out.push(']');
                    return Ok(out);
                }
                Some(c) => out.push(c),
                None => return Err(ParseError::Unterminated('[')),
            }
        }
    }

    /// Consume the rest of a quoted string (opening quote already taken).
    fn quoted_into(&mut self, out: &mut String, quote: char) -> Result<(), ParseError> {
        loop {
            match self.bump() {
                Some('\\') => {
                    out.push('\\');
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                Some(c) => {
                    out.push(c);
                    if c == quote {
                        return Ok(());
                    }
                }
                None => return Err(ParseError::Unterminated(quote)),
            }
        }
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                out.push('\\');
                self.pos += 1;
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
                continue;
            }
            if is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    fn err_here(&self) -> ParseError {
        match self.peek() {
            Some(c) => ParseError::UnexpectedChar(c),
            None => ParseError::Unterminated(':'),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '\\' || !c.is_ascii()
}

fn flush_raw(buf: &mut String, out: &mut Vec<IrToken>) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        out.push(IrToken::Raw {
            literal: trimmed.to_string(),
        });
    }
    buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(rule: &str) -> String {
        tokenize(rule)
            .expect("rule should tokenize")
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn simple_selectors_accumulate_into_raw() {
        assert_eq!(stream("div"), "Raw(div)");
        assert_eq!(stream("a[href^=\"http\"]"), "Raw(a[href^=\"http\"])");
        assert_eq!(stream("div:not(.ad)"), "Raw(div:not(.ad))");
        assert_eq!(stream("section:where(.x, .y)"), "Raw(section:where(.x, .y))");
    }

    #[test]
    fn combinators_split_raw_fragments() {
        assert_eq!(
            stream("div>.x+span~a"),
            "Raw(div) Comb(>) Raw(.x) Comb(+) Raw(span) Comb(~) Raw(a)"
        );
        assert_eq!(stream("div :not(.ad)"), "Raw(div) Comb( ) Raw(:not(.ad))");
    }

    #[test]
    fn extended_pseudo_classes_become_tokens() {
        assert_eq!(stream("div:contains(ad)"), "Raw(div) Ext(:contains(ad))");
        assert_eq!(
            stream("div.banner:matches-css(color: red)"),
            "Raw(div.banner) Ext(:matches-css(color: red))"
        );
        assert_eq!(
            stream(":matches-path(/^\\/shop/) .card"),
            "Ext(:matches-path(/^\\/shop/)) Comb( ) Raw(.card)"
        );
        assert_eq!(stream("div:upward(3)"), "Raw(div) Ext(:upward(3))");
        assert_eq!(stream("div:has-text(Ad)"), "Raw(div) Ext(:has-text(Ad))");
    }

    #[test]
    fn adjacent_extended_tokens_keep_their_combinator() {
        assert_eq!(
            stream("div:upward(3)~:contains(ad)"),
            "Raw(div) Ext(:upward(3)) Comb(~) Ext(:contains(ad))"
        );
        assert_eq!(
            stream(":upward(1)+:upward(2)"),
            "Ext(:upward(1)) Comb(+) Ext(:upward(2))"
        );
        assert_eq!(
            stream("> .x:contains(y)"),
            "Comb(>) Raw(.x) Ext(:contains(y))"
        );
    }

    #[test]
    fn trailing_combinator_still_tokenizes() {
        // The planner, not the tokenizer, rejects dangling combinators.
        assert_eq!(stream("div >"), "Raw(div) Comb(>)");
    }

    #[test]
    fn not_passes_through_unless_argument_is_extended() {
        assert_eq!(stream("div:not(.ad)"), "Raw(div:not(.ad))");
        assert_eq!(
            stream("div:not(:contains(x))"),
            "Raw(div) Ext(:not(:contains(x)))"
        );
    }

    #[test]
    fn quoted_predicate_text_does_not_make_not_extended() {
        assert_eq!(
            stream("div:not([x=\":has(a)\"])"),
            "Raw(div:not([x=\":has(a)\"]))"
        );
        // real extended use next to a quoted decoy is still detected
        assert_eq!(
            stream("div:not([x=':has(a)'], :contains(y))"),
            "Raw(div) Ext(:not([x=':has(a)'], :contains(y)))"
        );
    }

    #[test]
    fn missing_or_empty_argument_is_fatal() {
        assert!(matches!(
            tokenize("div:contains"),
            Err(ParseError::MissingArgument(_))
        ));
        assert!(matches!(
            tokenize("div:has()"),
            Err(ParseError::MissingArgument(_))
        ));
    }

    #[test]
    fn unterminated_blocks_are_fatal() {
        assert!(matches!(
            tokenize("div:contains(ad"),
            Err(ParseError::Unterminated('('))
        ));
        assert!(matches!(
            tokenize("a[href"),
            Err(ParseError::Unterminated('['))
        ));
    }

    #[test]
    fn canonical_round_trips() {
        for rule in [
            "div>.x+span~a",
            "div :not(.ad)",
            "div:contains(ad)",
            ":matches-path(/^\\/shop/) .card",
            "div:upward(3)~:contains(ad)",
            "a[href^=\"http\"].x#y",
        ] {
            let tokens = tokenize(rule).unwrap();
            let canon = canonical(&tokens);
            assert_eq!(tokenize(&canon).unwrap(), tokens, "round-trip of {rule:?}");
        }
    }
}
