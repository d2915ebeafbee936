//! Query planner.
//!
//! Turns a token stream into an ordered list of executable steps. Native
//! fragments accumulate into one buffer so pure CSS compiles to a single
//! `NativeQuery` step; a combinator is folded into the buffer when the next
//! token is native (declarative bridging) and becomes an explicit step when
//! the next token is an extended predicate (imperative bridging). Fragments
//! flushed after a previous step are prefixed with `:scope` so they run
//! relative to each surviving candidate.

use eh_core::pattern::{CssValuePattern, TextPattern};
use eh_core::selector::parse_selector_list;
use eh_core::steps::{Query, Step, UpwardTarget};

use crate::tokenizer::{tokenize, ExtKind, IrToken};
use crate::ParseError;

/// Hard cap on `:has`/`:not` sub-query nesting.
pub const MAX_SUBQUERY_DEPTH: usize = 16;

/// `:upward(n)` levels above this are treated as a typo in the rule.
const MAX_UPWARD_LEVELS: usize = 256;

/// Plan a token stream into a query.
pub fn plan(tokens: &[IrToken]) -> Result<Query, ParseError> {
    plan_at_depth(tokens, 0)
}

/// Tokenize and plan one rule at the given nesting depth. Sub-queries of
/// `:has`/`:not` re-enter here with `depth + 1`.
pub(crate) fn compile_at_depth(rule: &str, depth: usize) -> Result<Query, ParseError> {
    if depth > MAX_SUBQUERY_DEPTH {
        return Err(ParseError::NestingTooDeep(MAX_SUBQUERY_DEPTH));
    }
    let tokens = tokenize(rule)?;
    plan_at_depth(&tokens, depth)
}

fn plan_at_depth(tokens: &[IrToken], depth: usize) -> Result<Query, ParseError> {
    let mut steps: Query = Vec::new();
    let mut builder = String::new();

    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            IrToken::Raw { literal } => builder.push_str(literal),
            IrToken::Combinator { literal } => match iter.peek() {
                None => return Err(ParseError::DanglingCombinator),
                Some(IrToken::Combinator { .. }) => {
                    return Err(ParseError::ConsecutiveCombinators)
                }
                Some(IrToken::Raw { .. }) => {
                    // Declarative bridging: fold into the native fragment.
                    if *literal == ' ' {
                        if !builder.is_empty() {
                            builder.push(' ');
                        }
                    } else {
                        if !builder.is_empty() {
                            builder.push(' ');
                        }
                        builder.push(*literal);
                        builder.push(' ');
                    }
                }
                Some(IrToken::Extended { .. }) => {
                    // Imperative bridging: the combinator becomes a step of
                    // its own so the predicate sees the shifted set.
                    flush(&mut builder, &mut steps)?;
                    steps.push(match literal {
                        '>' => Step::Child,
                        '+' => Step::NextSibling,
                        '~' => Step::SubsequentSibling,
                        _ => Step::Descendant,
                    });
                }
            },
            IrToken::Extended { ext, name, arg } => {
                flush(&mut builder, &mut steps)?;
                // A filtering predicate at the head of the plan has no
                // candidates yet: bootstrap with a universal native query.
                if ext.requires_context() && steps.is_empty() {
                    steps.push(native_step("*")?);
                }
                steps.push(make_extended(*ext, name, arg, depth)?);
            }
        }
    }
    flush(&mut builder, &mut steps)?;

    if steps.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(steps)
}

fn native_step(source: &str) -> Result<Step, ParseError> {
    Ok(Step::NativeQuery {
        source: source.to_string(),
        selectors: parse_selector_list(source)?,
    })
}

/// Flush the accumulated native fragment, if any, into a `NativeQuery` step.
/// Fragments after a previous step, and fragments led by a combinator, are
/// made candidate-relative with a `:scope` prefix.
fn flush(builder: &mut String, steps: &mut Query) -> Result<(), ParseError> {
    let fragment = builder.trim().to_string();
    builder.clear();
    if fragment.is_empty() {
        return Ok(());
    }
    let needs_scope = (!steps.is_empty() || fragment.starts_with(['>', '+', '~']))
        && !fragment.starts_with(":scope");
    let source = if needs_scope {
        format!(":scope {fragment}")
    } else {
        fragment
    };
    steps.push(native_step(&source)?);
    Ok(())
}

fn make_extended(
    ext: ExtKind,
    name: &str,
    arg: &str,
    depth: usize,
) -> Result<Step, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidArgument {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    match ext {
        ExtKind::Contains => Ok(Step::Contains {
            pattern: TextPattern::parse(arg)?,
        }),
        ExtKind::MatchesPath => Ok(Step::MatchesPath {
            pattern: TextPattern::parse(arg)?,
        }),
        ExtKind::MatchesCss => {
            let parts = split_top_level(arg, ',');
            let (pseudo, decl) = match parts.as_slice() {
                [decl] => (None, *decl),
                [pseudo, decl] => (Some(pseudo.trim().to_string()), *decl),
                _ => return Err(invalid("expected [pseudo, ]property: value")),
            };
            let (property, value) = decl
                .split_once(':')
                .ok_or_else(|| invalid("expected property: value"))?;
            let property = property.trim();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return Err(invalid("expected property: value"));
            }
            Ok(Step::MatchesCss {
                pseudo,
                property: property.to_string(),
                value: CssValuePattern::parse(value)?,
            })
        }
        ExtKind::MatchesAttr => {
            let (raw_name, raw_value) = match split_top_level(arg, '=').as_slice() {
                [name_part] => (*name_part, None),
                [name_part, value_part] => (*name_part, Some(*value_part)),
                _ => return Err(invalid("expected name[=value]")),
            };
            let raw_name = strip_quotes(raw_name.trim());
            if raw_name.is_empty() {
                return Err(invalid("attribute name is empty"));
            }
            let value = raw_value
                .map(|v| TextPattern::parse(strip_quotes(v.trim())))
                .transpose()?;
            Ok(Step::MatchesAttr {
                name: TextPattern::parse(raw_name)?,
                value,
            })
        }
        ExtKind::MinTextLength => {
            let min = arg
                .trim()
                .parse::<usize>()
                .map_err(|_| invalid("expected a non-negative integer"))?;
            Ok(Step::MinTextLength { min })
        }
        ExtKind::Upward => {
            if let Ok(levels) = arg.trim().parse::<usize>() {
                if levels == 0 || levels >= MAX_UPWARD_LEVELS {
                    return Err(invalid("level out of range"));
                }
                return Ok(Step::Upward {
                    target: UpwardTarget::Levels(levels),
                });
            }
            Ok(Step::Upward {
                target: UpwardTarget::Selector {
                    source: arg.to_string(),
                    selectors: parse_selector_list(arg)?,
                },
            })
        }
        ExtKind::Has => Ok(Step::Has {
            source: arg.to_string(),
            alternatives: sub_queries(arg, depth, true)?,
        }),
        ExtKind::Not => Ok(Step::Not {
            source: arg.to_string(),
            alternatives: sub_queries(arg, depth, false)?,
        }),
    }
}

/// Compile each comma-separated alternative of a `:has`/`:not` argument into
/// its own sub-query. `:has` alternatives run relative to the candidate, so
/// they are scoped; `:not` alternatives match anywhere under the candidate.
fn sub_queries(arg: &str, depth: usize, scoped: bool) -> Result<Vec<Query>, ParseError> {
    split_top_level(arg, ',')
        .into_iter()
        .map(|alt| {
            let alt = alt.trim();
            let rule = if scoped && !alt.starts_with(":scope") {
                format!(":scope {alt}")
            } else {
                alt.to_string()
            };
            compile_at_depth(&rule, depth + 1)
        })
        .collect()
}

/// Split at the delimiter, ignoring occurrences inside parentheses,
/// brackets, and quoted strings.
fn split_top_level(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
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
            '(' | '[' if quote.is_none() => depth += 1,
            ')' | ']' if quote.is_none() => depth = depth.saturating_sub(1),
            c if c == delim && depth == 0 && quote.is_none() => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if s.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[s.len() - 1] == bytes[0] {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(rule: &str) -> String {
        compile_at_depth(rule, 0)
            .expect("rule should plan")
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn plan_accepts_a_pre_tokenized_stream() {
        let tokens = tokenize("div:contains(ad)").unwrap();
        let steps = plan(&tokens).unwrap();
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn matches_css_accepts_an_optional_pseudo_part() {
        assert_eq!(
            display("div:matches-css(before, content: *Ad*)"),
            "Raw(div) :MatchesCSS(before, content: *Ad*)"
        );
        assert!(matches!(
            compile_at_depth("div:matches-css(nonsense)", 0),
            Err(ParseError::InvalidArgument { .. })
        ));
        assert!(matches!(
            compile_at_depth("div:matches-css(color:)", 0),
            Err(ParseError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn matches_attr_quotes_and_value_are_optional() {
        assert_eq!(
            display("div:matches-attr(\"data-ad\"=\"unit\")"),
            "Raw(div) :MatchesAttr(data-ad=unit)"
        );
        assert_eq!(
            display("div:matches-attr(/^data-/)"),
            "Raw(div) :MatchesAttr(/^data-/)"
        );
    }

    #[test]
    fn upward_levels_are_range_checked() {
        assert!(matches!(
            compile_at_depth("div:upward(0)", 0),
            Err(ParseError::InvalidArgument { .. })
        ));
        assert!(matches!(
            compile_at_depth("div:upward(300)", 0),
            Err(ParseError::InvalidArgument { .. })
        ));
        assert_eq!(display("div:upward(.banner)"), "Raw(div) :Upward(.banner)");
    }

    #[test]
    fn min_text_length_requires_an_integer_argument() {
        assert!(matches!(
            compile_at_depth("div:min-text-length(lots)", 0),
            Err(ParseError::InvalidArgument { .. })
        ));
        assert_eq!(
            display("div:min-text-length(120)"),
            "Raw(div) :MinTextLength(120)"
        );
    }

    #[test]
    fn has_alternatives_are_scoped_sub_queries() {
        let steps = compile_at_depth("div:has(.ad, span:contains(x))", 0).unwrap();
        let Step::Has { alternatives, .. } = &steps[1] else {
            panic!("expected a Has step");
        };
        assert_eq!(alternatives.len(), 2);
        assert_eq!(alternatives[0][0].to_string(), "Raw(:scope .ad)");
        assert_eq!(alternatives[1][0].to_string(), "Raw(:scope span)");
        assert_eq!(alternatives[1][1].to_string(), ":Contains(x)");
    }

    #[test]
    fn splitting_ignores_nested_delimiters() {
        assert_eq!(
            split_top_level("a[x=\",\"], b(c, d), e", ','),
            vec!["a[x=\",\"]", " b(c, d)", " e"]
        );
        assert_eq!(split_top_level("name=\"a=b\"", '='), vec!["name", "\"a=b\""]);
    }

    #[test]
    fn whitespace_only_rule_is_empty() {
        assert!(matches!(
            compile_at_depth("   ", 0),
            Err(ParseError::Empty)
        ));
    }
}
