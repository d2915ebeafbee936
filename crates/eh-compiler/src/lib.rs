//! Elemhide Rule Compiler
//!
//! Compiles one extended-selector rule string into an executable `Query`:
//! `tokenize` turns the rule into an intermediate token stream, `plan` turns
//! that stream into an ordered list of steps, bridging native fragments and
//! imperative extended predicates.

use thiserror::Error;

use eh_core::pattern::PatternError;
use eh_core::selector::SelectorError;
use eh_core::steps::Query;

pub mod planner;
pub mod tokenizer;

pub use planner::{plan, MAX_SUBQUERY_DEPTH};
pub use tokenizer::{canonical, tokenize, ExtKind, IrToken};

/// A rule-compilation failure. Scoped to one rule: the caller drops the rule
/// and moves on.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected character '{0}' in rule")]
    UnexpectedChar(char),
    #[error("unterminated '{0}'")]
    Unterminated(char),
    #[error(":{0}: expected an argument")]
    MissingArgument(String),
    #[error(":{name}: invalid argument: {reason}")]
    InvalidArgument { name: String, reason: String },
    #[error("dangling combinator")]
    DanglingCombinator,
    #[error("multiple subsequent combinators")]
    ConsecutiveCombinators,
    #[error("sub-query nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("invalid native fragment: {0}")]
    Selector(#[from] SelectorError),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("empty rule")]
    Empty,
}

/// Compile one rule: tokenize, then plan.
pub fn compile(rule: &str) -> Result<Query, ParseError> {
    let query = planner::compile_at_depth(rule, 0)?;
    log::debug!("compiled rule {rule:?} into {} steps", query.len());
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(rule: &str) -> String {
        compile(rule)
            .expect("rule should compile")
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn pure_css_stays_in_one_native_step() {
        assert_eq!(display("div"), "Raw(div)");
        assert_eq!(display("a[href^=\"http\"]"), "Raw(a[href^=\"http\"])");
        assert_eq!(display("div:not(.ad)"), "Raw(div:not(.ad))");
        assert_eq!(display("section:where(.x, .y)"), "Raw(section:where(.x, .y))");
        // Pure CSS with combinators is bridged into a single native fragment.
        assert_eq!(display("div>.x+span~a"), "Raw(div > .x + span ~ a)");
    }

    #[test]
    fn extended_predicates_split_into_steps() {
        assert_eq!(display("div:contains(ad)"), "Raw(div) :Contains(ad)");
        assert_eq!(
            display("div.banner:matches-css(color: red)"),
            "Raw(div.banner) :MatchesCSS(color: red)"
        );
        assert_eq!(display("div:upward(3)"), "Raw(div) :Upward(3)");
        assert_eq!(display("div:has(.ad-marker)"), "Raw(div) :Has(.ad-marker)");
    }

    #[test]
    fn later_fragments_are_scoped_to_the_candidate() {
        assert_eq!(
            display(":matches-path(/^\\/shop/) .card"),
            ":MatchesPath(/^\\/shop/) Raw(:scope .card)"
        );
    }

    #[test]
    fn combinator_before_extended_bridges_imperatively() {
        assert_eq!(
            display("div:upward(3)~:contains(ad)"),
            "Raw(div) :Upward(3) SubsSiblComb :Contains(ad)"
        );
        assert_eq!(display(".x > :contains(y)"), "Raw(.x) ChildComb :Contains(y)");
    }

    #[test]
    fn leading_extended_step_bootstraps_context() {
        assert_eq!(
            display(":upward(1)+:upward(2)"),
            "Raw(*) :Upward(1) NextSiblComb :Upward(2)"
        );
        // :matches-path ignores its input set, so no bootstrap is needed.
        assert_eq!(display(":matches-path(/shop/)"), ":MatchesPath(/shop/)");
    }

    #[test]
    fn dangling_combinator_fails() {
        assert!(matches!(compile("div >"), Err(ParseError::DanglingCombinator)));
    }

    #[test]
    fn consecutive_combinators_fail() {
        assert!(matches!(
            compile("~~~~invalid css syntax~~~~~"),
            Err(ParseError::ConsecutiveCombinators)
        ));
    }

    #[test]
    fn extended_not_is_compiled_when_its_argument_is_extended() {
        assert_eq!(
            display("div:not(:contains(x))"),
            "Raw(div) :Not(:contains(x))"
        );
    }

    #[test]
    fn nesting_depth_is_guarded() {
        let mut rule = ".x".to_string();
        for _ in 0..20 {
            rule = format!("div:has({rule})");
        }
        assert!(matches!(
            compile(&rule),
            Err(ParseError::NestingTooDeep(_))
        ));
    }
}
