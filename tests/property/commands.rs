//! Property-based tests for command classification.
//!
//! Uses proptest to verify:
//! 1. Any casing of a reserved token classifies as that command, while
//!    surrounding whitespace makes it a normal message.
//! 2. Content that differs from every token classifies as a normal message.
//! 3. Classification never panics on arbitrary input.

use chatpump_proto::command::{Classification, CommandSet, matches_token};
use proptest::prelude::*;

// --- Strategies ---

/// Strategy for generating a command-shaped token (`!` followed by a word).
fn arb_token() -> impl Strategy<Value = String> {
    "![a-z]{1,12}"
}

/// Strategy for generating non-empty whitespace padding.
fn arb_padding() -> impl Strategy<Value = String> {
    "[ \t\n]{1,4}"
}

/// Randomly flips the ASCII case of each character.
fn arb_recased(token: String) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<bool>(), token.len()).prop_map(move |flips| {
        token
            .chars()
            .zip(flips)
            .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
            .collect()
    })
}

// --- Property tests ---

proptest! {
    /// A reserved token matches regardless of case.
    #[test]
    fn recased_token_is_command(
        (token, recased) in arb_token().prop_flat_map(|t| (Just(t.clone()), arb_recased(t))),
    ) {
        let set = CommandSet::new([token.as_str()]).expect("token is valid");
        prop_assert_eq!(set.classify(&recased), Classification::Command(token.clone()));
        prop_assert!(matches_token(&recased, &token));
    }

    /// Whitespace around a token turns it into a normal message.
    #[test]
    fn padded_token_is_normal(
        token in arb_token(),
        padding in arb_padding(),
        leading in any::<bool>(),
    ) {
        let set = CommandSet::new([token.as_str()]).expect("token is valid");
        let content = if leading {
            format!("{padding}{token}")
        } else {
            format!("{token}{padding}")
        };
        prop_assert_eq!(set.classify(&content), Classification::Normal);
        prop_assert!(!matches_token(&content, &token));
    }

    /// Content with extra non-whitespace text around a token is never a command.
    #[test]
    fn token_with_suffix_is_normal(token in arb_token(), suffix in "[a-z0-9]{1,8}") {
        let set = CommandSet::new([token.as_str()]).expect("token is valid");
        let content = format!("{token}{suffix}");
        prop_assert_eq!(set.classify(&content), Classification::Normal);
    }

    /// Classification of arbitrary text never panics.
    #[test]
    fn classify_arbitrary_text_no_panic(content in ".*") {
        let set = CommandSet::default();
        let _ = set.classify(&content);
    }
}
