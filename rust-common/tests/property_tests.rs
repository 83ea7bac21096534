//! Property-based tests for rust-common crate.
//!
//! These tests verify universal properties across all inputs using proptest.

use proptest::prelude::*;
use rust_common::{HttpConfig, LogLevel};
use std::time::Duration;

fn level_strategy() -> impl Strategy<Value = LogLevel> {
    prop::sample::select(LogLevel::ALL.to_vec())
}

/// Randomly flips the case of each character.
fn mixed_case(s: &str, mask: &[bool]) -> String {
    s.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Level names parse regardless of case.
    #[test]
    fn prop_level_names_parse_in_any_case(
        level in level_strategy(),
        mask in prop::collection::vec(any::<bool>(), 1..6),
    ) {
        let name = mixed_case(level.as_str(), &mask);
        prop_assert_eq!(name.parse::<LogLevel>().unwrap(), level);
    }

    /// Anything that is not a level name is rejected with the full list of options.
    #[test]
    fn prop_unknown_levels_rejected(s in "[a-zA-Z]{1,12}") {
        prop_assume!(LogLevel::ALL.iter().all(|l| !l.as_str().eq_ignore_ascii_case(&s)));

        let err = s.parse::<LogLevel>().unwrap_err().to_string();
        let quoted = format!("'{s}'");
        prop_assert!(err.contains(&quoted));
        prop_assert!(err.contains(r#""TRACE", "DEBUG", "INFO", "WARN", "ERROR""#));
    }

    /// Display and parse agree for every level.
    #[test]
    fn prop_level_display_parses_back(level in level_strategy()) {
        prop_assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
    }

    /// Builder methods only touch the field they name.
    #[test]
    fn prop_http_config_builder_isolated(secs in 1u64..600) {
        let base = HttpConfig::default();
        let config = HttpConfig::default().with_timeout(Duration::from_secs(secs));

        prop_assert_eq!(config.timeout, Duration::from_secs(secs));
        prop_assert_eq!(config.connect_timeout, base.connect_timeout);
        prop_assert_eq!(config.follow_redirects, base.follow_redirects);
        prop_assert_eq!(config.user_agent, base.user_agent);
    }
}
