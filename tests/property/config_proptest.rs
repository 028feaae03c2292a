//! Property-based tests for adapter names

use cinder::shared::AdapterKind;
use proptest::prelude::*;

fn recase(name: &str, mask: &[bool]) -> String {
    name.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
        .collect()
}

proptest! {
    #[test]
    fn test_adapter_names_ignore_case(
        mask in prop::collection::vec(any::<bool>(), 1..16),
        pick in 0usize..3,
    ) {
        let (name, kind) = [
            ("memory", AdapterKind::Memory),
            ("redis", AdapterKind::Cache),
            ("documentStore", AdapterKind::DocumentStore),
        ][pick];

        let parsed: AdapterKind = recase(name, &mask).parse().unwrap();
        prop_assert_eq!(parsed, kind);
    }

    #[test]
    fn test_unknown_adapter_names_are_rejected(name in "[a-z]{3,12}") {
        let known = [
            "memory", "local", "cache", "redis", "documentstore", "mongodb", "mongo",
        ];
        prop_assume!(!known.contains(&name.as_str()));
        prop_assert!(name.parse::<AdapterKind>().is_err());
    }

    #[test]
    fn test_display_parses_back(pick in 0usize..3) {
        let kind = [AdapterKind::Memory, AdapterKind::Cache, AdapterKind::DocumentStore][pick];
        prop_assert_eq!(kind.to_string().parse::<AdapterKind>().unwrap(), kind);
    }
}
