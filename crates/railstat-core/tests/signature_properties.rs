use proptest::prelude::*;
use railstat_core::normalize_url;

// Paths built from the characters Rails routes actually carry. Dates, months,
// format suffixes and slugs are generated explicitly so the folding rules get
// exercised.
fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9_-]{0,8}",
        "[0-9]{1,6}",
        "[0-9]{4}-[0-9]{2}",
        "[0-9]{4}-[0-9]{2}-[0-9]{2}",
        "[0-9]{1,6}\\.(json|xml|csv)",
        "[0-9]{1,4}-[a-z][a-z0-9-]{0,8}",
        "[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}\\.[a-z]{2,4}",
        "[A-Z][a-zA-Z]{0,6}",
    ]
}

fn path() -> impl Strategy<Value = String> {
    (prop::collection::vec(segment(), 0..6), any::<bool>()).prop_map(|(segments, trailing)| {
        let mut path = format!("/{}", segments.join("/"));
        if trailing && path.len() > 1 {
            path.push('/');
        }
        path
    })
}

proptest! {
    #[test]
    fn normalization_is_idempotent(p in path()) {
        let once = normalize_url(&p);
        prop_assert_eq!(normalize_url(&once), once);
    }

    #[test]
    fn no_segment_starts_with_a_digit(p in path()) {
        let normalized = normalize_url(&p);
        for segment in normalized.split('/').skip(1) {
            prop_assert!(
                !segment.starts_with(|c: char| c.is_ascii_digit()),
                "{} -> {}",
                p,
                normalized
            );
        }
    }

    #[test]
    fn non_root_paths_end_with_slash(p in path()) {
        let normalized = normalize_url(&p);
        prop_assert!(normalized.starts_with('/'));
        prop_assert!(normalized.ends_with('/'));
    }

    #[test]
    fn host_and_query_do_not_change_the_signature(
        p in path(),
        host in "[a-z]{1,8}\\.(com|org|nu)(:[0-9]{2,5})?",
        query in "[a-z]{1,5}=[a-z0-9]{0,5}(&[a-z]{1,5}=[a-z0-9]{0,5}){0,2}",
    ) {
        let full = format!("https://{}{}?{}", host, p, query);
        prop_assert_eq!(normalize_url(&full), normalize_url(&p));
    }

    #[test]
    fn case_does_not_change_the_signature(p in path()) {
        prop_assert_eq!(normalize_url(&p.to_uppercase()), normalize_url(&p));
    }
}
