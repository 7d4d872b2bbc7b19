use ormlens_sql::{normalize, normalize_fallback};
use proptest::prelude::*;

const TEMPLATES: &[&str] = &[
    "SELECT * FROM orders WHERE user_id = {n}",
    "SELECT id, total FROM orders o WHERE o.user_id = {n} AND o.status = {s} LIMIT {n}",
    "select * from comments where post_id = {n} order by created_at desc limit {n} offset {n}",
    "SELECT * FROM users WHERE id IN ({n}, {n}, {n})",
    "UPDATE users SET name = {s}, score = {f} WHERE id = {n}",
    "DELETE FROM sessions WHERE expires_at < {s} AND user_id = {n}",
    "SELECT u.* FROM users u JOIN orders o ON o.user_id = u.id WHERE o.total > {f} AND u.active = {b}",
    "INSERT INTO audit (actor, action, at) VALUES ({s}, {s}, {n})",
];

fn string_literal() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _%@.'-]{0,16}".prop_map(|s| format!("'{}'", s.replace('\'', "''")))
}

fn render(template: &str, ints: &[i64], strings: &[String], floats: &[f64], bools: &[bool]) -> String {
    let mut out = String::new();
    let mut rest = template;
    let (mut i, mut s, mut f, mut b) = (0usize, 0usize, 0usize, 0usize);
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let kind = &rest[pos + 1..pos + 2];
        match kind {
            "n" => {
                out.push_str(&ints[i % ints.len()].to_string());
                i += 1;
            }
            "s" => {
                out.push_str(&strings[s % strings.len()]);
                s += 1;
            }
            "f" => {
                out.push_str(&format!("{:.2}", floats[f % floats.len()]));
                f += 1;
            }
            _ => {
                out.push_str(if bools[b % bools.len()] { "TRUE" } else { "false" });
                b += 1;
            }
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

proptest! {
    #[test]
    fn normalize_is_literal_invariant(
        t in 0..TEMPLATES.len(),
        ints_a in prop::collection::vec(0i64..1_000_000, 4),
        ints_b in prop::collection::vec(-1_000i64..1_000_000, 4),
        strings_a in prop::collection::vec(string_literal(), 3),
        strings_b in prop::collection::vec(string_literal(), 3),
        floats_a in prop::collection::vec(0.0f64..10_000.0, 2),
        floats_b in prop::collection::vec(0.0f64..10_000.0, 2),
        bools_a in prop::collection::vec(any::<bool>(), 1),
        bools_b in prop::collection::vec(any::<bool>(), 1),
    ) {
        let a = render(TEMPLATES[t], &ints_a, &strings_a, &floats_a, &bools_a);
        let b = render(TEMPLATES[t], &ints_b, &strings_b, &floats_b, &bools_b);
        prop_assert_eq!(normalize(&a), normalize(&b));
    }

    #[test]
    fn normalize_is_deterministic_and_idempotent(
        t in 0..TEMPLATES.len(),
        ints in prop::collection::vec(0i64..1_000_000, 4),
        strings in prop::collection::vec(string_literal(), 3),
        floats in prop::collection::vec(0.0f64..10_000.0, 2),
        bools in prop::collection::vec(any::<bool>(), 1),
    ) {
        let sql = render(TEMPLATES[t], &ints, &strings, &floats, &bools);
        let once = normalize(&sql);
        prop_assert_eq!(&once, &normalize(&sql));
        let once = once.expect("templates are never empty");
        prop_assert_eq!(normalize(&once), Some(once.clone()));
    }

    #[test]
    fn fallback_agrees_with_structured_path(
        t in 0..TEMPLATES.len(),
        ints in prop::collection::vec(0i64..1_000_000, 4),
        strings in prop::collection::vec(string_literal(), 3),
        floats in prop::collection::vec(0.0f64..10_000.0, 2),
        bools in prop::collection::vec(any::<bool>(), 1),
    ) {
        let sql = render(TEMPLATES[t], &ints, &strings, &floats, &bools);
        prop_assert_eq!(normalize(&sql), normalize_fallback(&sql));
    }
}
