//! Object path construction from arbitrary identifiers.
//!
//! `make_path` is not a general-purpose escape: it produces a conforming
//! D-Bus object path, but the mapping is not reversible (a literal `_` in
//! the input becomes `_5f` in the output, indistinguishable from an escaped
//! byte). That is deliberate, not an oversight — see the note in
//! `DESIGN.md`.

use std::fmt::Write;

/// Joins `root` with one or more path components, percent-escaping (in the
/// `_xx` hex form, not `%xx`) every byte outside `[A-Za-z0-9]` in each
/// component so the result is always a valid D-Bus object path.
pub fn make_path<I, S>(root: &str, components: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::from(root.trim_end_matches('/'));
    for component in components {
        out.push('/');
        encode_component(component.as_ref(), &mut out);
    }
    out
}

fn encode_component(component: &str, out: &mut String) {
    for b in component.bytes() {
        if b.is_ascii_alphanumeric() {
            out.push(b as char);
        } else {
            write!(out, "_{:02x}", b).expect("writing to a String cannot fail");
        }
    }
}

#[cfg(test)]
mod test {
    use super::make_path;

    #[test]
    fn passthrough_alnum() {
        assert_eq!(make_path("/x", ["abc"]), "/x/abc");
    }

    #[test]
    fn dot_is_escaped() {
        assert_eq!(make_path("/com/example", ["foo.bar"]), "/com/example/foo_2ebar");
    }

    #[test]
    fn slash_is_escaped() {
        assert_eq!(make_path("/x", ["a/b"]), "/x/a_2fb");
    }

    #[test]
    fn underscore_is_escaped_not_reserved() {
        // Not reversible: a literal underscore is indistinguishable from an escaped byte.
        assert_eq!(make_path("/x", ["a_b"]), "/x/a_5fb");
    }

    #[test]
    fn multiple_components_are_joined() {
        assert_eq!(make_path("/x", ["a", "b.c"]), "/x/a/b_2ec");
    }

    #[test]
    fn output_matches_valid_path_grammar() {
        let re_chars = |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'/');
        let p = make_path("/com/example", ["weird name!@#"]);
        assert!(p.starts_with('/'));
        assert!(re_chars(&p));
    }
}
