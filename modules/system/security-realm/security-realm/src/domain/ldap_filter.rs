//! Filter templates with a `{0}` placeholder.

/// Substitutes `value`, escaped per RFC 4515, for every `{0}` in `template`.
#[must_use]
pub fn expand(template: &str, value: &str) -> String {
    template.replace("{0}", &escape(value))
}

#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_replaced_and_escaped() {
        assert_eq!(expand("(uid={0})", "alice"), "(uid=alice)");
        assert_eq!(expand("(uid={0})", "a*)(x"), "(uid=a\\2a\\29\\28x)");
        assert_eq!(
            expand("(&(cn={0})(sn={0}))", "b\\c"),
            "(&(cn=b\\5cc)(sn=b\\5cc))"
        );
    }
}
