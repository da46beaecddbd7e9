/// Canonical phone text: ASCII digits only, with a single `+` prefix kept
/// when a `+` appears before the first digit.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut plus_seen = false;
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            if out.is_empty() && plus_seen {
                out.push('+');
            }
            out.push(ch);
        } else if ch == '+' && out.is_empty() {
            plus_seen = true;
        }
    }
    if out.is_empty() && plus_seen {
        // A lone "+" carries no number.
        return String::new();
    }
    out
}

/// True when the normalized form matches `^\+?\d{7,15}$`.
pub fn looks_like_phone(text: &str) -> bool {
    let n = normalize(text);
    let digits = n.strip_prefix('+').unwrap_or(&n);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Normalized phone, or `None` when nothing survives normalization.
pub fn normalize_optional(raw: &str) -> Option<String> {
    let n = normalize(raw);
    if n.is_empty() {
        None
    } else {
        Some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting_and_keeps_leading_plus() {
        assert_eq!(normalize("+968 9234 5678"), "+96892345678");
        assert_eq!(normalize("(+968) 9234-5678"), "+96892345678");
        assert_eq!(normalize("0501 234 567"), "0501234567");
        assert_eq!(normalize("050+123"), "050123");
        assert_eq!(normalize("abc"), "");
        assert_eq!(normalize("+"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "+968 9234 5678",
            "++12 34",
            " 05-01 ",
            "٠٥٠١٢٣",
            "+",
            "tel: +1 (555) 010-9999 ext 7",
            "",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn phone_shape_window() {
        assert!(looks_like_phone("+968 9234 5678"));
        assert!(looks_like_phone("1234567"));
        assert!(looks_like_phone("123456789012345"));
        assert!(!looks_like_phone("1234567890123456"));
        assert!(!looks_like_phone("12"));
        assert!(!looks_like_phone("abc"));
        assert!(!looks_like_phone(""));
    }
}
