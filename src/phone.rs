//! Phone number helpers.

/// Strip dashes and spaces from a phone number. With `keep_plus` false, a
/// leading `+` is removed as well.
pub fn sanitize_phone(phone: &str, keep_plus: bool) -> String {
    let phone = if keep_plus {
        phone
    } else {
        phone.strip_prefix('+').unwrap_or(phone)
    };
    phone.chars().filter(|c| *c != '-' && *c != ' ').collect()
}

/// Sanitize and ensure a leading `+`. Idempotent.
pub fn normalize_phone(phone: &str) -> String {
    let phone = sanitize_phone(phone, true);
    if phone.starts_with('+') {
        phone
    } else {
        format!("+{phone}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_separators() {
        assert_eq!(sanitize_phone("+62 812-34", true), "+6281234");
        assert_eq!(sanitize_phone("+62 812-34", false), "6281234");
        assert_eq!(sanitize_phone("6281234", false), "6281234");
    }

    #[test]
    fn test_normalize_adds_plus() {
        assert_eq!(normalize_phone("6281234"), "+6281234");
        assert_eq!(normalize_phone("62 812-34"), "+6281234");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["+6281234", "6281234", "+62 812 34", "", "+"] {
            let once = normalize_phone(input);
            assert_eq!(normalize_phone(&once), once);
        }
    }
}
