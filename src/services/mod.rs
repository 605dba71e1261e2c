pub mod auth_service;
pub mod cart_service;
pub mod category_service;
pub mod contact_service;
pub mod order_service;
pub mod product_service;
pub mod settings_service;
pub mod stats_service;
pub mod upload_service;
pub mod user_service;

/// Escape `%`, `_` and `\` so user input is matched literally by (I)LIKE.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// `%input%` with the input escaped.
pub(crate) fn contains_pattern(input: &str) -> String {
    format!("%{}%", escape_like(input))
}

/// Lowercase, hyphen-separated slug. Non-ASCII letters are kept.
pub(crate) fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(contains_pattern("lin"), "%lin%");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("  Cotton & Linen "), "cotton-linen");
        assert_eq!(slugify("Шёлк натуральный"), "шёлк-натуральный");
        assert_eq!(slugify("--"), "");
    }
}
