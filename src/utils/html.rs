// src/utils/html.rs

/// Sanitises user-supplied free text (comments, descriptions) with ammonia's
/// whitelist: safe inline tags survive, scripts and event handlers do not.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input.map(clean_html)
}
