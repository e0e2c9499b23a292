use ammonia;

/// Sanitizes user-authored text (post bodies, comments) before it is stored.
///
/// Whitelist based: harmless markup such as `<b>` survives, while `<script>`
/// (including its content), `<iframe>` and event-handler attributes are dropped.
/// Clients rendering the text as plain `textContent` are unaffected.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_keeps_text() {
        assert_eq!(clean_html("hi<script>alert(1)</script>"), "hi");
        assert_eq!(clean_html("plain words"), "plain words");
        assert_eq!(clean_html("<b onclick=\"x()\">bold</b>"), "<b>bold</b>");
    }
}
