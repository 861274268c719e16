use pulldown_cmark::{html, Event, Options, Parser};

/// Turns a comment body into HTML. Must not fail: bad input renders best-effort.
pub trait Renderer {
    fn render(&self, text: &str) -> String;
}

/// GitHub-flavoured Markdown with tables, typographic quotes, a `<br />` for
/// every newline and raw HTML escaped instead of passed through.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    fn options() -> Options {
        Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_SMART_PUNCTUATION
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, text: &str) -> String {
        let parser = Parser::new_ext(text, Self::options()).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });

        let mut rendered = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut rendered, parser);
        rendered
    }
}

impl<F> Renderer for F
where
    F: Fn(&str) -> String,
{
    fn render(&self, text: &str) -> String {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(text: &str) -> String {
        MarkdownRenderer.render(text)
    }

    #[test]
    fn paragraph_and_emphasis() {
        assert_eq!(render("hello *world*"), "<p>hello <em>world</em></p>\n");
    }

    #[test]
    fn single_newline_becomes_line_break() {
        assert_eq!(render("first\nsecond"), "<p>first<br />\nsecond</p>\n");
    }

    #[test]
    fn raw_html_is_escaped() {
        let rendered = render("<script>alert(1)</script>");
        assert!(!rendered.contains("<script>"), "{rendered}");
        assert!(rendered.contains("&lt;script&gt;"), "{rendered}");

        let inline = render("hi <b>there</b>");
        assert!(inline.contains("&lt;b&gt;"), "{inline}");
    }

    #[test]
    fn tables_are_enabled() {
        let rendered = render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(rendered.contains("<table>"), "{rendered}");
        assert!(rendered.contains("<td>2</td>"), "{rendered}");
    }

    #[test]
    fn quotes_are_typographic() {
        let rendered = render("\"quoted\" -- dash");
        assert!(rendered.contains('\u{201c}'), "{rendered}");
        assert!(rendered.contains('\u{2013}'), "{rendered}");
    }

    #[test]
    fn malformed_markup_still_renders() {
        let rendered = render("**unclosed [link](");
        assert!(rendered.starts_with("<p>"), "{rendered}");
        assert_eq!(render(""), "");
    }

    #[test]
    fn closures_can_stand_in_for_the_renderer() {
        let plain = |text: &str| text.to_uppercase();
        assert_eq!(plain.render("abc"), "ABC");
    }
}
