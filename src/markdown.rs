//! Markdown rendering for post and comment bodies.
//! Pass-through CommonMark to HTML; sanitization policy is out of scope.

use pulldown_cmark::{html, Parser};

/// Render a Markdown body to HTML. The trailing newline emitted by the
/// renderer is trimmed so stored `body_html` compares cleanly.
pub fn render(body: &str) -> String {
    let parser = Parser::new(body);
    let mut out = String::with_capacity(body.len() * 2);
    html::push_html(&mut out, parser);
    out.trim_end_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emphasis_renders_as_em() {
        assert_eq!(
            render("body of the *blog* post"),
            "<p>body of the <em>blog</em> post</p>"
        );
    }

    #[test]
    fn plain_text_is_wrapped_in_paragraph() {
        assert_eq!(render("updated body"), "<p>updated body</p>");
    }

    #[test]
    fn empty_body_renders_empty() {
        assert_eq!(render(""), "");
    }

    #[test]
    fn multiline_markdown() {
        let html = render("# Title\n\nfirst *para*");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>para</em>"));
    }
}
