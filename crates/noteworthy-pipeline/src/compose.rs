//! Document composer: merge a sanitized fragment into the full-document
//! template.

/// Substitution point in the document template.
pub const CONTENT_PLACEHOLDER: &str = "<content>";

/// Substitute the fragment into the template at the first `<content>`
/// placeholder.
///
/// No escaping is performed: user text flows into model output which flows
/// verbatim into the compiled document, and the compile sandbox is the
/// external service's responsibility. That is an accepted risk, not an
/// oversight. Any stricter policy belongs here, behind this function.
pub fn substitute_fragment(template: &str, fragment: &str) -> String {
    template.replacen(CONTENT_PLACEHOLDER, fragment.trim(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\\documentclass{article}\n\\begin{document}\n<content>\n\\end{document}\n";

    #[test]
    fn test_single_substitution() {
        let out = substitute_fragment(TEMPLATE, "\\section*{Notes}");
        assert_eq!(
            out,
            "\\documentclass{article}\n\\begin{document}\n\\section*{Notes}\n\\end{document}\n"
        );
    }

    #[test]
    fn test_fragment_is_trimmed_but_not_escaped() {
        let out = substitute_fragment(TEMPLATE, "  \\input{evil}  ");
        assert!(out.contains("\\input{evil}"));
        assert!(!out.contains("  \\input"));
    }

    #[test]
    fn test_only_first_placeholder_is_replaced() {
        let template = "<content> and again <content>";
        let out = substitute_fragment(template, "X");
        assert_eq!(out, "X and again <content>");
    }

    #[test]
    fn test_template_without_placeholder_is_unchanged() {
        let out = substitute_fragment("no placeholder here", "X");
        assert_eq!(out, "no placeholder here");
    }
}
