//! Output sanitizer: raw generated markup → embeddable fragment.
//!
//! A small ordered list of total, idempotent string transforms. Each rule is
//! independently testable; applying the whole pipeline twice yields the same
//! result as applying it once, so a replayed generation output sanitizes
//! identically. Malformed or already-clean input passes through unchanged.

const FENCE: &str = "```";
const FENCE_LATEX: &str = "```latex";
const DOCUMENT_BEGIN: &str = "\\begin{document}";
const DOCUMENT_END: &str = "\\end{document}";
const DOCUMENT_CLASS: &str = "\\documentclass";
/// Option token the constrained compile engine does not support.
const UNSUPPORTED_OPTION: &str = ", tdplot_main_coords";

/// Sanitize raw generated markup into an embeddable document fragment.
///
/// The transform list runs to a fixed point: extracting a document body can
/// expose another fence or document marker, and a re-sanitized fragment must
/// come out unchanged. Every pass that changes the text strictly shortens
/// it, so the loop terminates.
pub fn sanitize(input: &str) -> String {
    let mut text = input.trim().to_string();
    loop {
        let next = sanitize_pass(&text);
        if next == text {
            return next;
        }
        text = next;
    }
}

fn sanitize_pass(input: &str) -> String {
    let stripped = strip_code_fence(input);
    let body = extract_document_body(&stripped);
    remove_unsupported_options(&body).trim().to_string()
}

/// Drop a fenced-code-block wrapper (```` ```latex ```` or ```` ``` ````)
/// when the text starts and/or ends with one.
fn strip_code_fence(input: &str) -> String {
    let mut text = input.trim();
    if text
        .get(..FENCE_LATEX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(FENCE_LATEX))
    {
        text = text[FENCE_LATEX.len()..].trim_start();
    } else if let Some(rest) = text.strip_prefix(FENCE) {
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest.trim_end();
    }
    text.to_string()
}

/// Keep only the document body. Everything before `\begin{document}` is
/// boilerplate the model may have echoed; everything from `\end{document}`
/// on is closing boilerplate. Without a document environment, stray
/// `\documentclass` lines are dropped and the rest kept.
fn extract_document_body(input: &str) -> String {
    if let Some(begin) = input.find(DOCUMENT_BEGIN) {
        let after = &input[begin + DOCUMENT_BEGIN.len()..];
        let body = match after.find(DOCUMENT_END) {
            Some(end) => &after[..end],
            None => after,
        };
        return body.trim().to_string();
    }
    if input.contains(DOCUMENT_CLASS) {
        return input
            .lines()
            .filter(|line| !line.trim_start().starts_with(DOCUMENT_CLASS))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
    }
    input.trim().to_string()
}

fn remove_unsupported_options(input: &str) -> String {
    input.replace(UNSUPPORTED_OPTION, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_and_preamble_stripping() {
        let input = "```latex\n\\documentclass{article}\n\\begin{document}\nHELLO\n```";
        assert_eq!(sanitize(input), "HELLO");
    }

    #[test]
    fn test_plain_fence_without_language_tag() {
        let input = "```\n\\section*{Notes}\nbody\n```";
        assert_eq!(sanitize(input), "\\section*{Notes}\nbody");
    }

    #[test]
    fn test_fence_tag_is_case_insensitive() {
        let input = "```LaTeX\n\\section*{A}\n```";
        assert_eq!(sanitize(input), "\\section*{A}");
    }

    #[test]
    fn test_end_document_is_dropped() {
        let input = "\\begin{document}\n\\section*{A}\ncontent\n\\end{document}\ntrailing noise";
        assert_eq!(sanitize(input), "\\section*{A}\ncontent");
    }

    #[test]
    fn test_documentclass_lines_dropped_without_document_env() {
        let input = "\\documentclass[12pt]{article}\n\\section*{A}\nbody";
        assert_eq!(sanitize(input), "\\section*{A}\nbody");
    }

    #[test]
    fn test_unsupported_option_removed_globally() {
        let input = "\\begin{tikzpicture}[scale=1, tdplot_main_coords]\nx\n\\end{tikzpicture}\n\
                     \\begin{tikzpicture}[x=1cm, tdplot_main_coords]\ny\n\\end{tikzpicture}";
        let out = sanitize(input);
        assert!(!out.contains("tdplot_main_coords"));
        assert!(out.contains("[scale=1]"));
        assert!(out.contains("[x=1cm]"));
    }

    #[test]
    fn test_fence_inside_document_body_is_stripped() {
        let input = "\\begin{document}\n```latex\nX\n\\end{document}";
        assert_eq!(sanitize(input), "X");
    }

    #[test]
    fn test_nested_document_marker_keeps_innermost_body() {
        let input = "\\begin{document}A\n\\begin{document}B\n\\end{document}";
        assert_eq!(sanitize(input), "B");
    }

    #[test]
    fn test_clean_input_passes_through() {
        let input = "\\section*{Linear Combinations}\n\\dfn{Span}{The set of all...}";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```latex\n\\documentclass{article}\n\\begin{document}\nHELLO\n```",
            "\\begin{document}\nbody\n\\end{document}",
            "plain text with no markup",
            "",
            "```\n```",
            "\\begin{tikzpicture}[a, tdplot_main_coords]\\end{tikzpicture}",
            // Strip triggers surviving inside an extracted body.
            "\\begin{document}\n```latex\nX\n\\end{document}",
            "\\begin{document}A\n\\begin{document}B\n\\end{document}",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   \n  "), "");
    }
}
