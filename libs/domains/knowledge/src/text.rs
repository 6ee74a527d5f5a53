//! Plain-text extraction and the local fallbacks used when no LLM answers.

use regex::Regex;
use std::sync::LazyLock;

/// Category assigned when nothing else matches.
pub const UNCATEGORIZED: &str = "未分类";

const SUMMARY_MAX_CHARS: usize = 160;

static SCRIPT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script[^>]*?>.*?</script>|<style[^>]*?>.*?</style>|<iframe[^>]*?>.*?</iframe>|<noscript[^>]*?>.*?</noscript>",
    )
    .expect("valid block regex")
});

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Visible text of an HTML fragment: script-like blocks are dropped with
/// their contents, remaining tags become spaces, whitespace is collapsed.
pub fn strip_html(html: &str) -> String {
    let cleaned = SCRIPT_BLOCKS.replace_all(html, " ");
    let cleaned = TAGS.replace_all(&cleaned, " ");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// First `max` characters of `text` (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Two leading sentences when the text has at least three, otherwise the
/// first 160 characters followed by `...`, otherwise the text itself.
pub fn fallback_summary(plain: &str) -> String {
    let sentences: Vec<&str> = plain.split('。').collect();
    if sentences.len() > 2 {
        return format!("{}。", sentences[..2].join("。"));
    }
    if plain.chars().count() > SUMMARY_MAX_CHARS {
        return format!("{}...", truncate_chars(plain, SUMMARY_MAX_CHARS));
    }
    plain.to_string()
}

/// Keyword classifier; the first matching rule wins.
pub fn fallback_category(text: &str) -> &'static str {
    const RULES: &[(&[&str], &str)] = &[
        (&["营销", "市场"], "市场/营销"),
        (&["技术", "开发", "接口"], "技术文档"),
        (&["流程", "sop"], "内部流程"),
        (&["合同", "协议"], "商务合同"),
    ];

    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, category)| *category)
        .unwrap_or(UNCATEGORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_drops_scripts_and_tags() {
        let html = r#"<div><script type="text/javascript">alert("x")</script>
            <h1>Title</h1><STYLE>p { color: red }</STYLE>
            <p>Hello   <b>world</b></p><iframe src="x">frame</iframe><noscript>nojs</noscript></div>"#;
        assert_eq!(strip_html(html), "Title Hello world");
    }

    #[test]
    fn test_strip_html_plain_text_unchanged() {
        assert_eq!(strip_html("  just\n\ttext  "), "just text");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_fallback_summary_two_sentences() {
        assert_eq!(fallback_summary("第一句。第二句。第三句。"), "第一句。第二句。");
        // Two terminators give three pieces
        assert_eq!(fallback_summary("甲。乙。"), "甲。乙。");
    }

    #[test]
    fn test_fallback_summary_truncates_long_text() {
        let text = "字".repeat(200);
        let summary = fallback_summary(&text);
        assert_eq!(summary.chars().count(), 163);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn test_fallback_summary_short_text_unchanged() {
        assert_eq!(fallback_summary("一句话。"), "一句话。");
        assert_eq!(fallback_summary("short note"), "short note");
        let exact = "a".repeat(160);
        assert_eq!(fallback_summary(&exact), exact);
    }

    #[test]
    fn test_fallback_category_rules() {
        assert_eq!(fallback_category("本季度市场推广计划"), "市场/营销");
        assert_eq!(fallback_category("接口开发规范"), "技术文档");
        assert_eq!(fallback_category("Onboarding SOP"), "内部流程");
        assert_eq!(fallback_category("采购合同模板"), "商务合同");
        assert_eq!(fallback_category("团建照片"), UNCATEGORIZED);
    }

    #[test]
    fn test_fallback_category_first_rule_wins() {
        assert_eq!(fallback_category("营销系统的技术方案"), "市场/营销");
    }

    #[test]
    fn test_truncate_chars_counts_scalars() {
        assert_eq!(truncate_chars("知识库文档", 3), "知识库");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
