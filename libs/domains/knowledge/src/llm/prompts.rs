//! Prompt templates.

use super::ChatMessage;
use crate::text::truncate_chars;

/// Characters of document text sent for classification.
pub const CLASSIFY_CONTEXT_CHARS: usize = 500;

const SUMMARY_SYSTEM: &str = "你是知识库文档摘要助手。请用简洁的中文概括文档的核心内容，不超过三句话，只输出摘要本身。";

const CLASSIFY_SYSTEM: &str = "你是知识库文档分类助手。根据文档内容给出一个最合适的分类名称，只输出分类名称，不要附加任何其他字符。\
常见分类有：市场/营销、技术文档、内部流程、商务合同、产品方案、法律合规、财务、教育培训。";

pub fn summary_messages(title: &str, text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARY_SYSTEM),
        ChatMessage::user(format!("文档标题：{}\n文档内容：{}", title, text)),
    ]
}

pub fn classify_messages(name: &str, plain: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CLASSIFY_SYSTEM),
        ChatMessage::user(format!(
            "文档名称：{}\n文档内容：{}",
            name,
            truncate_chars(plain, CLASSIFY_CONTEXT_CHARS)
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages_truncate_by_chars() {
        let plain = "文".repeat(800);
        let messages = classify_messages("规范", &plain);
        assert_eq!(messages[0].role, "system");
        let body = &messages[1].content;
        assert!(body.starts_with("文档名称：规范\n"));
        assert_eq!(body.matches('文').count(), 500 + 2);
    }

    #[test]
    fn test_summary_messages_carry_title() {
        let messages = summary_messages("Onboarding", "Welcome aboard");
        assert!(messages[1].content.contains("Onboarding"));
        assert!(messages[1].content.contains("Welcome aboard"));
    }
}
