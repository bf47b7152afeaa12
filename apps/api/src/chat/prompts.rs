use crate::chat::knowledge::KnowledgeSection;

const ASSISTANT_SYSTEM: &str = "\
You are the website assistant for an accounts-receivable automation platform. \
Answer questions from finance and accounting visitors using ONLY the knowledge base \
excerpts below. Keep answers under 120 words, plain text, no markdown headings. \
If the excerpts do not answer the question, say so briefly and offer to connect the \
visitor with the team. Never invent prices, customer names, or integrations.";

pub const NO_MATCH_REPLY: &str = "I'm not sure about that one. I can connect you with \
someone on our team who can help. Just tap \"Talk to a person\" and leave your details.";

pub const HANDOFF_ACK: &str = "Thanks! I've passed your details to our team. \
Someone will join this chat shortly, or follow up by email if we miss you.";

pub const HUMAN_HANDLED_NOTE: &str = "A team member has this conversation and will reply here.";

/// System prompt with the knowledge-base excerpts the model may draw on.
pub fn system_prompt(sections: &[&KnowledgeSection]) -> String {
    let mut prompt = String::from(ASSISTANT_SYSTEM);
    prompt.push_str("\n\nKNOWLEDGE BASE EXCERPTS:\n");
    for section in sections {
        prompt.push_str(&format!("\n### {}\n{}\n", section.heading, section.body));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_embeds_sections() {
        let section = KnowledgeSection {
            heading: "Pricing".to_string(),
            body: "Billed annually.".to_string(),
        };
        let prompt = system_prompt(&[&section]);
        assert!(prompt.starts_with(ASSISTANT_SYSTEM));
        assert!(prompt.contains("### Pricing\nBilled annually."));
    }
}
