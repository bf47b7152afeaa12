//! Static knowledge base the chat widget answers from, and keyword search over it.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Sections start with a `## ` heading line.
const KNOWLEDGE_BASE: &str = r#"
## Product overview
Our platform automates accounts receivable for B2B finance teams. It sends invoices, runs automated payment reminders, applies cash to open invoices, and gives controllers a live view of collections. Most customers connect it to their ERP or accounting system in under two weeks.

## Invoicing and delivery
Invoices are generated from your ERP and delivered by email, customer portal, or AP portal upload. Each invoice carries a secure payment link. Delivery and open tracking show which customers have seen an invoice.

## Collections and payment reminders
Collections workflows send reminder emails before and after the due date on a schedule you control. Templates can be customised per customer segment. Disputes and promises to pay are logged against the invoice so collectors see the full history.

## Cash application
Incoming payments from ACH, wire, check lockbox, and card are matched to open invoices automatically. Remittance advice is read from emails and bank files. Unmatched payments go to an exception queue for review.

## Payments
Customers can pay online by ACH or card through the payment portal. Card surcharging and convenience fees can be enabled where permitted. Payouts settle to your bank account on a standard schedule.

## Integrations
We integrate with NetSuite, QuickBooks Online, Sage Intacct, Microsoft Dynamics 365 Business Central, Xero, and SAP Business One. Data syncs every 15 minutes. A REST API and CSV import are available for other systems.

## Pricing
Pricing is a platform subscription based on invoice volume, billed annually. Plans include Starter, Growth, and Enterprise. Payment processing fees are separate. Book a demo for a quote tailored to your invoice volume.

## Implementation and onboarding
Implementation takes two to six weeks depending on ERP and workflow complexity. A dedicated onboarding manager configures integrations, imports open invoices, and trains your team. There is no separate implementation fee on Growth and Enterprise plans.

## Security and compliance
The platform is SOC 2 Type II audited. Data is encrypted in transit and at rest. Payments are processed by PCI DSS Level 1 certified partners. Single sign-on and role-based access control are available.

## DSO and ROI
Customers typically reduce days sales outstanding (DSO) by 20 to 35 percent in the first six months. Use the ROI calculator to estimate cash released from lower DSO and hours saved on manual collections work.

## Support
Support is available by email and chat on business days. Enterprise plans include a named customer success manager and priority response times.
"#;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "in", "is", "it", "me", "my", "of", "on", "or", "our", "the", "to", "we", "what",
    "when", "which", "who", "with", "you", "your", "about", "have", "has", "there", "this",
    "that", "will", "would", "could", "should", "tell", "much", "many",
];

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeMatch<'a> {
    pub section: &'a KnowledgeSection,
    pub score: u32,
}

pub struct KnowledgeBase {
    sections: Vec<KnowledgeSection>,
}

impl KnowledgeBase {
    pub fn parse(text: &str) -> Self {
        let mut sections = Vec::new();
        let mut current: Option<KnowledgeSection> = None;

        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                current = Some(KnowledgeSection {
                    heading: heading.trim().to_string(),
                    body: String::new(),
                });
            } else if let Some(section) = current.as_mut() {
                let line = line.trim();
                if !line.is_empty() {
                    if !section.body.is_empty() {
                        section.body.push(' ');
                    }
                    section.body.push_str(line);
                }
            }
        }
        if let Some(section) = current {
            sections.push(section);
        }

        Self { sections }
    }

    /// The built-in site knowledge base.
    pub fn builtin() -> &'static KnowledgeBase {
        static KB: OnceLock<KnowledgeBase> = OnceLock::new();
        KB.get_or_init(|| KnowledgeBase::parse(KNOWLEDGE_BASE))
    }

    pub fn sections(&self) -> &[KnowledgeSection] {
        &self.sections
    }

    /// Ranks sections by keyword hits; heading hits count double.
    /// Only sections with at least one hit are returned, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeMatch<'_>> {
        let keywords = keywords(query);
        if keywords.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<KnowledgeMatch<'_>> = self
            .sections
            .iter()
            .filter_map(|section| {
                let heading_words = keywords_set(&section.heading);
                let body_words = keywords_set(&section.body);
                let score: u32 = keywords
                    .iter()
                    .map(|k| {
                        let mut s = 0;
                        if heading_words.contains(k.as_str()) {
                            s += 2;
                        }
                        if body_words.contains(k.as_str()) {
                            s += 1;
                        }
                        s
                    })
                    .sum();
                (score > 0).then_some(KnowledgeMatch { section, score })
            })
            .collect();

        // Stable sort keeps document order between equal scores.
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);
        matches
    }
}

/// Lowercased, de-duplicated query keywords with stop words and plural `s` removed.
pub fn keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .map(normalize_word)
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn keywords_set(text: &str) -> HashSet<String> {
    keywords(text).into_iter().collect()
}

fn normalize_word(word: &str) -> String {
    let lower = word.to_lowercase();
    match lower.strip_suffix('s') {
        Some(stem) if stem.len() > 3 && !stem.ends_with('s') => stem.to_string(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_parses_all_sections() {
        let kb = KnowledgeBase::builtin();
        assert_eq!(kb.sections().len(), 11);
        assert_eq!(kb.sections()[0].heading, "Product overview");
        assert!(!kb.sections()[0].body.contains('\n'));
    }

    #[test]
    fn test_keywords_drop_stop_words_and_plurals() {
        assert_eq!(
            keywords("What integrations do you have with NetSuite?"),
            vec!["integration".to_string(), "netsuite".to_string()]
        );
    }

    #[test]
    fn test_search_prefers_heading_hits() {
        let kb = KnowledgeBase::builtin();
        let results = kb.search("How does your pricing work?", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].section.heading, "Pricing");
    }

    #[test]
    fn test_search_finds_body_terms() {
        let kb = KnowledgeBase::builtin();
        let results = kb.search("Is it SOC 2 audited?", 1);
        assert_eq!(results[0].section.heading, "Security and compliance");
    }

    #[test]
    fn test_search_no_hits() {
        let kb = KnowledgeBase::builtin();
        assert!(kb.search("banana smoothie", 3).is_empty());
        assert!(kb.search("the and of", 3).is_empty());
    }

    #[test]
    fn test_parse_ignores_preamble() {
        let kb = KnowledgeBase::parse("intro text\n## One\nalpha\n\nbeta\n## Two\ngamma");
        assert_eq!(kb.sections().len(), 2);
        assert_eq!(kb.sections()[0].body, "alpha beta");
    }
}
