//! Intent Classifier
//!
//! Tags a user message with the domains it touches:
//! - Account: profile questions ("what is my email?", "change my name")
//! - Finance: ledger work ("I spent 200 on lunch", "what's my balance?")
//! - General: anything else, including market lookups
//!
//! Tags only shape a routing hint; the root agent still decides what to call.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Account,
    Finance,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Account => "account",
            Intent::Finance => "finance",
            Intent::General => "general",
        }
    }
}

/// Static keyword lists, matched against the lowercased message
const ACCOUNT_KEYWORDS: &[&str] = &[
    // Profile fields
    "email", "e-mail", "my name", "full name", "username", "profile",
    // Account actions
    "account", "rename", "last login", "logged in", "sign in",
];

const FINANCE_KEYWORDS: &[&str] = &[
    // Ledger vocabulary
    "balance", "expense", "transaction", "spent", "spend", "paid", "pay",
    "income", "salary", "deposit", "received", "earned", "bought", "cost",
    // Queries
    "how much", "total", "budget", "bill", "rent", "list my", "history",
    // Currency
    "bdt", "taka", "৳",
];

const MARKET_KEYWORDS: &[&str] = &[
    "stock", "share price", "ticker", "market", "nasdaq", "nyse", "quote",
];

pub struct IntentClassifier;

impl IntentClassifier {
    /// Domains mentioned by `text`, in a stable order. Never empty.
    pub fn classify(text: &str) -> Vec<Intent> {
        let text = text.to_lowercase();
        let mut intents = Vec::with_capacity(2);

        if ACCOUNT_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            intents.push(Intent::Account);
        }

        // "stock price" talk is general even when it says "price" or "pay".
        let market = MARKET_KEYWORDS.iter().any(|kw| text.contains(kw));
        let finance_hits = FINANCE_KEYWORDS
            .iter()
            .filter(|kw| text.contains(**kw))
            .count();
        if finance_hits > 0 && !(market && finance_hits == 1) {
            intents.push(Intent::Finance);
        }

        if intents.is_empty() {
            intents.push(Intent::General);
        }
        intents
    }

    /// Per-turn addition to the root directive.
    pub fn routing_hint(intents: &[Intent]) -> String {
        let tags: Vec<&str> = intents.iter().map(Intent::as_str).collect();
        let advice = match (
            intents.contains(&Intent::Account),
            intents.contains(&Intent::Finance),
        ) {
            (true, true) => {
                "It likely needs both account_management_agent and finance_management_agent; \
                 call both and merge their answers."
            }
            (true, false) => "It likely needs account_management_agent.",
            (false, true) => "It likely needs finance_management_agent.",
            (false, false) => {
                "It may not need an agent; use stock_quote for market prices or answer directly."
            }
        };
        format!(
            "Routing hint: this message looks like [{}]. {}",
            tags.join(", "),
            advice
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_requests() {
        let cases = vec![
            "what is my email?",
            "change my name to Rahim",
            "when did I last login to my account",
        ];

        for c in cases {
            assert_eq!(IntentClassifier::classify(c), vec![Intent::Account], "{}", c);
        }
    }

    #[test]
    fn test_finance_requests() {
        let cases = vec![
            "I spent 200 taka on lunch",
            "what's my current balance?",
            "show my rent transactions",
            "received salary 50000",
        ];

        for c in cases {
            assert_eq!(IntentClassifier::classify(c), vec![Intent::Finance], "{}", c);
        }
    }

    #[test]
    fn test_multi_domain() {
        let intents = IntentClassifier::classify("show my balance and update my email");
        assert_eq!(intents, vec![Intent::Account, Intent::Finance]);
        assert!(IntentClassifier::routing_hint(&intents).contains("call both"));
    }

    #[test]
    fn test_general_and_market() {
        assert_eq!(IntentClassifier::classify("hi"), vec![Intent::General]);
        assert_eq!(
            IntentClassifier::classify("what is the stock price of AAPL"),
            vec![Intent::General]
        );
        assert!(IntentClassifier::routing_hint(&[Intent::General]).contains("stock_quote"));
    }
}
