//! Keyword families and their template strategies.
//!
//! Every piece of generated text that depends on what the ticket is about
//! goes through [`strategy`], keyed by the detected [`Domain`].

use crate::error::{DorError, Result};
use crate::types::Role;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Phrase patterns
// ---------------------------------------------------------------------------

/// Case-insensitive whole-phrase regex for a literal term. Word boundaries
/// are only asserted next to word characters, so `etc.` and `and/or` work.
/// Inner whitespace matches any run of whitespace.
pub fn phrase_regex(term: &str) -> Result<Regex> {
    let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
    let body = words.join(r"\s+");
    let first_word = term.trim().chars().next().is_some_and(is_word_char);
    let last_word = term.trim().chars().last().is_some_and(is_word_char);
    let pattern = format!(
        "(?i){}{}{}",
        if first_word { r"\b" } else { "" },
        body,
        if last_word { r"\b" } else { "" }
    );
    Regex::new(&pattern).map_err(|source| DorError::InvalidPattern {
        pattern: term.to_string(),
        source,
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Checkout,
    Search,
    Generic,
}

impl Domain {
    pub fn all() -> &'static [Domain] {
        &[Domain::Checkout, Domain::Search, Domain::Generic]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Checkout => "checkout",
            Domain::Search => "search",
            Domain::Generic => "generic",
        }
    }

    /// The keyword family with the most hits; checkout wins ties, no hits
    /// is generic.
    pub fn detect(text: &str) -> Domain {
        let p = family_patterns();
        let checkout = p.checkout.find_iter(text).count();
        let search = p.search.find_iter(text).count();
        if checkout == 0 && search == 0 {
            Domain::Generic
        } else if checkout >= search {
            Domain::Checkout
        } else {
            Domain::Search
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct FamilyPatterns {
    checkout: Regex,
    search: Regex,
}

fn family_patterns() -> &'static FamilyPatterns {
    static PATTERNS: OnceLock<FamilyPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FamilyPatterns {
        checkout: Regex::new(
            r"(?i)\b(?:checkout|payments?|carts?|baskets?|orders?|pay|cards?|billing)\b",
        )
        .unwrap(),
        search: Regex::new(
            r"(?i)\b(?:filters?|filtering|search(?:es|ing)?|facets?|sort(?:ing)?|results?|query|queries)\b",
        )
        .unwrap(),
    })
}

// ---------------------------------------------------------------------------
// Strategy table
// ---------------------------------------------------------------------------

pub struct DomainStrategy {
    pub persona: &'static str,
    pub benefit: &'static str,
    /// Closing sentence appended to synthesized narratives.
    pub elaboration: &'static str,
    pub acceptance_criteria: &'static [&'static str],
    pub positive: &'static [&'static str],
    pub negative: &'static [&'static str],
    pub error: &'static [&'static str],
    pub recommendations: &'static [(Role, &'static str)],
}

static CHECKOUT: DomainStrategy = DomainStrategy {
    persona: "shopper",
    benefit: "I can complete my purchase without re-entering details",
    elaboration: "The flow must keep the basket contents intact and show the final order total before payment is taken.",
    acceptance_criteria: &[
        "Given a basket with items, when the shopper proceeds to checkout, then the order summary shows every item, quantity and the total within 2 seconds",
        "Given valid payment details, when the shopper places the order, then a confirmation with an order number is shown within 3 seconds",
        "Given a declined payment, when the shopper places the order, then an inline error explains the decline and the basket is unchanged",
    ],
    positive: &[
        "Complete checkout with a valid card and verify the confirmation page shows the order number",
        "Apply a valid promo code and verify the order total is reduced by the discount",
    ],
    negative: &[
        "Submit payment with an expired card and verify the order is not placed",
        "Apply an invalid promo code and verify an inline message is shown and the total is unchanged",
    ],
    error: &[
        "Simulate a payment provider timeout and verify the shopper can retry without a duplicate charge",
        "Lose connectivity on the payment step and verify the basket is preserved on reload",
    ],
    recommendations: &[
        (Role::ProductOwner, "Confirm which payment methods and promo-code rules are in scope."),
        (Role::Qa, "Cover declined payments and payment-provider timeouts in test data."),
        (Role::Engineering, "Document idempotency for order submission to prevent double charges."),
    ],
};

static SEARCH: DomainStrategy = DomainStrategy {
    persona: "shopper",
    benefit: "I can narrow the results to products that match what I need",
    elaboration: "Results must reflect every applied criterion and the active selections must stay visible and removable.",
    acceptance_criteria: &[
        "Given a results page, when the shopper applies a filter, then only matching products are listed and the result count updates within 1 second",
        "Given active filters, when the shopper clears one, then the results and count revert to the remaining selection",
        "Given a query with no matches, when results load, then an empty state with suggestions is shown",
    ],
    positive: &[
        "Apply a single filter and verify every result matches it",
        "Change the sort order and verify results are re-ordered without losing active filters",
    ],
    negative: &[
        "Search for a term with no matches and verify the empty state is shown",
        "Combine filters that exclude all products and verify the clear-all option is offered",
    ],
    error: &[
        "Simulate a search service timeout and verify an error message with a retry option is shown",
        "Load a results URL with unknown filter parameters and verify they are ignored without a crash",
    ],
    recommendations: &[
        (Role::ProductOwner, "List the filters, sort options and their default order."),
        (Role::Qa, "Prepare a catalogue fixture with known result counts per filter."),
        (Role::Engineering, "Confirm how filter state is encoded in the URL for sharing and back navigation."),
    ],
};

static GENERIC: DomainStrategy = DomainStrategy {
    persona: "user",
    benefit: "I can finish the task without a workaround",
    elaboration: "Each behaviour must be verifiable against the acceptance criteria.",
    acceptance_criteria: &[
        "Given the feature is enabled, when the user completes the primary action, then the result is saved and confirmed within 2 seconds",
        "Given invalid input, when the user submits, then an inline error names the invalid value and nothing is saved",
    ],
    positive: &[
        "Complete the primary action with valid input and verify the confirmation",
        "Repeat the primary action and verify the result is consistent",
    ],
    negative: &[
        "Submit with required input missing and verify a validation message is shown",
        "Submit with invalid input and verify nothing is saved",
    ],
    error: &[
        "Simulate a backend failure and verify a recoverable error message is shown",
        "Simulate a slow dependency and verify a loading state is shown",
    ],
    recommendations: &[],
};

pub fn strategy(domain: Domain) -> &'static DomainStrategy {
    match domain {
        Domain::Checkout => &CHECKOUT,
        Domain::Search => &SEARCH,
        Domain::Generic => &GENERIC,
    }
}

// ---------------------------------------------------------------------------
// Domain terms
// ---------------------------------------------------------------------------

/// Matches the configured product vocabulary against ticket text.
pub struct TermMatcher {
    terms: Vec<(String, Regex)>,
}

impl TermMatcher {
    pub fn new(vocabulary: &[String]) -> Result<Self> {
        let terms = vocabulary
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Ok((t.trim().to_string(), phrase_regex(t)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    /// Terms found in `text`, in order of first appearance, in the
    /// vocabulary's casing.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut found: Vec<(usize, &str)> = self
            .terms
            .iter()
            .filter_map(|(term, re)| re.find(text).map(|m| (m.start(), term.as_str())))
            .collect();
        found.sort_by_key(|(pos, _)| *pos);
        let mut out: Vec<String> = Vec::with_capacity(found.len());
        for (_, term) in found {
            if !out.iter().any(|t| t.eq_ignore_ascii_case(term)) {
                out.push(term.to_string());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
