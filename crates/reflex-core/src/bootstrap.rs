//! Bootstrap seeding of common intents.
//!
//! New tenants start with an empty corpus, so their first days are all
//! escalations. Seeding the handful of intents nearly every tenant sees
//! (hours, location, contact) gives the cascade day-one coverage; the host
//! supplies the tenant-specific answer per intent and anything unanswered
//! is skipped.

use std::collections::HashMap;

use crate::error::ReflexResult;
use crate::traits::{Embedder, PatternStore};
use crate::types::{CachedResponse, ExampleQuery, Pattern};

/// A seedable intent: key, match keywords, representative phrasings.
#[derive(Debug, Clone)]
pub struct SeedIntent {
    pub key: &'static str,
    pub keywords: &'static [&'static str],
    pub examples: &'static [&'static str],
}

/// Intents common across tenant domains.
pub fn common_intents() -> &'static [SeedIntent] {
    const INTENTS: &[SeedIntent] = &[
        SeedIntent {
            key: "business_hours",
            keywords: &["hours", "open", "close", "opening", "closing"],
            examples: &[
                "What are your hours?",
                "When do you open?",
                "When do you close?",
                "Are you open right now?",
            ],
        },
        SeedIntent {
            key: "location",
            keywords: &["address", "location", "located", "directions"],
            examples: &[
                "Where are you located?",
                "What's your address?",
                "How do I get to you?",
            ],
        },
        SeedIntent {
            key: "contact",
            keywords: &["phone", "email", "contact", "reach"],
            examples: &[
                "What's your phone number?",
                "How can I contact you?",
                "Do you have an email address?",
            ],
        },
    ];
    INTENTS
}

/// Seed a namespace with the given answers, keyed by intent key.
///
/// Embeds every example phrasing up front so seeded patterns participate in
/// semantic matching immediately. Returns the number of patterns created.
/// Intents without an answer are skipped; already-seeded keys surface as
/// store conflicts to the caller. Writes go straight to the store:
/// invalidate the namespace on the cascade afterwards if it was already
/// serving requests.
pub async fn bootstrap_namespace(
    store: &dyn PatternStore,
    embedder: &dyn Embedder,
    namespace: &str,
    domain: Option<&str>,
    answers: &HashMap<String, CachedResponse>,
) -> ReflexResult<usize> {
    let mut created = 0;

    for intent in common_intents() {
        let Some(answer) = answers.get(intent.key) else {
            continue;
        };

        let texts: Vec<String> = intent.examples.iter().map(|e| e.to_string()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        let examples: Vec<ExampleQuery> = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| ExampleQuery::new(text, embedding))
            .collect();

        let mut pattern = Pattern::new(namespace, intent.key, answer.clone())
            .with_keywords(intent.keywords.iter().map(|k| k.to_string()).collect())
            .with_examples(examples)
            .with_confidence(1.0);
        if let Some(domain) = domain {
            pattern = pattern.with_domain(domain);
        }

        store.create_pattern(&pattern).await?;
        created += 1;
    }

    tracing::info!(namespace, created, "bootstrap seeding complete");
    Ok(created)
}
