//! Synthetic article generator for offline testing.
//!
//! Produces faker-style lorem text so the risk commands can be exercised
//! without corpus credentials. Passing a seed makes the output
//! reproducible.

use crate::models::FakeArticle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed",
    "eiusmod", "tempor", "incididunt", "labore", "dolore", "magna", "aliqua", "enim", "minim",
    "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi", "aliquip",
    "commodo", "consequat", "duis", "aute", "irure", "reprehenderit", "voluptate", "velit",
    "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint", "occaecat",
    "cupidatat", "proident", "sunt", "culpa", "officia", "deserunt", "mollit", "anim",
];

const PARAGRAPHS_PER_ARTICLE: usize = 5;

fn word(rng: &mut StdRng) -> &'static str {
    WORDS[rng.random_range(0..WORDS.len())]
}

fn sentence(rng: &mut StdRng) -> String {
    let count = rng.random_range(4..=8);
    let mut out = String::new();
    for i in 0..count {
        let word = word(rng);
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        } else {
            out.push(' ');
            out.push_str(word);
        }
    }
    out.push('.');
    out
}

fn paragraph(rng: &mut StdRng) -> String {
    let count = rng.random_range(3..=5);
    (0..count).map(|_| sentence(rng)).collect::<Vec<String>>().join(" ")
}

/// Generate `count` synthetic articles: a sentence-shaped title and five
/// newline-joined paragraphs each.
pub fn generate(count: usize, seed: Option<u64>) -> Vec<FakeArticle> {
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(|| rand::rng().random()));
    let articles: Vec<FakeArticle> = (0..count)
        .map(|_| {
            let title = sentence(&mut rng);
            let content = (0..PARAGRAPHS_PER_ARTICLE)
                .map(|_| paragraph(&mut rng))
                .collect::<Vec<String>>()
                .join("\n");
            FakeArticle { title, content }
        })
        .collect();
    info!(count = articles.len(), "Generated synthetic articles");
    articles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_requested_count() {
        let articles = generate(50, Some(7));
        assert_eq!(articles.len(), 50);
    }

    #[test]
    fn test_articles_have_title_and_five_paragraphs() {
        let articles = generate(3, Some(7));
        for article in &articles {
            assert!(article.title.ends_with('.'));
            assert!(article.title.chars().next().unwrap().is_ascii_uppercase());
            assert_eq!(article.content.lines().count(), PARAGRAPHS_PER_ARTICLE);
        }
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let a = generate(5, Some(42));
        let b = generate(5, Some(42));
        for (left, right) in a.iter().zip(b.iter()) {
            assert_eq!(left.title, right.title);
            assert_eq!(left.content, right.content);
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generate(5, Some(1));
        let b = generate(5, Some(2));
        assert_ne!(a[0].title, b[0].title);
    }
}
