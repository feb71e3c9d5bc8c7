//! Stage 5: deck assembly.

use flashdeck_core::{defaults, Card, Deck, Entity, KeywordScore};

/// Keyword cards, then entity cards, then one summary card when there is a summary.
pub fn assemble(keywords: &[KeywordScore], entities: &[Entity], summary: &[String]) -> Deck {
    let mut deck = Deck::new();

    for keyword in keywords {
        deck.push(Card::new(&keyword.term, &keyword.example));
    }
    for entity in entities {
        deck.push(Card::new(&entity.text, &entity.context));
    }
    if !summary.is_empty() {
        deck.push(Card::new(defaults::SUMMARY_CARD_FRONT, summary.join(" ")));
    }

    deck
}
