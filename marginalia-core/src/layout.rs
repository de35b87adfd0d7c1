//! Layout Engine: stacks sidebar cards next to their anchors without overlap.

use crate::types::PositionedComment;

/// Units follow the host: pixels in a browser, rows in a terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    /// How far a card is pulled above its anchor.
    pub offset: f64,
    /// Gap between consecutive cards.
    pub spacing: f64,
    /// Height assumed for cards that have not been measured yet.
    pub fallback_height: f64,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            offset: 270.0,
            spacing: 20.0,
            fallback_height: 150.0,
        }
    }
}

impl LayoutMetrics {
    pub fn height_of(&self, card: &PositionedComment) -> f64 {
        card.height.unwrap_or(self.fallback_height)
    }
}

/// Places `cards` in ascending `y` order, each at `y - offset` unless that
/// would overlap the card above it. Cards with equal `y` keep their input
/// order. The first available slot is `0`, the top of the sidebar.
pub fn layout(cards: &[PositionedComment], metrics: &LayoutMetrics) -> Vec<PositionedComment> {
    let mut sorted = cards.to_vec();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y));

    let mut next = 0.0_f64;
    for card in &mut sorted {
        let desired = card.y - metrics.offset;
        card.top = desired.max(next);
        next = card.top + metrics.height_of(card) + metrics.spacing;
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardKey;

    fn card(id: &str, y: f64, height: Option<f64>) -> PositionedComment {
        PositionedComment::unplaced(CardKey::Comment(id.to_owned()), y, height)
    }

    fn flat() -> LayoutMetrics {
        LayoutMetrics {
            offset: 0.0,
            ..LayoutMetrics::default()
        }
    }

    #[test]
    fn close_anchors_are_pushed_down() {
        let out = layout(&[card("a", 100.0, None), card("b", 110.0, None)], &flat());
        assert_eq!(out[0].top, 100.0);
        assert!(out[1].top >= 100.0 + 150.0 + 20.0);
        assert_eq!(out[1].top, 270.0);
    }

    #[test]
    fn cards_never_overlap() {
        let metrics = LayoutMetrics::default();
        let cards = vec![
            card("a", 900.0, Some(40.0)),
            card("b", 300.0, None),
            card("c", 310.0, Some(500.0)),
            card("d", 320.0, Some(10.0)),
            card("e", 2000.0, None),
        ];
        let out = layout(&cards, &metrics);
        for pair in out.windows(2) {
            let bottom = pair[0].top + metrics.height_of(&pair[0]);
            assert!(bottom <= pair[1].top, "{:?} overlaps {:?}", pair[0].key, pair[1].key);
        }
    }

    #[test]
    fn order_follows_anchors_and_ties_are_stable() {
        let cards = vec![
            card("late", 500.0, None),
            card("first", 100.0, None),
            card("tie-1", 300.0, None),
            card("tie-2", 300.0, None),
        ];
        let out = layout(&cards, &flat());
        let keys: Vec<_> = out.iter().map(|c| c.key.clone()).collect();
        assert_eq!(
            keys,
            ["first", "tie-1", "tie-2", "late"]
                .iter()
                .map(|k| CardKey::Comment((*k).to_owned()))
                .collect::<Vec<_>>()
        );
        assert!(out.windows(2).all(|w| w[0].top <= w[1].top));
    }

    #[test]
    fn cards_are_never_above_their_desired_top() {
        let metrics = LayoutMetrics::default();
        let cards = vec![card("a", 400.0, None), card("b", 1000.0, None), card("c", 1010.0, None)];
        for c in layout(&cards, &metrics) {
            assert!(c.top >= c.y - metrics.offset);
        }
    }

    #[test]
    fn first_card_starts_at_the_sidebar_origin() {
        let out = layout(&[card("a", 50.0, None)], &LayoutMetrics::default());
        assert_eq!(out[0].top, 0.0);
    }

    #[test]
    fn measured_heights_replace_the_fallback() {
        let out = layout(&[card("a", 0.0, Some(30.0)), card("b", 0.0, None)], &flat());
        assert_eq!(out[1].top, 50.0);
    }

    #[test]
    fn draft_cards_are_placed_like_comments() {
        let out = layout(
            &[
                card("a", 100.0, None),
                PositionedComment::unplaced(CardKey::Draft, 120.0, Some(60.0)),
            ],
            &flat(),
        );
        assert_eq!(out[1].key, CardKey::Draft);
        assert_eq!(out[1].top, 270.0);
    }
}
