use crate::types::Label;

/// Pick the consensus label of an ensemble.
///
/// The winner is the label with the most votes; among labels sharing the top
/// count, the one that reached that count first in `votes` order wins. When
/// the winner has fewer than `quorum` votes, `default` is returned instead.
pub fn resolve(votes: &[Label], default: &Label, quorum: usize) -> Label {
    let mut counts: Vec<(&Label, usize)> = Vec::new();
    let mut best: Option<(&Label, usize)> = None;

    for vote in votes {
        let count = match counts.iter_mut().find(|(label, _)| *label == vote) {
            Some(entry) => {
                entry.1 += 1;
                entry.1
            }
            None => {
                counts.push((vote, 1));
                1
            }
        };
        // Strictly greater: an equal count reached later never takes over.
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((vote, count));
        }
    }

    match best {
        Some((label, count)) if count >= quorum => label.clone(),
        _ => default.clone(),
    }
}
