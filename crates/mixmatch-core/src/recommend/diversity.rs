//! Greedy diversity re-ranking for multi-seed expansion

use std::collections::HashMap;

use super::Recommendation;

/// How many of the most recently selected tracks a candidate is compared with
pub const DIVERSITY_WINDOW: usize = 5;

fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return None;
    }
    Some(dot / (na * nb))
}

/// Pick up to `top_n` items from `ranked` (best first), each time taking
/// the item whose score minus `diversity * mean similarity to the last
/// DIVERSITY_WINDOW picks` is highest. The penalised score is stored back
/// into the item.
///
/// Items without an embedding in `embeddings` are never penalised.
pub fn diversify(
    ranked: Vec<Recommendation>,
    embeddings: &HashMap<String, Vec<f32>>,
    diversity: f32,
    top_n: usize,
) -> Vec<Recommendation> {
    if !(diversity.is_finite() && diversity > 0.0) {
        let mut ranked = ranked;
        ranked.truncate(top_n);
        return ranked;
    }

    let mut remaining = ranked;
    let mut selected: Vec<Recommendation> = Vec::with_capacity(top_n.min(remaining.len()));

    while selected.len() < top_n && !remaining.is_empty() {
        let window_start = selected.len().saturating_sub(DIVERSITY_WINDOW);
        let window: Vec<&Vec<f32>> = selected[window_start..]
            .iter()
            .filter_map(|r| embeddings.get(&r.path))
            .collect();

        let mut best: Option<(usize, f32)> = None;
        for (i, cand) in remaining.iter().enumerate() {
            let penalty = match embeddings.get(&cand.path) {
                Some(emb) if !window.is_empty() => {
                    let sims: Vec<f32> = window.iter().filter_map(|w| cosine(w, emb)).collect();
                    if sims.is_empty() {
                        0.0
                    } else {
                        diversity * sims.iter().sum::<f32>() / sims.len() as f32
                    }
                }
                _ => 0.0,
            };
            let adjusted = cand.score - penalty;
            if best.map_or(true, |(_, s)| adjusted > s) {
                best = Some((i, adjusted));
            }
        }

        let Some((i, adjusted)) = best else { break };
        let mut pick = remaining.remove(i);
        pick.score = adjusted;
        selected.push(pick);
    }

    selected
}
