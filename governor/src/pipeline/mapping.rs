//! Intent mapping stage: free-text intent + snapshot → ranked candidate
//! targets.
//!
//! Two lookup methods feed the candidate list: AST symbol lookup (exact
//! declaration-name matches, highest confidence, carries a source range) and
//! text match (token overlap across file paths, lower confidence, no range).
//! AST hits are preferred over text hits for the same path to avoid false
//! remaps. The stage is deterministic: identical snapshot, intent, and hooks
//! always produce byte-identical output.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::decision::{Decision, DecisionBlock, reason};
use crate::pipeline::envelope::{Envelope, StageContext, family};
use crate::pipeline::snapshot::{LineSpan, SnapshotPayload};

const AST_CONFIDENCE: f64 = 0.95;
const TEXT_CONFIDENCE_CEILING: f64 = 0.8;

/// Tunable thresholds for candidate selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappingOptions {
    pub min_confidence: f64,
    pub ambiguity_gap: f64,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.75,
            ambiguity_gap: 0.05,
        }
    }
}

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    AstSymbol,
    TextMatch,
}

/// One ranked mapping candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub target_id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub method: MatchMethod,
    pub confidence: f64,
    /// Omitted for path-only text hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<LineSpan>,
}

/// Intent mapping payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingPayload {
    pub intent: String,
    pub decision: DecisionBlock,
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_target_id: Option<String>,
    pub min_confidence: f64,
    pub ambiguity_gap: f64,
}

/// Map a free-text intent onto the snapshot's targets.
pub fn map_intent(
    snapshot: &Envelope<SnapshotPayload>,
    intent: &str,
    options: &MappingOptions,
    ctx: &StageContext,
) -> Envelope<MappingPayload> {
    let candidates = rank_candidates(&snapshot.payload, intent);
    let (decision, selected) = decide(&candidates, options);

    let payload = MappingPayload {
        intent: intent.to_string(),
        decision,
        candidates,
        selected_target_id: selected,
        min_confidence: options.min_confidence,
        ambiguity_gap: options.ambiguity_gap,
    };
    ctx.envelope(
        family::INTENT_MAPPING,
        vec![snapshot.reference()],
        json!({
            "stage": "intent_mapping",
            "snapshot_inventory_hash": snapshot.payload.inventory_hash,
        }),
        payload,
    )
}

fn rank_candidates(snapshot: &SnapshotPayload, intent: &str) -> Vec<Candidate> {
    let intent_lower = intent.to_lowercase();
    let intent_tokens = tokenize(&intent_lower);

    // AST symbol lookup: exact declaration-name matches inside structured
    // source.
    let mut raw: Vec<(String, Option<String>, MatchMethod, f64, Option<LineSpan>)> = Vec::new();
    for declaration in &snapshot.declarations {
        if declaration.name.is_empty() {
            continue;
        }
        if intent_lower.contains(&declaration.name.to_lowercase()) {
            raw.push((
                declaration.path.clone(),
                Some(declaration.name.clone()),
                MatchMethod::AstSymbol,
                AST_CONFIDENCE,
                Some(declaration.span),
            ));
        }
    }

    // Text match over file paths, skipping paths already covered by an AST
    // hit.
    let ast_paths: Vec<String> = raw.iter().map(|(path, ..)| path.clone()).collect();
    if !intent_tokens.is_empty() {
        for file in &snapshot.files {
            if ast_paths.contains(&file.path) {
                continue;
            }
            let path_tokens = tokenize(&file.path.to_lowercase());
            let overlap = intent_tokens
                .iter()
                .filter(|token| path_tokens.contains(token))
                .count();
            if overlap == 0 {
                continue;
            }
            let confidence =
                TEXT_CONFIDENCE_CEILING * overlap as f64 / intent_tokens.len() as f64;
            raw.push((file.path.clone(), None, MatchMethod::TextMatch, confidence, None));
        }
    }

    // Rank by confidence descending with a deterministic tie-break, then
    // assign unique sanitized ids in ranked order.
    raw.sort_by(|a, b| {
        b.3.partial_cmp(&a.3)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });

    let mut used_ids: Vec<String> = Vec::new();
    raw.into_iter()
        .map(|(path, symbol, method, confidence, range)| {
            let base = match &symbol {
                Some(symbol) => sanitize(&format!("{path} {symbol}")),
                None => sanitize(&path),
            };
            let target_id = unique_id(base, &mut used_ids);
            Candidate {
                target_id,
                path,
                symbol,
                method,
                confidence,
                range,
            }
        })
        .collect()
}

fn decide(candidates: &[Candidate], options: &MappingOptions) -> (DecisionBlock, Option<String>) {
    if candidates.is_empty() {
        return (
            DecisionBlock::new(
                Decision::Stop,
                reason::UNSUPPORTED_INPUT,
                "no candidate matches the intent",
            ),
            None,
        );
    }

    let above: Vec<&Candidate> = candidates
        .iter()
        .filter(|candidate| candidate.confidence >= options.min_confidence)
        .collect();
    if above.is_empty() {
        return (
            DecisionBlock::new(
                Decision::Escalate,
                reason::MAPPING_LOW_CONFIDENCE,
                format!(
                    "best candidate confidence {:.2} is below min_confidence {:.2}",
                    candidates[0].confidence, options.min_confidence
                ),
            ),
            None,
        );
    }

    if above.len() >= 2 {
        let gap = above[0].confidence - above[1].confidence;
        if gap < options.ambiguity_gap {
            return (
                DecisionBlock::new(
                    Decision::Escalate,
                    reason::MAPPING_AMBIGUOUS,
                    format!(
                        "top candidates '{}' and '{}' are within the ambiguity gap",
                        above[0].target_id, above[1].target_id
                    ),
                ),
                None,
            );
        }
    }

    let selected = above[0].target_id.clone();
    (
        DecisionBlock::new(
            Decision::Continue,
            reason::OK,
            format!("selected '{selected}'"),
        ),
        Some(selected),
    )
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn sanitize(text: &str) -> String {
    let mut id: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    while id.contains("__") {
        id = id.replace("__", "_");
    }
    id.trim_matches('_').to_string()
}

/// Keep ids unique even when distinct paths sanitize to the same identifier.
fn unique_id(base: String, used: &mut Vec<String>) -> String {
    if !used.contains(&base) {
        used.push(base.clone());
        return base;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{base}_{n}");
        if !used.contains(&candidate) {
            used.push(candidate.clone());
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::snapshot::{
        Declaration, DeclarationKind, FileRecord, HeadState, LineSpan,
    };

    fn snapshot_payload() -> SnapshotPayload {
        SnapshotPayload {
            head: HeadState {
                branch: "main".to_string(),
                commit: "a".repeat(40),
                dirty: false,
            },
            files: vec![
                FileRecord {
                    path: "src/release.ls".to_string(),
                    size_bytes: 64,
                    content_hash: "00".repeat(8),
                },
                FileRecord {
                    path: "docs/release_notes.md".to_string(),
                    size_bytes: 32,
                    content_hash: "11".repeat(8),
                },
            ],
            inventory_hash: "22".repeat(8),
            declarations: vec![Declaration {
                name: "ship_release".to_string(),
                kind: DeclarationKind::Goal,
                path: "src/release.ls".to_string(),
                span: LineSpan {
                    start_line: 1,
                    end_line: 1,
                },
            }],
        }
    }

    fn candidates_for(intent: &str, snapshot: &SnapshotPayload) -> Vec<Candidate> {
        rank_candidates(snapshot, intent)
    }

    #[test]
    fn ast_hit_outranks_text_hit() {
        let snapshot = snapshot_payload();
        let candidates = candidates_for("update ship_release goal", &snapshot);
        assert!(candidates.len() >= 2);
        assert_eq!(candidates[0].method, MatchMethod::AstSymbol);
        assert_eq!(candidates[0].confidence, 0.95);
        assert!(candidates[0].range.is_some());
        assert_eq!(candidates[1].method, MatchMethod::TextMatch);
        assert!(candidates[1].range.is_none());
    }

    #[test]
    fn ast_hit_suppresses_text_hit_for_same_path() {
        let snapshot = snapshot_payload();
        let candidates = candidates_for("update ship_release in release.ls", &snapshot);
        let same_path: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.path == "src/release.ls")
            .collect();
        assert_eq!(same_path.len(), 1);
        assert_eq!(same_path[0].method, MatchMethod::AstSymbol);
    }

    #[test]
    fn clear_winner_continues_with_selection() {
        let snapshot = snapshot_payload();
        let candidates = candidates_for("update ship_release goal", &snapshot);
        let (decision, selected) = decide(&candidates, &MappingOptions::default());
        assert_eq!(decision.decision, Decision::Continue);
        assert_eq!(decision.reason_code, reason::OK);
        assert_eq!(selected.as_deref(), Some("src_release_ls_ship_release"));
    }

    #[test]
    fn two_equal_candidates_escalate_as_ambiguous() {
        let mut snapshot = snapshot_payload();
        snapshot.declarations.push(Declaration {
            name: "ship_release".to_string(),
            kind: DeclarationKind::Goal,
            path: "src/legacy.ls".to_string(),
            span: LineSpan {
                start_line: 4,
                end_line: 4,
            },
        });
        let candidates = candidates_for("update ship_release goal", &snapshot);
        let (decision, selected) = decide(&candidates, &MappingOptions::default());
        assert_eq!(decision.decision, Decision::Escalate);
        assert_eq!(decision.reason_code, reason::MAPPING_AMBIGUOUS);
        assert!(selected.is_none());
    }

    #[test]
    fn weak_candidates_escalate_as_low_confidence() {
        let snapshot = snapshot_payload();
        // Only a partial path-token overlap: text confidence below 0.75.
        let candidates = candidates_for("polish the release announcement wording", &snapshot);
        assert!(!candidates.is_empty());
        let (decision, selected) = decide(&candidates, &MappingOptions::default());
        assert_eq!(decision.decision, Decision::Escalate);
        assert_eq!(decision.reason_code, reason::MAPPING_LOW_CONFIDENCE);
        assert!(selected.is_none());
    }

    #[test]
    fn no_candidate_at_all_stops() {
        let snapshot = snapshot_payload();
        let candidates = candidates_for("qqq zzz", &snapshot);
        assert!(candidates.is_empty());
        let (decision, _) = decide(&candidates, &MappingOptions::default());
        assert_eq!(decision.decision, Decision::Stop);
        assert_eq!(decision.reason_code, reason::UNSUPPORTED_INPUT);
    }

    #[test]
    fn colliding_sanitized_ids_stay_unique() {
        let mut used = Vec::new();
        let a = unique_id("src_release_ls".to_string(), &mut used);
        let b = unique_id("src_release_ls".to_string(), &mut used);
        let c = unique_id("src_release_ls".to_string(), &mut used);
        assert_eq!(a, "src_release_ls");
        assert_eq!(b, "src_release_ls_2");
        assert_eq!(c, "src_release_ls_3");
    }

    #[test]
    fn sanitize_collapses_non_alphanumerics() {
        assert_eq!(sanitize("src/release.ls ship_release"), "src_release_ls_ship_release");
    }
}
