//! Context assembly: merges tagged contributions into one bounded payload.
//!
//! Contributions arrive from many sources (system instructions, referenced
//! files, the tool catalog, retrieved knowledge, history, ...) each with a
//! priority tier. The assembler:
//!
//! 1. Sorts by tier, keeping the caller's order within a tier.
//! 2. Greedily appends whole contributions while the running estimate stays
//!    within `budget - reserve`. Contributions are skipped, never truncated.
//! 3. Always keeps CRITICAL contributions. If they alone overflow the limit
//!    the result is flagged `overflow` and the budget is treated as advisory.
//! 4. Once a contribution that would fit the limit on its own is skipped for
//!    space, every strictly lower tier is closed, so nothing less important
//!    can take the place of something more important.
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs: identical contributions and
//! budget always produce identical text and metadata.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::context::token::TokenEstimator;

// ── Types ─────────────────────────────────────────────────────────────────

/// Priority tier of a contribution. Lower ordinal wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// Where a contribution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextSource {
    SystemInstructions,
    FileReference,
    ToolCatalog,
    SkillInstructions,
    RetrievedKnowledge,
    UserPreference,
    ConversationHistory,
    PriorToolResults,
    Custom,
}

impl ContextSource {
    /// Section header shown above this source's contributions.
    pub fn title(&self) -> &'static str {
        match self {
            ContextSource::SystemInstructions => "Instructions",
            ContextSource::FileReference => "Referenced Files",
            ContextSource::ToolCatalog => "Available Tools",
            ContextSource::SkillInstructions => "Skill Instructions",
            ContextSource::RetrievedKnowledge => "Knowledge Base",
            ContextSource::UserPreference => "User Preferences",
            ContextSource::ConversationHistory => "Conversation History",
            ContextSource::PriorToolResults => "Earlier Tool Results",
            ContextSource::Custom => "Additional Context",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextSource::SystemInstructions => "system-instructions",
            ContextSource::FileReference => "file-reference",
            ContextSource::ToolCatalog => "tool-catalog",
            ContextSource::SkillInstructions => "skill-instructions",
            ContextSource::RetrievedKnowledge => "retrieved-knowledge",
            ContextSource::UserPreference => "user-preference",
            ContextSource::ConversationHistory => "conversation-history",
            ContextSource::PriorToolResults => "prior-tool-results",
            ContextSource::Custom => "custom",
        }
    }
}

/// One piece of candidate context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextContribution {
    pub source: ContextSource,
    pub priority: Priority,
    pub text: String,
    /// Short name used in drop records (a file path, a document, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Reported back when the contribution is included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

impl ContextContribution {
    pub fn new(source: ContextSource, priority: Priority, text: impl Into<String>) -> Self {
        Self {
            source,
            priority,
            text: text.into(),
            label: None,
            citation: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        self.citation = Some(citation.into());
        self
    }

    fn label_or_source(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.source.as_str().to_string())
    }
}

/// Token budget for one assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Total context window the assembly may use.
    pub total: usize,
    /// Held back for the model's reply.
    pub reserve: usize,
}

impl TokenBudget {
    pub fn new(total: usize, reserve: usize) -> Self {
        Self { total, reserve }
    }

    /// What the assembled text may cost.
    pub fn limit(&self) -> usize {
        self.total.saturating_sub(self.reserve)
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            total: 8000,
            reserve: 1024,
        }
    }
}

/// The assembled context, ready to lead a model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub metadata: AssemblyMetadata,
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens of the assembled text.
    pub total_tokens: usize,
    /// `budget - reserve`.
    pub limit: usize,
    /// CRITICAL content alone exceeded the limit and was kept anyway.
    pub overflow: bool,
    /// Budget utilization percentage.
    pub utilization_pct: f32,
    /// Per-source statistics, in output order.
    pub per_source: Vec<SourceStats>,
    /// One record per skipped contribution.
    pub drops: Vec<DropInfo>,
    /// Citations of included contributions, in output order.
    pub citations: Vec<String>,
}

/// Statistics for a single source tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: ContextSource,
    /// Tokens charged, header included.
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// A contribution that did not make it into the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub source: ContextSource,
    pub priority: Priority,
    pub label: String,
    pub tokens: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Would have pushed the total past the limit.
    BudgetExceeded,
    /// Larger than the whole limit on its own.
    Oversized,
    /// A higher tier already lost something to space.
    LowerTierClosed,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::BudgetExceeded => "exceeds remaining budget",
            DropReason::Oversized => "larger than the whole budget",
            DropReason::LowerTierClosed => "a higher-priority item was dropped",
        };
        f.write_str(s)
    }
}

const SEPARATOR: &str = "\n\n";

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    budget: TokenBudget,
    estimator: TokenEstimator,
}

impl ContextAssembler {
    pub fn new(budget: TokenBudget, estimator: TokenEstimator) -> Self {
        Self { budget, estimator }
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// Assemble contributions into a single bounded text.
    pub fn assemble(&self, contributions: Vec<ContextContribution>) -> AssembledContext {
        let limit = self.budget.limit();

        let mut ordered: Vec<ContextContribution> = contributions
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .collect();
        // Stable: ties keep the caller's order.
        ordered.sort_by_key(|c| c.priority);

        let mut totals: HashMap<ContextSource, usize> = HashMap::new();
        let mut source_order: Vec<ContextSource> = Vec::new();
        for c in &ordered {
            let count = totals.entry(c.source).or_default();
            if *count == 0 {
                source_order.push(c.source);
            }
            *count += 1;
        }

        let mut used = 0usize;
        let mut overflow = false;
        let mut closed_below: Option<Priority> = None;
        let mut headed: HashSet<ContextSource> = HashSet::new();
        let mut sections: Vec<(ContextSource, Vec<String>)> = Vec::new();
        let mut stats: Vec<SourceStats> = Vec::new();
        let mut drops: Vec<DropInfo> = Vec::new();
        let mut citations: Vec<String> = Vec::new();

        for c in ordered {
            let header_cost = if headed.contains(&c.source) {
                0
            } else {
                self.header_cost(c.source)
            };
            let item_cost = self.estimator.estimate(&c.text) + self.estimator.estimate(SEPARATOR);
            let cost = item_cost + header_cost;

            if c.priority != Priority::Critical {
                if closed_below.is_some_and(|closed| c.priority > closed) {
                    drops.push(Self::drop(&c, item_cost, DropReason::LowerTierClosed));
                    continue;
                }
                if used + cost > limit {
                    let reason = if cost > limit {
                        DropReason::Oversized
                    } else {
                        closed_below = Some(match closed_below {
                            Some(p) => p.min(c.priority),
                            None => c.priority,
                        });
                        DropReason::BudgetExceeded
                    };
                    drops.push(Self::drop(&c, item_cost, reason));
                    continue;
                }
            }

            used += cost;
            if used > limit {
                overflow = true;
            }
            headed.insert(c.source);

            match stats.iter_mut().find(|s| s.source == c.source) {
                Some(s) => {
                    s.tokens += cost;
                    s.items_included += 1;
                }
                None => stats.push(SourceStats {
                    source: c.source,
                    tokens: cost,
                    items_included: 1,
                    items_total: totals.get(&c.source).copied().unwrap_or(1),
                }),
            }

            if let Some(citation) = &c.citation {
                citations.push(citation.clone());
            }
            match sections.iter_mut().find(|(s, _)| *s == c.source) {
                Some((_, items)) => items.push(c.text),
                None => sections.push((c.source, vec![c.text])),
            }
        }

        // Sources with every contribution dropped still get a stats row.
        for source in source_order {
            if !stats.iter().any(|s| s.source == source) {
                stats.push(SourceStats {
                    source,
                    tokens: 0,
                    items_included: 0,
                    items_total: totals.get(&source).copied().unwrap_or(0),
                });
            }
        }

        let text = sections
            .into_iter()
            .map(|(source, items)| format!("{}{}", Self::header(source), items.join(SEPARATOR)))
            .collect::<Vec<_>>()
            .join(SEPARATOR);

        let total_tokens = self.estimator.estimate(&text);
        let utilization_pct = if self.budget.total == 0 {
            0.0
        } else {
            (total_tokens as f32 / self.budget.total as f32) * 100.0
        };

        AssembledContext {
            text,
            metadata: AssemblyMetadata {
                total_tokens,
                limit,
                overflow,
                utilization_pct,
                per_source: stats,
                drops,
                citations,
            },
        }
    }

    fn header(source: ContextSource) -> String {
        format!("## {}\n", source.title())
    }

    fn header_cost(&self, source: ContextSource) -> usize {
        self.estimator.estimate(&Self::header(source)) + self.estimator.estimate(SEPARATOR)
    }

    fn drop(c: &ContextContribution, tokens: usize, reason: DropReason) -> DropInfo {
        DropInfo {
            source: c.source,
            priority: c.priority,
            label: c.label_or_source(),
            tokens,
            reason,
        }
    }
}
