//! Dependency planning over selected tools.

use serde::{Deserialize, Serialize};

use super::ToolOrchestrator;
use super::selection::ToolSelection;

/// One tool invocation in a plan. Steps are numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: usize,
    pub tool: String,
    pub arguments: serde_json::Value,
    pub reason: String,
    /// Steps whose success this one waits for
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub steps: Vec<PlanStep>,
    /// Batches of independent steps run concurrently before the rest
    pub parallel_groups: Vec<Vec<usize>>,
}

impl OrchestrationPlan {
    pub fn step(&self, step: usize) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step == step)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl ToolOrchestrator {
    /// Order `selections` into steps, wiring each step to the earlier steps
    /// whose tools it declares in `requires`.
    pub fn plan(&self, selections: &[ToolSelection]) -> OrchestrationPlan {
        let mut steps: Vec<PlanStep> = Vec::with_capacity(selections.len());
        for (i, sel) in selections.iter().enumerate() {
            let requires = self
                .registry
                .descriptor(&sel.tool)
                .map(|d| d.requires.as_slice())
                .unwrap_or_default();
            let depends_on = steps
                .iter()
                .filter(|earlier| requires.contains(&earlier.tool))
                .map(|earlier| earlier.step)
                .collect();
            steps.push(PlanStep {
                step: i + 1,
                tool: sel.tool.clone(),
                arguments: sel
                    .arguments
                    .clone()
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
                reason: sel.reason.clone(),
                depends_on,
            });
        }

        let independent: Vec<usize> = steps
            .iter()
            .filter(|s| s.depends_on.is_empty())
            .map(|s| s.step)
            .collect();
        let parallel_groups = if independent.len() > 1 {
            independent
                .chunks(self.config.max_parallel.max(1))
                .map(|c| c.to_vec())
                .collect()
        } else {
            Vec::new()
        };

        OrchestrationPlan { steps, parallel_groups }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use steward_config::ToolsConfig;
    use steward_core::tool::ToolRegistry;

    use super::*;
    use crate::test_helpers::EchoTool;

    fn orchestrator(max_parallel: usize) -> ToolOrchestrator {
        let registry = ToolRegistry::new()
            .with(Arc::new(EchoTool::named("list_directory", "List a directory")))
            .with(Arc::new(
                EchoTool::named("file_read", "Read a file").requires(&["list_directory"]),
            ))
            .with(Arc::new(EchoTool::named("get_current_time", "Report the time")))
            .with(Arc::new(EchoTool::named("calculator", "Evaluate arithmetic")));
        ToolOrchestrator::new(
            registry,
            ToolsConfig {
                max_parallel,
                ..ToolsConfig::default()
            },
        )
    }

    fn pick(tools: &[&str]) -> Vec<ToolSelection> {
        tools.iter().map(|t| ToolSelection::new(*t, 0.9, "test")).collect()
    }

    #[test]
    fn dependencies_follow_requires() {
        let plan = orchestrator(4).plan(&pick(&["list_directory", "file_read"]));
        assert_eq!(plan.len(), 2);
        assert!(plan.step(1).unwrap().depends_on.is_empty());
        assert_eq!(plan.step(2).unwrap().depends_on, vec![1]);
        // a single independent step is not a parallel group
        assert!(plan.parallel_groups.is_empty());
    }

    #[test]
    fn requirement_must_be_selected_earlier() {
        let plan = orchestrator(4).plan(&pick(&["file_read", "list_directory"]));
        assert!(plan.steps.iter().all(|s| s.depends_on.is_empty()));
        assert_eq!(plan.parallel_groups, vec![vec![1, 2]]);
    }

    #[test]
    fn independent_steps_are_batched_by_worker_limit() {
        let plan = orchestrator(2).plan(&pick(&["get_current_time", "calculator", "list_directory", "file_read"]));
        assert_eq!(plan.parallel_groups, vec![vec![1, 2], vec![3]]);
        assert_eq!(plan.step(4).unwrap().depends_on, vec![3]);
    }

    #[test]
    fn arguments_default_to_empty_object() {
        let selections = vec![
            ToolSelection::new("calculator", 1.0, "math").with_arguments(serde_json::json!({"expression": "2+2"})),
            ToolSelection::new("get_current_time", 1.0, "clock"),
        ];
        let plan = orchestrator(4).plan(&selections);
        assert_eq!(plan.steps[0].arguments["expression"], "2+2");
        assert_eq!(plan.steps[1].arguments, serde_json::json!({}));
    }
}
