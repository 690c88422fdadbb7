//! Intent: what the classifier concluded about one incoming message.
//!
//! An Intent lives for exactly one turn: it feeds context assembly and the
//! loop's iteration budget, and is then discarded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Query,
    Action,
    Analysis,
    Creation,
    Modification,
    Conversation,
    Complex,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Query => "query",
            TaskType::Action => "action",
            TaskType::Analysis => "analysis",
            TaskType::Creation => "creation",
            TaskType::Modification => "modification",
            TaskType::Conversation => "conversation",
            TaskType::Complex => "complex",
        }
    }
}

/// Things a message needs beyond a plain model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    #[serde(alias = "rag", alias = "knowledge")]
    KnowledgeRetrieval,
    #[serde(alias = "tools", alias = "tool")]
    ToolUse,
    #[serde(alias = "plan")]
    Planning,
    #[serde(alias = "memory")]
    LongTermMemory,
    #[serde(alias = "skills", alias = "skill")]
    SkillInstructions,
    #[serde(alias = "web", alias = "fetch")]
    ExternalFetch,
    #[serde(alias = "code")]
    CodeExecution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Code,
    Table,
    List,
    Json,
}

/// Which classifier tier produced the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Quick,
    Model,
    Heuristic,
    Default,
}

/// Lexically extracted references in a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub numbers: Vec<String>,
    #[serde(default)]
    pub at_references: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
            && self.urls.is_empty()
            && self.numbers.is_empty()
            && self.at_references.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Short paraphrase of the message
    pub surface: String,
    /// Inferred underlying goal
    pub deep: String,
    pub task_type: TaskType,
    pub capabilities: Vec<Capability>,
    pub suggested_tools: Vec<String>,
    pub complexity: Complexity,
    pub multi_step: bool,
    pub estimated_steps: u32,
    pub confidence: f32,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub references_history: bool,
    #[serde(default)]
    pub output_format: OutputFormat,
    pub source: IntentSource,
}

impl Intent {
    /// The low-confidence fallback used whenever classification fails.
    pub fn conversation_default(message: &str) -> Self {
        Self {
            surface: surface_of(message),
            deep: "respond to the user".into(),
            task_type: TaskType::Conversation,
            capabilities: Vec::new(),
            suggested_tools: Vec::new(),
            complexity: Complexity::Low,
            multi_step: false,
            estimated_steps: 1,
            confidence: 0.3,
            entities: Entities::default(),
            references_history: false,
            output_format: OutputFormat::Text,
            source: IntentSource::Default,
        }
    }

    pub fn needs(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Add a capability if not already present.
    pub fn require(&mut self, capability: Capability) {
        if !self.needs(capability) {
            self.capabilities.push(capability);
        }
    }

    /// One-line human summary, used for thinking events and context notes.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} ({:?} complexity, confidence {:.2})",
            self.task_type.as_str(),
            self.complexity,
            self.confidence
        );
        if self.multi_step {
            line.push_str(&format!(", about {} steps", self.estimated_steps));
        }
        if !self.suggested_tools.is_empty() {
            line.push_str(&format!(", tools: {}", self.suggested_tools.join(", ")));
        }
        line
    }
}

/// Messages longer than 50 chars are cut to 47 plus an ellipsis.
pub fn surface_of(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() > 50 {
        let head: String = trimmed.chars().take(47).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}
