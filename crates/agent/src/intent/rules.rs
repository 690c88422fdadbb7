//! Deterministic classification tiers.
//!
//! `quick_match` recognises a handful of high-confidence shapes and returns
//! immediately. `heuristic` always produces an answer from keyword tables and
//! is what the classifier falls back to when the model tier is unavailable.

use steward_core::intent::{
    Capability, Complexity, Entities, Intent, IntentSource, OutputFormat, TaskType, surface_of,
};

use super::entities;

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "yo", "howdy", "good morning", "good afternoon",
    "good evening", "greetings",
];
const THANKS: &[&str] = &["thank", "thanks", "thx", "appreciate", "cheers"];
const TIME_PHRASES: &[&str] = &[
    "current time", "what time", "time is it", "what's the time", "today's date", "what date",
    "what day is it",
];
const SHELL_PHRASES: &[&str] = &["run command", "run the command", "execute", "shell", "terminal"];
const FILE_WORDS: &[&str] = &[
    "file", "files", "directory", "directories", "folder", "folders", "read", "list", "analyze",
];
const ENV_WORDS: &[&str] = &["environment", "process", "processes", "running", "env"];

const QUERY_WORDS: &[&str] = &["how", "what", "why", "when", "where", "who", "which"];
const ACTION_WORDS: &[&str] = &["execute", "run", "delete", "install", "start", "stop", "kill"];
const ANALYSIS_WORDS: &[&str] = &["analyze", "analyse", "compare", "evaluate", "check", "diagnose", "review"];
const CREATION_WORDS: &[&str] = &["write", "generate", "create", "design", "make", "build", "draft"];
const MODIFICATION_WORDS: &[&str] = &["modify", "update", "change", "optimize", "refactor", "adjust", "fix"];

const HIGH_COMPLEXITY_WORDS: &[&str] = &["all", "complete", "comprehensive", "thorough", "systematic", "entire"];
const MEDIUM_COMPLEXITY_WORDS: &[&str] = &["analyze", "compare", "summarize", "optimize", "integrate", "explain"];
const SEQUENCE_MARKERS: &[&str] = &["first", "then", "next", "finally", "afterwards", "step", "1.", "2.", "1)", "2)"];
const CONJUNCTIONS: &[&str] = &["and", "also", "plus", "as well as"];
const HISTORY_PHRASES: &[&str] = &[
    "previously", "earlier", "you said", "we discussed", "last time", "as before", "above",
];

/// Word-level view of a message for keyword checks.
struct Words {
    lower: String,
    tokens: Vec<String>,
}

impl Words {
    fn new(message: &str) -> Self {
        let lower = message.trim().to_lowercase();
        let tokens = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        Self { lower, tokens }
    }

    fn has_word(&self, word: &str) -> bool {
        self.tokens.iter().any(|t| t == word)
    }

    /// Single words match whole tokens; phrases and punctuated markers match substrings.
    fn has(&self, keyword: &str) -> bool {
        if keyword.chars().all(|c| c.is_alphanumeric() || c == '\'') {
            self.has_word(keyword)
        } else {
            self.lower.contains(keyword)
        }
    }

    fn count(&self, keywords: &[&str]) -> usize {
        keywords.iter().filter(|k| self.has(k)).count()
    }

    fn any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.has(k))
    }

    fn chars(&self) -> usize {
        self.lower.chars().count()
    }
}

fn base(message: &str, task_type: TaskType, confidence: f32, source: IntentSource) -> Intent {
    Intent {
        surface: surface_of(message),
        deep: String::new(),
        task_type,
        capabilities: Vec::new(),
        suggested_tools: Vec::new(),
        complexity: Complexity::Low,
        multi_step: false,
        estimated_steps: 1,
        confidence,
        entities: Entities::default(),
        references_history: false,
        output_format: OutputFormat::Text,
        source,
    }
}

// ── Tier 1 ────────────────────────────────────────────────────────────────

/// High-confidence patterns. `None` means "ask the next tier".
pub fn quick_match(message: &str) -> Option<Intent> {
    let words = Words::new(message);
    let stripped = words.lower.trim_end_matches(['!', '.', '?', ' ']);

    if GREETINGS.contains(&stripped) || words.chars() < 5 {
        let mut intent = base(message, TaskType::Conversation, 0.95, IntentSource::Quick);
        intent.deep = "greet or chat".into();
        return Some(intent);
    }

    if words.chars() < 20 && THANKS.iter().any(|t| words.lower.contains(t)) {
        let mut intent = base(message, TaskType::Conversation, 0.95, IntentSource::Quick);
        intent.deep = "acknowledge thanks".into();
        return Some(intent);
    }

    if TIME_PHRASES.iter().any(|p| words.lower.contains(p)) {
        let mut intent = base(message, TaskType::Query, 0.95, IntentSource::Quick);
        intent.deep = "report the current date or time".into();
        intent.capabilities = vec![Capability::ToolUse];
        intent.suggested_tools = vec!["get_current_time".into()];
        return Some(intent);
    }

    if SHELL_PHRASES.iter().any(|p| words.has(p)) || words.lower.contains('`') {
        let mut intent = base(message, TaskType::Action, 0.95, IntentSource::Quick);
        intent.deep = "run a shell command and report its output".into();
        intent.capabilities = vec![Capability::ToolUse, Capability::CodeExecution];
        intent.suggested_tools = vec!["shell".into()];
        intent.complexity = Complexity::Medium;
        return Some(intent);
    }

    let paths = entities::path_tokens(message);
    if !paths.is_empty() || words.any(FILE_WORDS) {
        let mut intent = base(message, TaskType::Analysis, 0.92, IntentSource::Quick);
        intent.deep = "inspect files on disk".into();
        intent.capabilities = vec![Capability::ToolUse];
        intent.multi_step = true;
        intent.estimated_steps = 2;
        intent.complexity = Complexity::Medium;
        if paths.iter().any(|p| entities::has_extension(p)) {
            intent.suggested_tools = vec!["file_read".into()];
        } else {
            intent.suggested_tools = vec!["list_directory".into()];
            if words.has_word("read") {
                intent.suggested_tools.push("file_read".into());
            }
        }
        return Some(intent);
    }

    if words.any(ENV_WORDS) {
        let mut intent = base(message, TaskType::Query, 0.92, IntentSource::Quick);
        intent.deep = "inspect the runtime environment".into();
        intent.capabilities = vec![Capability::ToolUse];
        intent.suggested_tools = vec!["env_info".into(), "process_list".into(), "shell".into()];
        return Some(intent);
    }

    None
}

// ── Heuristic fallback ────────────────────────────────────────────────────

/// Keyword-table classification. Never fails.
pub fn heuristic(message: &str) -> Intent {
    let words = Words::new(message);
    let task_type = task_type(&words);
    let complexity = complexity(&words);
    let sequence_markers = words.count(SEQUENCE_MARKERS);
    let multi_step = sequence_markers >= 2 || words.chars() > 200;

    let mut intent = base(message, task_type, 0.7, IntentSource::Heuristic);
    intent.deep = format!("{} request", task_type.as_str());
    intent.complexity = complexity;
    intent.multi_step = multi_step;
    intent.capabilities = capabilities(&words, multi_step);
    intent.suggested_tools = suggested_tools(&words);
    intent.references_history = words.any(HISTORY_PHRASES);
    intent.output_format = output_format(&words);
    intent.estimated_steps = match complexity {
        Complexity::Low => 1,
        Complexity::Medium => 2 + words.count(CONJUNCTIONS) as u32,
        Complexity::High => 3 + (words.count(CONJUNCTIONS) + sequence_markers) as u32,
    };
    if multi_step {
        intent.estimated_steps = intent.estimated_steps.max(2);
    }
    intent
}

fn task_type(words: &Words) -> TaskType {
    let matched: Vec<TaskType> = [
        (TaskType::Query, words.any(QUERY_WORDS) || words.lower.contains('?')),
        (TaskType::Action, words.any(ACTION_WORDS)),
        (TaskType::Analysis, words.any(ANALYSIS_WORDS)),
        (TaskType::Creation, words.any(CREATION_WORDS)),
        (TaskType::Modification, words.any(MODIFICATION_WORDS)),
    ]
    .into_iter()
    .filter_map(|(t, hit)| hit.then_some(t))
    .collect();

    if matched.len() >= 2 || words.chars() > 200 {
        TaskType::Complex
    } else {
        matched.first().copied().unwrap_or(TaskType::Conversation)
    }
}

fn complexity(words: &Words) -> Complexity {
    let len = words.chars();
    let mut score = match len {
        n if n > 300 => 3,
        n if n > 150 => 2,
        n if n > 50 => 1,
        _ => 0,
    };
    score += 2 * words.count(HIGH_COMPLEXITY_WORDS);
    score += words.count(MEDIUM_COMPLEXITY_WORDS);
    if words.count(SEQUENCE_MARKERS) >= 2 {
        score += 2;
    }
    match score {
        s if s >= 5 => Complexity::High,
        s if s >= 2 => Complexity::Medium,
        _ => Complexity::Low,
    }
}

fn capabilities(words: &Words, multi_step: bool) -> Vec<Capability> {
    let table: [(Capability, &[&str]); 6] = [
        (
            Capability::KnowledgeRetrieval,
            &["document", "documents", "docs", "documentation", "knowledge", "according to", "policy", "manual", "notes"],
        ),
        (
            Capability::ToolUse,
            &["file", "files", "run", "execute", "list", "read", "fetch", "calculate", "directory", "command", "time"],
        ),
        (Capability::LongTermMemory, &["remember", "last time", "my preference", "previously"]),
        (Capability::SkillInstructions, &["skill", "skills", "playbook", "template"]),
        (Capability::ExternalFetch, &["http", "https", "url", "website", "download", "fetch"]),
        (Capability::CodeExecution, &["python", "script", "code", "compute", "calculate"]),
    ];
    let mut caps: Vec<Capability> = table
        .iter()
        .filter(|(_, keywords)| words.any(keywords))
        .map(|(cap, _)| *cap)
        .collect();
    if multi_step {
        caps.push(Capability::Planning);
    }
    caps
}

fn suggested_tools(words: &Words) -> Vec<String> {
    let table: [(&str, &[&str]); 7] = [
        ("list_directory", &["list", "ls", "directory", "folder", "folders"]),
        ("file_read", &["read", "open", "view", "cat", "show"]),
        ("file_write", &["write", "save"]),
        ("shell", &["shell", "command", "execute", "terminal"]),
        ("web_fetch", &["http", "https", "url", "website", "fetch", "download"]),
        ("calculator", &["calculate", "compute", "sum", "math", "multiply", "divide"]),
        ("get_current_time", &["time", "date", "today"]),
    ];
    table
        .iter()
        .filter(|(_, keywords)| words.any(keywords))
        .map(|(tool, _)| tool.to_string())
        .take(5)
        .collect()
}

fn output_format(words: &Words) -> OutputFormat {
    if words.any(&["code", "function", "script", "snippet"]) {
        OutputFormat::Code
    } else if words.has_word("table") {
        OutputFormat::Table
    } else if words.has_word("json") {
        OutputFormat::Json
    } else if words.any(&["list", "bullet", "bullets", "steps"]) {
        OutputFormat::List
    } else {
        OutputFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_and_short_messages_are_conversation() {
        for msg in ["hello", "Hey!", "good morning", "ok", "yo."] {
            let intent = quick_match(msg).unwrap();
            assert_eq!(intent.task_type, TaskType::Conversation, "{msg}");
            assert!(intent.confidence >= 0.9);
            assert_eq!(intent.source, IntentSource::Quick);
        }
    }

    #[test]
    fn short_thanks_is_conversation() {
        let intent = quick_match("thanks a lot!").unwrap();
        assert_eq!(intent.task_type, TaskType::Conversation);
    }

    #[test]
    fn time_query_suggests_clock() {
        let intent = quick_match("What time is it in UTC right now").unwrap();
        assert_eq!(intent.task_type, TaskType::Query);
        assert_eq!(intent.suggested_tools, vec!["get_current_time"]);
    }

    #[test]
    fn shell_phrasing_is_action() {
        let intent = quick_match("please execute `uname -a` for me").unwrap();
        assert_eq!(intent.task_type, TaskType::Action);
        assert_eq!(intent.suggested_tools, vec!["shell"]);
        assert!(intent.needs(Capability::ToolUse));
    }

    #[test]
    fn directory_then_read_is_multi_step() {
        let intent = quick_match("list files in /tmp then read the first one").unwrap();
        assert_eq!(intent.task_type, TaskType::Analysis);
        assert!(intent.multi_step);
        assert_eq!(intent.suggested_tools, vec!["list_directory", "file_read"]);
        assert!(intent.confidence >= 0.9);
    }

    #[test]
    fn explicit_file_suggests_read() {
        let intent = quick_match("what does /etc/hostname.conf contain").unwrap();
        assert_eq!(intent.suggested_tools, vec!["file_read"]);
    }

    #[test]
    fn environment_words_are_queries() {
        let intent = quick_match("which services are running right now").unwrap();
        assert_eq!(intent.task_type, TaskType::Query);
        assert!(intent.suggested_tools.contains(&"process_list".to_string()));
    }

    #[test]
    fn open_questions_fall_through() {
        assert!(quick_match("Why is the sky blue during the day?").is_none());
        assert!(quick_match("Explain the difference between TCP and UDP").is_none());
    }

    #[test]
    fn heuristic_detects_query() {
        let intent = heuristic("Why is the sky blue during the day?");
        assert_eq!(intent.task_type, TaskType::Query);
        assert_eq!(intent.complexity, Complexity::Low);
        assert!((intent.confidence - 0.7).abs() < f32::EPSILON);
        assert_eq!(intent.source, IntentSource::Heuristic);
    }

    #[test]
    fn heuristic_mixed_keywords_are_complex() {
        let intent = heuristic("Review the parser and refactor the error handling");
        assert_eq!(intent.task_type, TaskType::Complex);
    }

    #[test]
    fn heuristic_scores_complexity_and_steps() {
        let intent = heuristic(
            "First do a comprehensive and thorough audit of the entire service, \
             then summarize the findings and finally compare them with last quarter",
        );
        assert_eq!(intent.complexity, Complexity::High);
        assert!(intent.multi_step);
        assert!(intent.needs(Capability::Planning));
        assert!(intent.estimated_steps >= 3);
    }

    #[test]
    fn heuristic_detects_history_and_format() {
        let intent = heuristic("Put what you said earlier into a table");
        assert!(intent.references_history);
        assert_eq!(intent.output_format, OutputFormat::Table);
    }

    #[test]
    fn heuristic_suggests_at_most_five_tools() {
        let intent = heuristic(
            "list the folder, read it, save it, run a command, fetch the url, compute the sum, tell the time",
        );
        assert_eq!(intent.suggested_tools.len(), 5);
    }

    #[test]
    fn plain_chat_is_conversation() {
        let intent = heuristic("I really enjoyed our chat about gardening");
        assert_eq!(intent.task_type, TaskType::Conversation);
        assert!(intent.capabilities.is_empty());
    }
}
