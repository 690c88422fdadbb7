//! Style prompts from a fixed map, usually the `[preferences]` config table.

use async_trait::async_trait;
use std::collections::HashMap;
use steward_core::collaborator::PreferenceSource;

#[derive(Debug, Clone, Default)]
pub struct StaticPreferences {
    prompts: HashMap<String, String>,
}

impl StaticPreferences {
    pub fn new(prompts: HashMap<String, String>) -> Self {
        Self { prompts }
    }

    pub fn with(mut self, user_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.prompts.insert(user_id.into(), prompt.into());
        self
    }
}

#[async_trait]
impl PreferenceSource for StaticPreferences {
    async fn style_prompt(&self, user_id: &str) -> Option<String> {
        self.prompts
            .get(user_id)
            .filter(|p| !p.trim().is_empty())
            .cloned()
    }
}
