//! Builds the extended context handed to both generative agents

use crate::memory::MemoryManager;

pub const NO_SUMMARY: &str = "(no summary yet)";
pub const NO_FACTS: &str = "(no relevant facts)";

/// Prepends the rolling summary and relevant facts to the raw context
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    /// Maximum number of facts included per turn
    pub top_k: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

impl ContextAssembler {
    pub fn assemble(&self, memory: &MemoryManager, raw_context: &str, user_input: &str) -> String {
        let summary = memory.summary().text();
        let summary = if summary.is_empty() { NO_SUMMARY } else { summary };

        let hits = memory.relevant(user_input, self.top_k);
        let facts = if hits.is_empty() {
            NO_FACTS.to_string()
        } else {
            hits.iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!("Memories summary:\n{summary}\n\nRelevant facts:\n{facts}\n\n{raw_context}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Fact;
    use crate::memory::MemorySnapshot;

    #[test]
    fn test_placeholders_on_empty_memory() {
        let ctx = ContextAssembler::default().assemble(&MemoryManager::new(), "Greeting.", "Hello");
        assert_eq!(
            ctx,
            "Memories summary:\n(no summary yet)\n\nRelevant facts:\n(no relevant facts)\n\nGreeting."
        );
    }

    #[test]
    fn test_includes_summary_and_top_facts() {
        let facts = (0..7).map(|i| Fact::fact(format!("tea fact {i}"))).collect();
        let memory = MemoryManager::restore(MemorySnapshot {
            summary: "They had tea.".into(),
            facts,
            summary_stale: false,
        });
        let ctx = ContextAssembler::default().assemble(&memory, "raw", "more tea");
        assert!(ctx.starts_with("Memories summary:\nThey had tea.\n\nRelevant facts:\nFact: tea fact 0\n"));
        assert!(ctx.contains("Fact: tea fact 4\n\nraw"));
        assert!(!ctx.contains("tea fact 5"));
    }
}
