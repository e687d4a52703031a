//! Long-term memory for one session: rolling summary plus fact store

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    facts::{Fact, FactStore, parse_extraction},
    service::GenerationService,
    summary::RollingSummary,
};

/// Read-only export of long-term memory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub summary: String,
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub summary_stale: bool,
}

/// What one memory update changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDelta {
    pub summary: String,
    pub new_facts: Vec<Fact>,
}

/// Owns the summary and fact store for the active session
#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    summary: RollingSummary,
    facts: FactStore,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> &RollingSummary {
        &self.summary
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    /// Facts relevant to `query`, see [`FactStore::relevant`]
    pub fn relevant(&self, query: &str, top_k: usize) -> Vec<&Fact> {
        self.facts.relevant(query, top_k)
    }

    /// Roll the summary forward. No retry; failures propagate and leave
    /// the previous summary in place, marked stale.
    pub async fn update_summary(
        &mut self,
        service: &dyn GenerationService,
        user_input: &str,
        assistant_reply: &str,
    ) -> Result<String> {
        self.summary
            .update(service, user_input, assistant_reply)
            .await
            .map(str::to_string)
    }

    /// Extract and store new facts. Malformed output yields no facts.
    pub async fn extract_facts(
        &mut self,
        service: &dyn GenerationService,
        user_input: &str,
        assistant_reply: &str,
    ) -> Result<Vec<Fact>> {
        let raw = service.extract(user_input, assistant_reply).await?;
        match parse_extraction(&raw) {
            Ok(items) => Ok(self.facts.append_valid(&items)),
            Err(Error::MalformedExtraction(preview)) => {
                tracing::warn!(output = %preview, "extraction output was not a JSON array");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Summary first, then extraction. Extraction is skipped if the summary fails.
    pub async fn update(
        &mut self,
        service: &dyn GenerationService,
        user_input: &str,
        assistant_reply: &str,
    ) -> Result<MemoryDelta> {
        let summary = self
            .update_summary(service, user_input, assistant_reply)
            .await?;
        let new_facts = self
            .extract_facts(service, user_input, assistant_reply)
            .await?;
        Ok(MemoryDelta { summary, new_facts })
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            summary: self.summary.text().to_string(),
            facts: self.facts.all().to_vec(),
            summary_stale: self.summary.is_stale(),
        }
    }

    pub fn restore(snapshot: MemorySnapshot) -> Self {
        let mut summary = RollingSummary::from_text(snapshot.summary);
        if snapshot.summary_stale {
            summary.mark_stale();
        }
        Self {
            summary,
            facts: FactStore::from_facts(snapshot.facts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{character::Character, service::FragmentStream};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Memory-only stub; narration and dialogue are never called here
    struct StubMemoryService {
        summary: std::result::Result<String, String>,
        extraction: std::result::Result<String, String>,
        summarize_calls: Mutex<Vec<(String, String, String)>>,
        extract_calls: Mutex<u32>,
    }

    impl StubMemoryService {
        fn new(summary: std::result::Result<&str, &str>, extraction: std::result::Result<&str, &str>) -> Self {
            Self {
                summary: summary.map(str::to_string).map_err(str::to_string),
                extraction: extraction.map(str::to_string).map_err(str::to_string),
                summarize_calls: Mutex::new(Vec::new()),
                extract_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationService for StubMemoryService {
        async fn complete_narration(&self, _: &Character, _: &str, _: &str) -> Result<FragmentStream> {
            unreachable!("narration is not used by memory tests")
        }

        async fn complete_dialogue(&self, _: &Character, _: &str, _: &str) -> Result<FragmentStream> {
            unreachable!("dialogue is not used by memory tests")
        }

        async fn summarize(&self, old: &str, user: &str, reply: &str) -> Result<String> {
            self.summarize_calls
                .lock()
                .push((old.to_string(), user.to_string(), reply.to_string()));
            self.summary.clone().map_err(Error::Summary)
        }

        async fn extract(&self, _: &str, _: &str) -> Result<String> {
            *self.extract_calls.lock() += 1;
            self.extraction.clone().map_err(Error::Extraction)
        }
    }

    #[tokio::test]
    async fn test_update_runs_summary_then_extraction() {
        let svc = StubMemoryService::new(
            Ok("  They met at the shop. "),
            Ok(r#"[{"type":"fact","text":"user likes clocks"}]"#),
        );
        let mut memory = MemoryManager::new();
        let delta = memory.update(&svc, "Hello", "Hi there").await.unwrap();

        assert_eq!(delta.summary, "They met at the shop.");
        assert_eq!(delta.new_facts, vec![Fact::fact("user likes clocks")]);
        assert_eq!(
            svc.summarize_calls.lock().as_slice(),
            &[("".to_string(), "Hello".to_string(), "Hi there".to_string())]
        );

        memory.update(&svc, "Again", "Sure").await.unwrap();
        assert_eq!(svc.summarize_calls.lock()[1].0, "They met at the shop.");
        assert_eq!(memory.facts().len(), 2);
    }

    #[tokio::test]
    async fn test_not_json_extraction_leaves_store_unchanged() {
        let svc = StubMemoryService::new(Ok("s"), Ok("not json"));
        let mut memory = MemoryManager::new();
        let facts = memory.extract_facts(&svc, "Hello", "Hi").await.unwrap();
        assert!(facts.is_empty());
        assert!(memory.facts().is_empty());
    }

    #[tokio::test]
    async fn test_summary_failure_keeps_stale_summary_and_skips_extraction() {
        let svc = StubMemoryService::new(Err("timeout"), Ok("[]"));
        let mut memory = MemoryManager::restore(MemorySnapshot {
            summary: "previous".into(),
            facts: vec![],
            summary_stale: false,
        });
        let err = memory.update(&svc, "Hello", "Hi").await.unwrap_err();
        assert!(matches!(err, Error::Summary(_)));
        assert_eq!(memory.summary().text(), "previous");
        assert!(memory.summary().is_stale());
        assert_eq!(*svc.extract_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_extraction_service_failure_propagates() {
        let svc = StubMemoryService::new(Ok("new"), Err("refused"));
        let mut memory = MemoryManager::new();
        let err = memory.update(&svc, "Hello", "Hi").await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(memory.summary().text(), "new");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut snapshot = MemorySnapshot {
            summary: "s".into(),
            facts: vec![Fact::feeling("content")],
            summary_stale: true,
        };
        let memory = MemoryManager::restore(snapshot.clone());
        assert_eq!(memory.snapshot(), snapshot);
        snapshot.summary_stale = false;
        assert_ne!(memory.snapshot(), snapshot);
    }
}
