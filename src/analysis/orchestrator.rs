//! Analysis orchestration: classification followed by subtask generation.
//!
//! [`TaskAnalyzer::analyze`] runs both requests and always returns. [`TaskAnalyzer::analyze_stream`]
//! runs the same pipeline as a pull-driven stream of [`AnalysisEvent`]s: nothing happens until
//! the consumer polls, and dropping the stream cancels whatever step is pending.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::{FutureExt, Stream};
use serde::{Deserialize, Serialize};

use crate::config::{AnalyzerConfig, StreamPacing};
use crate::error::AnalysisError;
use crate::llm::{select_backend, ModelBackend, TextGenerator};

use super::events::{AnalysisEvent, AnalysisStep};
use super::executor::Executor;
use super::record::SharedRecordSink;
use super::schema::{ClassificationResult, StructuredOutput, SubtaskList};

/// Combined result of a full analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub classification: ClassificationResult,
    pub subtasks: SubtaskList,
}

pub struct TaskAnalyzer<G = ModelBackend> {
    executor: Executor<G>,
    pacing: StreamPacing,
}

impl TaskAnalyzer<ModelBackend> {
    /// Select a backend per `config` and bind an analyzer to it.
    ///
    /// This is the only operation that surfaces an error: an invalid configuration, or no
    /// backend that can be initialized, means the analyzer cannot exist.
    pub async fn connect(
        config: &AnalyzerConfig,
        sink: SharedRecordSink,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        let backend = select_backend(config).await?;
        tracing::info!(backend = %backend.identity(), "Task analyzer ready");
        Ok(Self::new(backend, sink).with_pacing(config.pacing))
    }
}

impl<G: TextGenerator> TaskAnalyzer<G> {
    pub fn new(backend: G, sink: SharedRecordSink) -> Self {
        Self {
            executor: Executor::new(backend, sink),
            pacing: StreamPacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: StreamPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn backend(&self) -> &G {
        self.executor.backend()
    }

    pub async fn classify(&self, title: &str, description: &str) -> ClassificationResult {
        self.executor.run(title, description).await
    }

    pub async fn suggest_subtasks(&self, title: &str, description: &str) -> SubtaskList {
        self.executor.run(title, description).await
    }

    /// Classify, then generate subtasks. Both always run; failures come back as defaults.
    pub async fn analyze(&self, title: &str, description: &str) -> TaskAnalysis {
        let classification = self.classify(title, description).await;
        let subtasks = self.suggest_subtasks(title, description).await;
        TaskAnalysis {
            classification,
            subtasks,
        }
    }

    /// Stream the analysis as progress events.
    ///
    /// Emits `start`, an announcement and a result (or `error`) for each phase, then exactly
    /// one `complete` carrying the combined result. A phase that panics yields an `error`
    /// event and the stream default; later phases still run.
    pub fn analyze_stream<'a>(
        &'a self,
        title: &'a str,
        description: &'a str,
    ) -> impl Stream<Item = AnalysisEvent> + Send + 'a {
        async_stream::stream! {
            yield AnalysisEvent::start();
            pause(self.pacing.after_start_ms).await;

            yield AnalysisEvent::announce(AnalysisStep::Classification);
            let classification = match self
                .guarded::<ClassificationResult>(AnalysisStep::Classification, title, description)
                .await
            {
                Ok(result) => {
                    yield AnalysisEvent::classified(&result);
                    result
                }
                Err(err) => {
                    tracing::error!(step = %AnalysisStep::Classification, "{}", err);
                    yield AnalysisEvent::failed(AnalysisStep::Classification, stream_reason(&err));
                    ClassificationResult::stream_fallback()
                }
            };
            pause(self.pacing.between_phases_ms).await;

            yield AnalysisEvent::announce(AnalysisStep::Subtasks);
            let subtasks = match self
                .guarded::<SubtaskList>(AnalysisStep::Subtasks, title, description)
                .await
            {
                Ok(list) => {
                    yield AnalysisEvent::subtasks_generated(&list);
                    list
                }
                Err(err) => {
                    tracing::error!(step = %AnalysisStep::Subtasks, "{}", err);
                    yield AnalysisEvent::failed(AnalysisStep::Subtasks, stream_reason(&err));
                    SubtaskList::stream_fallback()
                }
            };
            pause(self.pacing.before_complete_ms).await;

            yield AnalysisEvent::complete(&TaskAnalysis {
                classification,
                subtasks,
            });
        }
    }

    async fn guarded<T: StructuredOutput>(
        &self,
        step: AnalysisStep,
        title: &str,
        description: &str,
    ) -> Result<T, AnalysisError> {
        AssertUnwindSafe(self.executor.run::<T>(title, description))
            .catch_unwind()
            .await
            .map_err(|payload| AnalysisError::Stream {
                step,
                message: panic_message(payload.as_ref()),
            })
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn stream_reason(err: &AnalysisError) -> String {
    match err {
        AnalysisError::Stream { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::events::{EventData, EventType};
    use crate::analysis::record::MemorySink;
    use crate::analysis::schema::{Priority, TaskCategory};
    use crate::llm::testing::{Reply, ScriptedGenerator, RETREAT_CLASSIFICATION, RETREAT_SUBTASKS};
    use futures::StreamExt;
    use std::sync::Arc;

    const TITLE: &str = "Plan company retreat";
    const DESCRIPTION: &str = "Organize a 3-day team retreat for 20 people";

    fn retreat_script() -> Vec<Reply> {
        vec![
            Reply::Text(RETREAT_CLASSIFICATION.to_string()),
            Reply::Text(RETREAT_SUBTASKS.to_string()),
        ]
    }

    fn analyzer(generator: ScriptedGenerator) -> (TaskAnalyzer<ScriptedGenerator>, MemorySink) {
        let sink = MemorySink::new();
        let analyzer =
            TaskAnalyzer::new(generator, Arc::new(sink.clone())).with_pacing(StreamPacing::none());
        (analyzer, sink)
    }

    fn shape(events: &[AnalysisEvent]) -> Vec<(EventType, AnalysisStep, bool)> {
        events
            .iter()
            .map(|e| (e.event_type, e.step, e.data.is_some()))
            .collect()
    }

    #[tokio::test]
    async fn test_retreat_scenario() {
        let (analyzer, sink) = analyzer(ScriptedGenerator::new(retreat_script()));

        let analysis = analyzer.analyze(TITLE, DESCRIPTION).await;

        assert_eq!(analysis.classification.category, TaskCategory::Work);
        assert_eq!(analysis.classification.priority, Priority::new(4).unwrap());
        assert_eq!(
            analysis.classification.reasoning,
            "Team event organised for the company."
        );
        let titles: Vec<&str> = analysis
            .subtasks
            .subtasks
            .iter()
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec![
                "Set retreat budget",
                "Book venue",
                "Plan activities",
                "Arrange catering"
            ]
        );
        assert_eq!(sink.len().await, 2);
    }

    #[tokio::test]
    async fn test_failing_backend_still_returns() {
        let (analyzer, sink) = analyzer(ScriptedGenerator::failing("model not loaded"));

        let analysis = analyzer.analyze(TITLE, DESCRIPTION).await;

        assert_eq!(analysis.classification.category, TaskCategory::Other);
        assert_eq!(analysis.classification.priority, Priority::MEDIUM);
        assert!(analysis.subtasks.subtasks.is_empty());
        assert!(sink.records().await.iter().all(|r| !r.success));
    }

    #[tokio::test]
    async fn test_classification_failure_does_not_skip_subtasks() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(vec![
            Reply::Text("I think this is work-related.".to_string()),
            Reply::Text(RETREAT_SUBTASKS.to_string()),
        ]));

        let analysis = analyzer.analyze(TITLE, DESCRIPTION).await;
        assert_eq!(analysis.classification.category, TaskCategory::Other);
        assert_eq!(analysis.subtasks.subtasks.len(), 4);
        assert_eq!(analyzer.backend().prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_analyze_is_idempotent_against_deterministic_backend() {
        let mut script = retreat_script();
        script.extend(retreat_script());
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(script));

        let first = analyzer.analyze(TITLE, DESCRIPTION).await;
        let second = analyzer.analyze(TITLE, DESCRIPTION).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stream_event_order() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(retreat_script()));

        let events: Vec<AnalysisEvent> = analyzer.analyze_stream(TITLE, DESCRIPTION).collect().await;

        assert_eq!(
            shape(&events),
            vec![
                (EventType::Start, AnalysisStep::Initialization, false),
                (EventType::Progress, AnalysisStep::Classification, false),
                (EventType::Progress, AnalysisStep::Classification, true),
                (EventType::Progress, AnalysisStep::Subtasks, false),
                (EventType::Progress, AnalysisStep::Subtasks, true),
                (EventType::Complete, AnalysisStep::Done, true),
            ]
        );
        assert_eq!(events[2].message, "Classified as 'work' with priority 4/5");
        assert_eq!(events[4].message, "Generated 4 actionable subtasks");
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_stream_completion_matches_analyze() {
        let (streaming, _) = analyzer(ScriptedGenerator::new(retreat_script()));
        let (direct, _) = analyzer(ScriptedGenerator::new(retreat_script()));

        let events: Vec<AnalysisEvent> =
            streaming.analyze_stream(TITLE, DESCRIPTION).collect().await;
        let expected = direct.analyze(TITLE, DESCRIPTION).await;

        let last = events.last().unwrap();
        assert_eq!(last.analysis(), Some(&expected));
        match &events[2].data {
            Some(EventData::Classification(c)) => assert_eq!(c, &expected.classification),
            other => panic!("Expected classification data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_with_failing_backend_reports_defaults_not_errors() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::failing("timeout"));

        let events: Vec<AnalysisEvent> = analyzer.analyze_stream(TITLE, DESCRIPTION).collect().await;

        assert!(events.iter().all(|e| e.event_type != EventType::Error));
        let analysis = events.last().unwrap().analysis().unwrap();
        assert_eq!(analysis.classification.category, TaskCategory::Other);
        assert!(analysis.subtasks.subtasks.is_empty());
    }

    #[tokio::test]
    async fn test_stream_phase_panic_becomes_error_event() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(vec![
            Reply::Panic("backend exploded".to_string()),
            Reply::Text(RETREAT_SUBTASKS.to_string()),
        ]));

        let events: Vec<AnalysisEvent> = analyzer.analyze_stream(TITLE, DESCRIPTION).collect().await;

        assert_eq!(
            shape(&events),
            vec![
                (EventType::Start, AnalysisStep::Initialization, false),
                (EventType::Progress, AnalysisStep::Classification, false),
                (EventType::Error, AnalysisStep::Classification, false),
                (EventType::Progress, AnalysisStep::Subtasks, false),
                (EventType::Progress, AnalysisStep::Subtasks, true),
                (EventType::Complete, AnalysisStep::Done, true),
            ]
        );
        assert_eq!(events[2].message, "Classification failed: backend exploded");

        let analysis = events.last().unwrap().analysis().unwrap();
        assert_eq!(analysis.classification, ClassificationResult::stream_fallback());
        assert_eq!(analysis.classification.reasoning, "Classification failed");
        assert_eq!(analysis.subtasks.subtasks.len(), 4);
    }

    #[tokio::test]
    async fn test_stream_is_pull_driven() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(retreat_script()));

        let stream = analyzer.analyze_stream(TITLE, DESCRIPTION);
        futures::pin_mut!(stream);
        assert!(analyzer.backend().prompts().is_empty());

        let first = stream.next().await.unwrap();
        assert_eq!(first.event_type, EventType::Start);
        let announce = stream.next().await.unwrap();
        assert_eq!(announce.step, AnalysisStep::Classification);
        assert!(analyzer.backend().prompts().is_empty());

        let classified = stream.next().await.unwrap();
        assert!(classified.data.is_some());
        assert_eq!(analyzer.backend().prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_work() {
        let (analyzer, sink) = analyzer(ScriptedGenerator::new(retreat_script()));

        let taken: Vec<AnalysisEvent> = analyzer
            .analyze_stream(TITLE, DESCRIPTION)
            .take(3)
            .collect()
            .await;
        assert_eq!(taken.len(), 3);

        assert_eq!(analyzer.backend().prompts().len(), 1);
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_requests_never_overlap() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(retreat_script()));

        let _events: Vec<AnalysisEvent> = analyzer.analyze_stream(TITLE, DESCRIPTION).collect().await;
        assert_eq!(analyzer.backend().max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_pacing_does_not_change_events() {
        let (analyzer, _sink) = analyzer(ScriptedGenerator::new(retreat_script()));
        let analyzer = analyzer.with_pacing(StreamPacing {
            after_start_ms: 1,
            between_phases_ms: 1,
            before_complete_ms: 1,
        });

        let events: Vec<AnalysisEvent> = analyzer.analyze_stream(TITLE, DESCRIPTION).collect().await;
        assert_eq!(events.len(), 6);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config_before_selection() {
        let config = AnalyzerConfig {
            temperature: 1.5,
            endpoint_url: "http://127.0.0.1:9".to_string(),
            fallback_enabled: false,
            ..AnalyzerConfig::default()
        };

        match TaskAnalyzer::connect(&config, Arc::new(MemorySink::new())).await {
            Err(err @ AnalysisError::Config(_)) => {
                assert_eq!(err.failure_label(), "config");
                assert!(err.to_string().contains("temperature"));
            }
            Err(other) => panic!("Expected config error, got {:?}", other),
            Ok(_) => panic!("Expected config error, got an analyzer"),
        }
    }

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(static_str.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
