use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::NavResult;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::{CallConfig, ChatMessage, ImageUrl};
use crate::navigation::action::{Move, Status};
use crate::navigation::note::Note;
use crate::navigation::parser::parse_reply;
use crate::navigation::prompt::build_prompt;
use crate::navigation::state::{ActionLog, Arrival, LogEntry, StateStore};
use crate::perception::frame::{frame_key, load_frame};

/// Everything computed from state before the model is asked. Building one
/// writes nothing.
#[derive(Debug, Clone)]
pub struct PreparedStep {
    /// State key of the frame (its file name).
    pub image: String,
    /// Arrival implied by the last-success pointer, not yet persisted.
    pub pending_arrival: Option<Arrival>,
    pub note: Note,
    pub prompt: String,
    log: ActionLog,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub image: String,
    /// Raw model reply, trimmed.
    pub reply: String,
    /// Rendered note that was embedded in the prompt.
    pub note: String,
    pub entry: LogEntry,
    /// False when the action already existed for this frame.
    pub recorded: bool,
    /// True when a failure flipped the previous frame's successful entry.
    pub marked_lost: bool,
}

pub struct Navigator {
    store: StateStore,
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
}

impl Navigator {
    pub fn new(store: StateStore, provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self {
            store,
            provider,
            call,
        }
    }

    /// Wire a navigator from config: state paths plus the vision provider.
    pub fn from_config(config: &AppConfig) -> NavResult<Self> {
        let registry = ProviderRegistry::from_config(config);
        let (provider, call) = registry.vision_call_config()?;
        Ok(Self::new(StateStore::from_config(&config.state), provider, call))
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn prepare(&self, image_path: &Path, target: &str) -> NavResult<PreparedStep> {
        let image = frame_key(image_path)?;
        let log = self.store.load_action_log()?;
        let failed = log.failed_actions(&image);

        // Any usable pointer is an arrival, including one naming this same frame.
        let pending_arrival = self
            .store
            .last_success()?
            .filter(|last| !last.image.is_empty() && !last.action.is_empty())
            .map(|last| Arrival {
                from: last.image,
                via: last.action,
            });

        let arrival = match &pending_arrival {
            Some(pending) => Some(pending.clone()),
            None => self.store.arrival(&image)?,
        };

        let note = Note::build(failed, arrival.as_ref().map(|a| a.via.as_str()));
        let prompt = build_prompt(target, &note.render());

        Ok(PreparedStep {
            image,
            pending_arrival,
            note,
            prompt,
            log,
        })
    }

    /// Run one navigation step: query the model for `image_path` and fold the
    /// reply into the state files.
    pub async fn step(&self, image_path: &Path, target: &str) -> NavResult<StepOutcome> {
        let PreparedStep {
            image,
            pending_arrival,
            note,
            prompt,
            mut log,
        } = self.prepare(image_path, target)?;

        if let Some(arrival) = &pending_arrival {
            self.store
                .record_arrival(&image, &arrival.from, &arrival.via)?;
            tracing::info!(image = %image, from = %arrival.from, via = %arrival.via, "arrival recorded");
        }

        let frame = load_frame(image_path)?;
        let message = ChatMessage::user_with_image(
            prompt,
            ImageUrl {
                url: frame.data_url(),
                detail: Some(self.call.detail.clone()),
            },
        );

        tracing::info!(
            image = %image,
            target = %target,
            provider = %self.provider.name(),
            forbidden = note.forbidden.len(),
            "querying model"
        );
        let response = self.provider.chat(vec![message], &self.call).await?;
        let reply = response.content.trim().to_string();

        let entry = LogEntry::from(parse_reply(&reply));
        if Move::parse(&entry.action).is_none() {
            tracing::warn!(action = %entry.action, "reply action is not a recognised command");
        }
        tracing::info!(image = %image, action = %entry.action, status = ?entry.status, "reply parsed");

        let recorded = log.record(&image, entry.clone());
        if !recorded {
            tracing::debug!(image = %image, action = %entry.action, "action already logged for frame");
        }

        let mut marked_lost = false;
        match entry.status {
            Status::Fail => {
                if let Some(last) = self.store.last_success()? {
                    marked_lost = log.mark_lost(&last);
                    if marked_lost {
                        tracing::info!(image = %last.image, action = %last.action, "previous action marked as lost target");
                    }
                }
            }
            Status::Ok => self.store.set_last_success(&image, &entry.action)?,
        }

        self.store.save_action_log(&log)?;

        Ok(StepOutcome {
            image,
            reply,
            note: note.render(),
            entry,
            recorded,
            marked_lost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::errors::NavError;
    use crate::llm::types::{ContentPart, LlmResponse, MessageContent};
    use crate::navigation::state::LastSuccess;

    /// Replays canned replies and keeps every prompt it was sent.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<NavResult<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn with(replies: Vec<NavResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::default(),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> NavResult<LlmResponse> {
            if let MessageContent::Parts(parts) = &messages[0].content {
                for part in parts {
                    match part {
                        ContentPart::Text { text } => {
                            self.prompts.lock().unwrap().push(text.clone());
                        }
                        ContentPart::ImageUrl { image_url } => {
                            assert!(image_url.url.starts_with("data:image/png;base64,"));
                        }
                    }
                }
            }
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected model call")?;
            Ok(LlmResponse {
                content,
                reasoning: String::new(),
            })
        }
    }

    fn call_config() -> CallConfig {
        CallConfig {
            model: "test".into(),
            temperature: 0.0,
            max_tokens: 100,
            stream: false,
            detail: "auto".into(),
        }
    }

    struct Fixture {
        dir: TempDir,
        provider: Arc<ScriptedProvider>,
        nav: Navigator,
    }

    impl Fixture {
        fn new(replies: Vec<&str>) -> Self {
            Self::with_results(replies.into_iter().map(|r| Ok(r.to_string())).collect())
        }

        fn with_results(replies: Vec<NavResult<String>>) -> Self {
            let dir = TempDir::new().unwrap();
            let provider = ScriptedProvider::with(replies);
            let nav = Navigator::new(
                StateStore::in_dir(dir.path().join("state")),
                provider.clone(),
                call_config(),
            );
            Self { dir, provider, nav }
        }

        fn frame(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            if !path.exists() {
                image::RgbImage::from_pixel(8, 8, image::Rgb([90, 90, 90]))
                    .save(&path)
                    .unwrap();
            }
            path
        }

        fn read_json(&self, file: &str) -> serde_json::Value {
            let raw = std::fs::read_to_string(self.dir.path().join("state").join(file)).unwrap();
            serde_json::from_str(&raw).unwrap()
        }
    }

    const STONES: &str = "Pile of 3 gray stones";

    #[tokio::test]
    async fn ok_step_sets_last_success() {
        let fx = Fixture::new(vec![
            "Action: go left 0.5m\nThe stones sit at the left edge.\nObstacles: none",
        ]);
        let outcome = fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();

        assert_eq!(outcome.entry.action, "go left 0.5m");
        assert_eq!(outcome.entry.status, Status::Ok);
        assert!(outcome.recorded);
        assert_eq!(
            fx.read_json("last_success.json"),
            serde_json::json!({"image": "1.png", "action": "go left 0.5m"})
        );
        assert_eq!(fx.read_json("action_log.json")["1.png"][0]["description"], "The stones sit at the left edge.");
        assert!(fx.provider.last_prompt().contains("Find and reach the Pile of 3 gray stones."));
    }

    #[tokio::test]
    async fn arrival_forbids_reversal_on_next_frame() {
        let fx = Fixture::new(vec!["Action: go left 0.5m", "Action: go straight 1m"]);
        fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();
        let outcome = fx.nav.step(&fx.frame("2.png"), STONES).await.unwrap();

        assert!(outcome.note.contains("failed before: go right 0.5m."));
        assert!(fx.provider.last_prompt().contains("go right 0.5m. DO NOT REPEAT THEM!"));
        assert_eq!(
            fx.read_json("arrivals.json")["2.png"],
            serde_json::json!({"from": "1.png", "via": "go left 0.5m"})
        );
    }

    #[test]
    fn stored_arrival_is_used_without_pending_pointer() {
        let fx = Fixture::new(vec![]);
        fx.nav
            .store()
            .record_arrival("2.png", "1.png", "go left 0.5m")
            .unwrap();

        let prepared = fx.nav.prepare(&fx.frame("2.png"), STONES).unwrap();
        assert!(prepared.pending_arrival.is_none());
        assert_eq!(prepared.note.forbidden, vec!["go right 0.5m"]);
    }

    #[tokio::test]
    async fn target_lost_marks_previous_success() {
        let fx = Fixture::new(vec![
            "Action: go left 0.5m",
            "Action: target lost — return to previous position and try a different direction\nObstacles: none",
        ]);
        fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();
        let outcome = fx.nav.step(&fx.frame("2.png"), STONES).await.unwrap();

        assert_eq!(outcome.entry.status, Status::Fail);
        assert!(outcome.marked_lost);

        let log = fx.read_json("action_log.json");
        assert_eq!(log["1.png"][0]["status"], "fail");
        assert_eq!(log["1.png"][0]["action"], "go left 0.5m — bad action - lost target");
        assert_eq!(log["2.png"][0]["status"], "fail");
        // A failure never moves the pointer.
        assert_eq!(
            fx.nav.store().last_success().unwrap(),
            Some(LastSuccess {
                image: "1.png".into(),
                action: "go left 0.5m".into()
            })
        );
    }

    #[tokio::test]
    async fn returning_to_frame_forbids_failed_action() {
        let fx = Fixture::new(vec![
            "Action: go left 0.5m",
            "Target lost — return to previous position",
            "Action: go up 1m",
        ]);
        fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();
        fx.nav.step(&fx.frame("2.png"), STONES).await.unwrap();
        let outcome = fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();

        // The pointer still names 1.png, so 1.png counts as reached from itself.
        assert_eq!(
            outcome.note,
            "Note: The following action(s) for this image have failed before: go left 0.5m, go right 0.5m. DO NOT REPEAT THEM!\n"
        );
        assert_eq!(
            fx.read_json("arrivals.json"),
            serde_json::json!({
                "1.png": {"from": "1.png", "via": "go left 0.5m"},
                "2.png": {"from": "1.png", "via": "go left 0.5m"},
            })
        );
    }

    #[test]
    fn rerun_of_last_successful_frame_is_an_arrival() {
        let fx = Fixture::new(vec![]);
        fx.nav.store().set_last_success("3.png", "go up 1m").unwrap();

        let prepared = fx.nav.prepare(&fx.frame("3.png"), STONES).unwrap();
        assert_eq!(
            prepared.pending_arrival,
            Some(Arrival {
                from: "3.png".into(),
                via: "go up 1m".into()
            })
        );
        assert_eq!(prepared.note.forbidden, vec!["go down 1m"]);
    }

    #[tokio::test]
    async fn rerun_with_same_action_does_not_duplicate() {
        let fx = Fixture::new(vec!["Action: go up 1m", "action: go up 1m\nStill above."]);
        fx.nav.step(&fx.frame("3.png"), STONES).await.unwrap();
        let outcome = fx.nav.step(&fx.frame("3.png"), STONES).await.unwrap();

        assert!(!outcome.recorded);
        let log = fx.read_json("action_log.json");
        assert_eq!(log["3.png"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reply_without_action_records_empty_action() {
        let fx = Fixture::new(vec!["I am not sure what to do."]);
        let outcome = fx.nav.step(&fx.frame("4.png"), STONES).await.unwrap();
        assert_eq!(outcome.entry.action, "");
        assert_eq!(outcome.entry.status, Status::Ok);
        assert_eq!(fx.nav.store().last_success().unwrap().unwrap().action, "");
    }

    #[tokio::test]
    async fn model_error_propagates_after_arrival_is_written() {
        let fx = Fixture::with_results(vec![
            Ok("Action: go down 0.5m".to_string()),
            Err(NavError::LlmProvider("503 Service Unavailable".into())),
        ]);
        fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();
        let err = fx.nav.step(&fx.frame("2.png"), STONES).await.unwrap_err();

        assert!(matches!(err, NavError::LlmProvider(_)));
        assert_eq!(fx.read_json("arrivals.json")["2.png"]["via"], "go down 0.5m");
        assert!(fx.read_json("action_log.json").get("2.png").is_none());
    }

    #[tokio::test]
    async fn prepare_writes_nothing() {
        let fx = Fixture::new(vec!["Action: go right 1m"]);
        fx.nav.step(&fx.frame("1.png"), STONES).await.unwrap();
        let prepared = fx.nav.prepare(&fx.frame("2.png"), STONES).unwrap();

        assert_eq!(prepared.image, "2.png");
        assert_eq!(prepared.note.forbidden, vec!["go left 1m"]);
        assert!(fx.nav.store().arrivals().unwrap().is_empty());
    }
}
