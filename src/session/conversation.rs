use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::stream::TurnStream;
use crate::models::{ChatMessage, ModelCatalog, ModelClient, ModelEntry};
use crate::utils::SessionError;

/// Clears the in-flight flag on drop, so it is released on every exit path
pub(super) struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        if flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// History plus model selection, guarded together
#[derive(Debug)]
struct Conversation {
    model_id: String,
    messages: Vec<ChatMessage>,
    /// Bumped on every reset so a turn that started before it never touches the new history
    epoch: u64,
}

impl Conversation {
    fn reset(&mut self) {
        self.messages.clear();
        self.epoch += 1;
    }
}

/// A conversation with one remote model
///
/// Holds the ordered history that is sent in full on every turn, the selected
/// model and the in-flight flag. At most one turn runs at a time; a failed
/// turn leaves the history exactly as it was before the turn started.
pub struct Session {
    client: Arc<dyn ModelClient>,
    catalog: Arc<ModelCatalog>,
    state: Mutex<Conversation>,
    busy: AtomicBool,
}

impl Session {
    /// Create a session with an empty history
    ///
    /// `model` may be a catalog key or a model id.
    pub fn new(
        client: Arc<dyn ModelClient>,
        catalog: Arc<ModelCatalog>,
        model: &str,
    ) -> Result<Self, SessionError> {
        Self::with_history(client, catalog, model, Vec::new())
    }

    /// Create a session that continues an existing history
    ///
    /// The history is taken as-is; role order is not validated.
    pub fn with_history(
        client: Arc<dyn ModelClient>,
        catalog: Arc<ModelCatalog>,
        model: &str,
        history: Vec<ChatMessage>,
    ) -> Result<Self, SessionError> {
        let model_id = catalog
            .resolve(model)
            .map(|entry| entry.id.clone())
            .ok_or_else(|| SessionError::InvalidModel(model.to_string()))?;

        Ok(Self {
            client,
            catalog,
            state: Mutex::new(Conversation {
                model_id,
                messages: history,
                epoch: 0,
            }),
            busy: AtomicBool::new(false),
        })
    }

    pub fn list_models(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Id of the currently selected model
    pub fn current_model(&self) -> String {
        self.state.lock().model_id.clone()
    }

    /// Snapshot of the conversation history
    pub fn history(&self) -> Vec<ChatMessage> {
        self.state.lock().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Whether a turn is awaiting its response
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Switch to another model by key or id. Clears the history on success.
    pub fn select_model(&self, key_or_id: &str) -> Result<ModelEntry, SessionError> {
        let entry = self
            .catalog
            .resolve(key_or_id)
            .cloned()
            .ok_or_else(|| SessionError::InvalidModel(key_or_id.to_string()))?;

        let mut state = self.state.lock();
        state.model_id = entry.id.clone();
        state.reset();
        debug!(model = %entry.id, "Model selected, history cleared");

        Ok(entry)
    }

    /// Empty the history
    pub fn clear(&self) {
        self.state.lock().reset();
    }

    /// Send one user message and wait for the model's reply
    ///
    /// On success both messages are in the history and the reply is returned.
    /// On a remote failure the user message is rolled back, so the same text
    /// can be sent again.
    pub async fn send_turn(&self, text: &str) -> Result<ChatMessage, SessionError> {
        let (turn, model_id, messages) = self.begin_turn(text)?;

        match self.client.generate(&model_id, &messages).await {
            Ok(reply) => Ok(turn.commit(reply)),
            Err(e) => {
                debug!(model = %model_id, error = %e, "Turn failed, rolling back user message");
                turn.rollback();
                Err(e.into())
            }
        }
    }

    /// Send one user message and receive the reply as a stream of fragments
    ///
    /// The concatenated fragments are stored as the reply once the stream ends.
    /// An error at any point rolls the user message back; fragments that were
    /// already yielded stay with the caller.
    pub async fn send_turn_streaming(&self, text: &str) -> Result<TurnStream<'_>, SessionError> {
        let (turn, model_id, messages) = self.begin_turn(text)?;

        match self.client.generate_stream(&model_id, &messages).await {
            Ok(fragments) => Ok(TurnStream::new(turn, fragments)),
            Err(e) => {
                debug!(model = %model_id, error = %e, "Stream failed to start, rolling back user message");
                turn.rollback();
                Err(e.into())
            }
        }
    }

    /// Validate input, take the in-flight flag and append the user message
    fn begin_turn(
        &self,
        text: &str,
    ) -> Result<(PendingTurn<'_>, String, Vec<ChatMessage>), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let guard = BusyGuard::acquire(&self.busy)?;

        let mut state = self.state.lock();
        let len_before = state.messages.len();
        state.messages.push(ChatMessage::user(text));

        debug!(model = %state.model_id, messages = state.messages.len(), "Sending turn");

        let turn = PendingTurn {
            session: self,
            _guard: guard,
            epoch: state.epoch,
            len_before,
            finished: false,
        };
        Ok((turn, state.model_id.clone(), state.messages.clone()))
    }
}

/// A turn whose user message is in the history but whose reply is outstanding
///
/// Dropping it without `commit` rolls the user message back.
pub(super) struct PendingTurn<'a> {
    session: &'a Session,
    _guard: BusyGuard<'a>,
    epoch: u64,
    len_before: usize,
    finished: bool,
}

impl PendingTurn<'_> {
    /// Append the reply and return it
    pub(super) fn commit(mut self, text: String) -> ChatMessage {
        let reply = ChatMessage::model(text);
        let mut state = self.session.state.lock();
        if state.epoch == self.epoch {
            state.messages.push(reply.clone());
        } else {
            debug!("History was reset during the turn, reply not stored");
        }
        self.finished = true;
        reply
    }

    /// Restore the history to its state before the turn
    pub(super) fn rollback(mut self) {
        self.undo();
        self.finished = true;
    }

    fn undo(&self) {
        let mut state = self.session.state.lock();
        if state.epoch == self.epoch {
            state.messages.truncate(self.len_before);
        }
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Turn abandoned before completion, rolling back user message");
            self.undo();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FragmentStream, MockModelClient};
    use crate::utils::ModelError;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    fn session_with(client: MockModelClient) -> Session {
        Session::new(
            Arc::new(client),
            Arc::new(ModelCatalog::default()),
            "gemini-2.0-flash",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_turn_appends_both_messages() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .withf(|model, messages| {
                model.to_string() == "gemini-2.0-flash"
                    && messages.to_vec() == vec![ChatMessage::user("hello")]
            })
            .times(1)
            .returning(|_, _| Ok("hi there".to_string()));

        let session = session_with(client);
        let reply = session.send_turn("hello").await.unwrap();

        assert_eq!(reply, ChatMessage::model("hi there"));
        assert_eq!(
            session.history(),
            vec![ChatMessage::user("hello"), ChatMessage::model("hi there")]
        );
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_history_alternates_and_is_sent_in_full() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .withf(|_, messages| messages.len() % 2 == 1)
            .returning(|_, messages| Ok(format!("reply to {} messages", messages.len())));

        let session = session_with(client);
        for i in 0..4 {
            session.send_turn(&format!("turn {}", i)).await.unwrap();
        }

        let history = session.history();
        assert_eq!(history.len(), 8);
        for (i, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0], ChatMessage::user(format!("turn {}", i)));
            assert_eq!(pair[1], ChatMessage::model(format!("reply to {} messages", 2 * i + 1)));
        }
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_without_request() {
        let mut client = MockModelClient::new();
        client.expect_generate().never();

        let session = session_with(client);
        assert_eq!(session.send_turn("").await, Err(SessionError::EmptyInput));
        assert_eq!(session.send_turn("   \n\t").await, Err(SessionError::EmptyInput));
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_remote_failure_rolls_back_and_allows_retry() {
        let mut client = MockModelClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("first reply".to_string()));
        client
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ModelError::Network("connection reset".to_string())));
        client
            .expect_generate()
            .withf(|_, messages| {
                messages.len() == 3 && messages[2] == ChatMessage::user("second")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("second reply".to_string()));

        let session = session_with(client);
        session.send_turn("first").await.unwrap();
        let before = session.history();

        let err = session.send_turn("second").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::RemoteService(ModelError::Network("connection reset".to_string()))
        );
        assert_eq!(session.history(), before);
        assert!(!session.is_busy());

        session.send_turn("second").await.unwrap();
        assert_eq!(session.message_count(), 4);
    }

    #[tokio::test]
    async fn test_failure_on_empty_history_leaves_it_empty() {
        let mut client = MockModelClient::new();
        client.expect_generate().returning(|_, _| {
            Err(ModelError::Api {
                status: 503,
                message: "overloaded".to_string(),
            })
        });

        let session = session_with(client);
        let err = session.send_turn("hello").await.unwrap_err();

        assert!(matches!(err, SessionError::RemoteService(_)));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_select_model_clears_history() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .returning(|_, _| Ok("ok".to_string()));

        let session = session_with(client);
        session.send_turn("a").await.unwrap();
        session.send_turn("b").await.unwrap();

        let entry = session.select_model("3").unwrap();
        assert_eq!(entry.id, "gemini-1.5-pro");
        assert_eq!(session.current_model(), "gemini-1.5-pro");
        assert!(session.history().is_empty());

        // Selecting by id works too, and on an empty history
        session.select_model("gemini-2.0-flash-lite").unwrap();
        assert_eq!(session.current_model(), "gemini-2.0-flash-lite");
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_model_leaves_state_unchanged() {
        let mut client = MockModelClient::new();
        client
            .expect_generate()
            .returning(|_, _| Ok("ok".to_string()));

        let session = session_with(client);
        session.send_turn("a").await.unwrap();
        let before = session.history();

        assert_eq!(
            session.select_model("99"),
            Err(SessionError::InvalidModel("99".to_string()))
        );
        assert_eq!(session.current_model(), "gemini-2.0-flash");
        assert_eq!(session.history(), before);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let session = Session::with_history(
            Arc::new(MockModelClient::new()),
            Arc::new(ModelCatalog::default()),
            "1",
            vec![ChatMessage::user("a"), ChatMessage::model("b")],
        )
        .unwrap();

        session.clear();
        assert!(session.history().is_empty());
        session.clear();
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_unknown_initial_model_is_rejected() {
        let result = Session::new(
            Arc::new(MockModelClient::new()),
            Arc::new(ModelCatalog::default()),
            "gpt-4",
        );
        assert!(matches!(result, Err(SessionError::InvalidModel(_))));
    }

    /// Client whose replies wait until the test opens the gate
    struct GatedClient {
        gate: Arc<Notify>,
        fail: bool,
    }

    #[async_trait]
    impl ModelClient for GatedClient {
        async fn generate(
            &self,
            _model_id: &str,
            messages: &[ChatMessage],
        ) -> Result<String, ModelError> {
            self.gate.notified().await;
            if self.fail {
                return Err(ModelError::Network("gone".to_string()));
            }
            Ok(format!("answered {}", messages.len()))
        }

        async fn generate_stream(
            &self,
            _model_id: &str,
            _messages: &[ChatMessage],
        ) -> Result<FragmentStream, ModelError> {
            Ok(stream::empty().boxed())
        }
    }

    #[tokio::test]
    async fn test_overlapping_turn_is_busy() {
        let gate = Arc::new(Notify::new());
        let session = Session::new(
            Arc::new(GatedClient { gate: gate.clone(), fail: false }),
            Arc::new(ModelCatalog::default()),
            "gemini-2.0-flash",
        )
        .unwrap();

        let (first, second) = tokio::join!(session.send_turn("first"), async {
            let result = session.send_turn("second").await;
            gate.notify_one();
            result
        });

        assert_eq!(second, Err(SessionError::Busy));
        assert_eq!(first.unwrap(), ChatMessage::model("answered 1"));
        assert_eq!(
            session.history(),
            vec![ChatMessage::user("first"), ChatMessage::model("answered 1")]
        );
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_cancelled_turn_rolls_back() {
        let gate = Arc::new(Notify::new());
        let session = Session::new(
            Arc::new(GatedClient { gate, fail: false }),
            Arc::new(ModelCatalog::default()),
            "gemini-2.0-flash",
        )
        .unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            session.send_turn("never answered"),
        )
        .await;

        assert!(result.is_err());
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
    }

    async fn switch_during_turn(fail: bool) -> (Result<ChatMessage, SessionError>, Session) {
        let gate = Arc::new(Notify::new());
        let session = Session::with_history(
            Arc::new(GatedClient { gate: gate.clone(), fail }),
            Arc::new(ModelCatalog::default()),
            "gemini-2.0-flash",
            vec![ChatMessage::user("a"), ChatMessage::model("b")],
        )
        .unwrap();

        let (result, _) = tokio::join!(session.send_turn("c"), async {
            tokio::task::yield_now().await;
            session.select_model("2").unwrap();
            gate.notify_one();
        });
        (result, session)
    }

    #[tokio::test]
    async fn test_reply_after_model_switch_is_not_stored() {
        let (result, session) = switch_during_turn(false).await;

        assert_eq!(result, Ok(ChatMessage::model("answered 3")));
        assert_eq!(session.current_model(), "gemini-2.0-flash-lite");
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_failure_after_model_switch_leaves_new_history_alone() {
        let (result, session) = switch_during_turn(true).await;

        assert!(matches!(result, Err(SessionError::RemoteService(_))));
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
    }
}
