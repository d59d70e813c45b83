use futures::stream::{FusedStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

use super::conversation::PendingTurn;
use crate::models::{ChatMessage, FragmentStream};
use crate::utils::SessionError;

/// Reply fragments of a streamed turn
///
/// Finite and single-use. When the remote stream ends the concatenated text is
/// stored as the model's reply; when it fails, or when this value is dropped
/// early, the user message is rolled back instead. The session stays busy for
/// as long as the stream is alive.
pub struct TurnStream<'a> {
    turn: Option<PendingTurn<'a>>,
    fragments: FragmentStream,
    collected: String,
    reply: Option<ChatMessage>,
}

impl<'a> TurnStream<'a> {
    pub(super) fn new(turn: PendingTurn<'a>, fragments: FragmentStream) -> Self {
        Self {
            turn: Some(turn),
            fragments,
            collected: String::new(),
            reply: None,
        }
    }

    /// The stored reply, once the stream has completed normally
    pub fn reply(&self) -> Option<&ChatMessage> {
        self.reply.as_ref()
    }
}

impl Stream for TurnStream<'_> {
    type Item = Result<String, SessionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.turn.is_none() {
            return Poll::Ready(None);
        }

        match this.fragments.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.collected.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(e))) => {
                debug!(error = %e, "Stream failed mid-reply, rolling back user message");
                if let Some(turn) = this.turn.take() {
                    turn.rollback();
                }
                Poll::Ready(Some(Err(e.into())))
            }
            Poll::Ready(None) => {
                if let Some(turn) = this.turn.take() {
                    let text = std::mem::take(&mut this.collected);
                    this.reply = Some(turn.commit(text));
                }
                Poll::Ready(None)
            }
        }
    }
}

impl FusedStream for TurnStream<'_> {
    fn is_terminated(&self) -> bool {
        self.turn.is_none()
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{ChatMessage, MockModelClient, ModelCatalog};
    use crate::session::Session;
    use crate::utils::{ModelError, SessionError};
    use futures::stream::{self, StreamExt};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn streaming_session(fragments: Vec<Result<String, ModelError>>) -> Session {
        let mut client = MockModelClient::new();
        client
            .expect_generate_stream()
            .returning(move |_, _| Ok(stream::iter(fragments.clone()).boxed()));
        Session::new(
            Arc::new(client),
            Arc::new(ModelCatalog::default()),
            "gemini-2.0-flash",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_completed_stream_stores_concatenation() {
        let session = streaming_session(vec![
            Ok("Hel".to_string()),
            Ok("lo, ".to_string()),
            Ok("world".to_string()),
        ]);

        let mut turn = session.send_turn_streaming("greet me").await.unwrap();
        let mut shown = Vec::new();
        while let Some(fragment) = turn.next().await {
            shown.push(fragment.unwrap());
        }

        assert_eq!(shown, vec!["Hel", "lo, ", "world"]);
        assert_eq!(turn.reply(), Some(&ChatMessage::model("Hello, world")));
        drop(turn);

        assert_eq!(
            session.history(),
            vec![ChatMessage::user("greet me"), ChatMessage::model("Hello, world")]
        );
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_mid_stream_error_rolls_back() {
        let session = streaming_session(vec![
            Ok("partial".to_string()),
            Err(ModelError::Network("stream reset".to_string())),
            Ok("never seen".to_string()),
        ]);

        let mut turn = session.send_turn_streaming("hello").await.unwrap();
        assert_eq!(turn.next().await, Some(Ok("partial".to_string())));
        assert_eq!(
            turn.next().await,
            Some(Err(SessionError::RemoteService(ModelError::Network(
                "stream reset".to_string()
            ))))
        );
        assert_eq!(turn.next().await, None);
        assert!(turn.reply().is_none());
        drop(turn);

        assert!(session.history().is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_stream_start_failure_rolls_back() {
        let mut client = MockModelClient::new();
        client
            .expect_generate_stream()
            .returning(|_, _| Err(ModelError::Api { status: 429, message: "quota".to_string() }));
        let session = Session::with_history(
            Arc::new(client),
            Arc::new(ModelCatalog::default()),
            "1",
            vec![ChatMessage::user("a"), ChatMessage::model("b")],
        )
        .unwrap();

        let err = session.send_turn_streaming("c").await.err().unwrap();
        assert!(matches!(err, SessionError::RemoteService(ModelError::Api { status: 429, .. })));
        assert_eq!(
            session.history(),
            vec![ChatMessage::user("a"), ChatMessage::model("b")]
        );
    }

    #[tokio::test]
    async fn test_session_is_busy_while_stream_alive() {
        let session = streaming_session(vec![Ok("x".to_string())]);

        let turn = session.send_turn_streaming("first").await.unwrap();
        assert!(session.is_busy());
        assert_eq!(session.send_turn("second").await, Err(SessionError::Busy));

        // Abandoning the stream counts as a failed turn
        drop(turn);
        assert!(!session.is_busy());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_never_opens_stream() {
        let mut client = MockModelClient::new();
        client.expect_generate_stream().never();
        let session = Session::new(
            Arc::new(client),
            Arc::new(ModelCatalog::default()),
            "1",
        )
        .unwrap();

        assert!(matches!(
            session.send_turn_streaming("  ").await,
            Err(SessionError::EmptyInput)
        ));
    }
}
