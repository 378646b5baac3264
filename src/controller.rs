use log::{ debug, info, warn };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::{ ClientError, ScreeningBackend };
use crate::models::chat::{ ChatRequest, Message };
use crate::progress::{ resolve_stage, Stage };
use crate::renderer::{ RevealOutcome, StreamingRenderer };
use crate::session::{ Session, SessionStore, Theme };

/// What the presentation layer renders. Published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub messages: Vec<Message>,
    pub stage: Stage,
    pub is_loading: bool,
    pub is_typing: bool,
    pub ended: bool,
    pub theme: Theme,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("input was empty")]
    EmptyInput,
    #[error("a message is already being processed")]
    Busy,
    #[error("the screening session has ended")]
    Ended,
    #[error("the session was reset before the reply was delivered")]
    Discarded,
    #[error(transparent)]
    Request(#[from] ClientError),
}

struct ConversationState {
    session: Session,
    stage: Stage,
    processing: bool,
    typing: bool,
    /// Bumped on reset; replies and reveal ticks from an older generation are ignored.
    generation: u64,
    /// Covers the pending request and the reveal of the current turn.
    turn_token: Option<CancellationToken>,
}

impl ConversationState {
    fn new(session: Session) -> Self {
        let stage = resolve_stage(&session.transcript, session.ended);
        Self {
            session,
            stage,
            processing: false,
            typing: false,
            generation: 0,
            turn_token: None,
        }
    }

    /// Transcript without the greeting seed.
    fn history(&self) -> Vec<Message> {
        self.session.transcript[self.session.seed_len()..].to_vec()
    }

    fn refresh_stage(&mut self) {
        self.stage = resolve_stage(&self.session.transcript, self.session.ended);
    }

    fn view(&self) -> ViewModel {
        ViewModel {
            messages: self.session.transcript.clone(),
            stage: self.stage,
            is_loading: self.processing,
            is_typing: self.typing,
            ended: self.session.ended,
            theme: self.session.theme,
        }
    }
}

/// Owns the live screening session and sequences every turn of it.
pub struct ConversationController {
    state: Mutex<ConversationState>,
    backend: Arc<dyn ScreeningBackend>,
    store: SessionStore,
    renderer: StreamingRenderer,
    view_tx: watch::Sender<ViewModel>,
}

impl ConversationController {
    /// Restores the stored session when there is a usable one, otherwise seeds a fresh one.
    pub fn initialize(
        backend: Arc<dyn ScreeningBackend>,
        store: SessionStore,
        renderer: StreamingRenderer
    ) -> Self {
        let session = match store.load() {
            Some(session) => {
                info!(
                    "Restored screening session ({} messages, ended={})",
                    session.transcript.len(),
                    session.ended
                );
                session
            }
            None => {
                info!("Starting a new screening session");
                let session = Session::seeded(store.load_theme());
                store.save(&session);
                session
            }
        };

        let state = ConversationState::new(session);
        let (view_tx, _) = watch::channel(state.view());
        Self {
            state: Mutex::new(state),
            backend,
            store,
            renderer,
            view_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> ViewModel {
        self.lock().view()
    }

    pub fn stage(&self) -> Stage {
        self.lock().stage
    }

    pub fn is_ended(&self) -> bool {
        self.lock().session.ended
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, state: &ConversationState, persist: bool) {
        if persist {
            self.store.save(&state.session);
        }
        self.view_tx.send_replace(state.view());
    }

    /// One screening turn: append the candidate's message, ask the backend, reveal the reply.
    /// Blank input, a pending turn (request or reveal) and an ended session are rejected
    /// without touching the transcript.
    pub async fn submit_user_input(&self, text: &str) -> Result<Message, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        let (request, generation, token) = {
            let mut state = self.lock();
            if state.session.ended {
                debug!("Ignoring input, session has ended");
                return Err(SubmitError::Ended);
            }
            if state.processing || state.typing {
                debug!("Ignoring input, a turn is already in flight");
                return Err(SubmitError::Busy);
            }

            let request = ChatRequest {
                message: Some(text.to_string()),
                chat_history: state.history(),
            };
            state.session.transcript.push(Message::user(text).stamped());
            state.processing = true;
            let token = CancellationToken::new();
            state.turn_token = Some(token.clone());
            self.commit(&state, true);
            (request, state.generation, token)
        };

        let result = tokio::select! {
            _ = token.cancelled() => {
                info!("Abandoning pending request, the session was reset");
                return Err(SubmitError::Discarded);
            }
            result = self.backend.send(&request) => result,
        };

        let (slot, full_text) = {
            let mut state = self.lock();
            if state.generation != generation {
                info!("Dropping reply that arrived after the session was reset");
                return Err(SubmitError::Discarded);
            }
            state.processing = false;

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Screening request failed: {}", e);
                    // Tagged with the current stage so a restored session lands where this one is.
                    let stage = state.stage;
                    state.session.transcript.push(
                        Message::assistant(e.user_message()).stamped().with_stage(Some(stage))
                    );
                    state.turn_token = None;
                    self.commit(&state, true);
                    return Err(SubmitError::Request(e));
                }
            };

            if reply.is_ending {
                info!("Screening session ended");
                state.session.ended = true;
            }
            state.session.transcript.push(Message::assistant("").stamped().with_stage(reply.stage));
            state.typing = true;
            self.commit(&state, false);
            (state.session.transcript.len() - 1, reply.message)
        };

        let outcome = self.renderer.reveal(&full_text, &token, |partial| {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            if let Some(message) = state.session.transcript.get_mut(slot) {
                message.content = partial.to_string();
            }
            self.commit(&state, false);
        }).await;

        if outcome == RevealOutcome::Cancelled {
            return Err(SubmitError::Discarded);
        }

        let mut state = self.lock();
        if state.generation != generation {
            return Err(SubmitError::Discarded);
        }
        let message = match state.session.transcript.get_mut(slot) {
            Some(message) => {
                message.content = full_text;
                message.clone()
            }
            None => {
                return Err(SubmitError::Discarded);
            }
        };
        state.typing = false;
        state.turn_token = None;
        state.refresh_stage();
        self.commit(&state, true);
        Ok(message)
    }

    /// Discards the transcript and starts over from the greeting, whatever state the
    /// current session is in. A pending request or running reveal is cancelled.
    pub fn reset_session(&self) {
        let mut state = self.lock();
        if let Some(token) = state.turn_token.take() {
            token.cancel();
        }
        state.generation += 1;
        let theme = state.session.theme;
        state.session = Session::seeded(theme);
        state.processing = false;
        state.typing = false;
        state.refresh_stage();
        self.commit(&state, true);
        info!("Screening session reset");
    }

    pub fn toggle_theme(&self) -> Theme {
        let mut state = self.lock();
        state.session.theme = state.session.theme.toggled();
        self.commit(&state, true);
        state.session.theme
    }
}
