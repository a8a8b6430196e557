//! Turn handling: validates a chat request, routes it to the right dialogue
//! under the session's turn lock, and shapes the reply.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::{
    availability::SlotChecker,
    booking::{BookingOutcome, BookingState, TurnContext},
    clock::Clock,
    dialogue::is_cancel,
    error::{DialogueError, PersistenceError, RequestError},
    intent::classify,
    persistence::Persistence,
    prompting::{say, Line, Prompts},
    schedule::BusinessHours,
    session::{Flow, Origin, SessionLease, SessionManager},
    support::{SupportOutcome, SupportState},
    types::{
        BookingResult, ChatReply, ChatRequest, DialogueStep, EntryPoint, FlowKind, Intent,
        Language, SupportTicket,
    },
};

enum TurnResult {
    Continue(String),
    Booked {
        booking: BookingResult,
        reference: String,
        text: String,
    },
    TicketOpened {
        ticket: SupportTicket,
        reference: String,
        text: String,
    },
}

pub struct ChatEngine {
    sessions: Arc<SessionManager>,
    slots: SlotChecker,
    persistence: Arc<dyn Persistence>,
    prompts: Prompts,
    hours: BusinessHours,
    clock: Arc<dyn Clock>,
    default_language: Language,
}

impl ChatEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        slots: SlotChecker,
        persistence: Arc<dyn Persistence>,
        prompts: Prompts,
        hours: BusinessHours,
        default_language: Language,
    ) -> Self {
        let clock = sessions.clock().clone();
        Self {
            sessions,
            slots,
            persistence,
            prompts,
            hours,
            clock,
            default_language,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Falls back to the configured default for missing or unknown tags.
    pub fn language_or_default(&self, tag: Option<&str>) -> Language {
        tag.and_then(Language::from_tag)
            .unwrap_or(self.default_language)
    }

    pub async fn handle(
        &self,
        request: &ChatRequest,
        entry: EntryPoint,
    ) -> Result<ChatReply, RequestError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(RequestError::MissingMessage);
        }
        let session_id = request.session_id.trim();
        if session_id.is_empty() {
            return Err(RequestError::MissingSessionId);
        }
        let requested = request.language.as_deref().and_then(Language::from_tag);

        let (mut lease, origin) = match self
            .sessions
            .checkout_or_start(session_id, requested.unwrap_or(self.default_language))
            .await
        {
            Ok(checked_out) => checked_out,
            Err(err) => {
                error!(session_id, error = %err, "session checkout failed");
                let lang = requested.unwrap_or(self.default_language);
                return Ok(apology(lang, DialogueStep::General, None, json!({}), false));
            }
        };
        // Language is fixed once the session exists; only a fresh one takes the tag.
        if origin != Origin::Existing {
            if let Some(lang) = requested {
                lease.language = lang;
            }
        }
        let session_reset = origin == Origin::Replaced;
        if session_reset {
            info!(session_id, "expired session restarted");
        }

        let before = (lease.step(), lease.flow_kind(), lease.collected());
        match self.run_turn(&mut lease, message, entry).await {
            Ok(TurnResult::Continue(text)) => {
                let step = lease.step();
                let flow = lease.flow_kind();
                let data = lease.collected();
                let lang = lease.language;
                match lease.commit().await {
                    Ok(_) => {
                        debug!(session_id, ?step, ?flow, "turn committed");
                        Ok(ChatReply {
                            response: text,
                            step,
                            completed: false,
                            data,
                            flow,
                            reference: None,
                            session_reset,
                        })
                    }
                    Err(err) => {
                        error!(session_id, error = %err, "session commit failed");
                        let (step, flow, data) = before;
                        Ok(apology(lang, step, flow, data, session_reset))
                    }
                }
            }
            Ok(TurnResult::Booked {
                booking,
                reference,
                text,
            }) => {
                if let Err(err) = lease.finish().await {
                    warn!(session_id, error = %err, "could not remove finished session");
                }
                info!(session_id, %reference, "booking completed");
                Ok(ChatReply {
                    response: text,
                    step: DialogueStep::Finalize,
                    completed: true,
                    data: json!(booking),
                    flow: Some(FlowKind::Booking),
                    reference: Some(reference),
                    session_reset,
                })
            }
            Ok(TurnResult::TicketOpened {
                ticket,
                reference,
                text,
            }) => {
                if let Err(err) = lease.finish().await {
                    warn!(session_id, error = %err, "could not remove finished session");
                }
                info!(session_id, %reference, "ticket created");
                Ok(ChatReply {
                    response: text,
                    step: DialogueStep::TicketCreated,
                    completed: true,
                    data: json!(ticket),
                    flow: Some(FlowKind::Support),
                    reference: Some(reference),
                    session_reset,
                })
            }
            Err(err) => {
                error!(session_id, error = %err, "turn failed");
                let lang = lease.language;
                drop(lease);
                let (step, flow, data) = before;
                Ok(apology(lang, step, flow, data, session_reset))
            }
        }
    }

    async fn run_turn(
        &self,
        lease: &mut SessionLease<'_>,
        message: &str,
        entry: EntryPoint,
    ) -> Result<TurnResult, DialogueError> {
        let lang = lease.language;

        if is_cancel(message) {
            let line = match lease.flow {
                Flow::General => Line::Help,
                _ => Line::Cancelled,
            };
            lease.flow = Flow::General;
            return Ok(TurnResult::Continue(say(line, lang)));
        }

        if matches!(lease.flow, Flow::General) {
            let intent = match entry {
                EntryPoint::Auto => classify(message, lang),
                EntryPoint::Booking => Intent::Booking,
                EntryPoint::Support => Intent::Support,
            };
            match intent {
                Intent::Booking => lease.flow = Flow::Booking(BookingState::new()),
                Intent::Support => lease.flow = Flow::Support(SupportState::new()),
                Intent::Services => {
                    return Ok(TurnResult::Continue(self.prompts.services_overview(lang)?))
                }
                Intent::General => return Ok(TurnResult::Continue(say(Line::Help, lang))),
            }
            info!(session_id = %lease.id, ?intent, "flow started");
        }

        match &mut lease.flow {
            Flow::General => Ok(TurnResult::Continue(say(Line::Help, lang))),
            Flow::Booking(state) => {
                let ctx = TurnContext {
                    language: lang,
                    now: self.hours.local_now(self.clock.now()),
                    hours: &self.hours,
                    slots: &self.slots,
                    prompts: &self.prompts,
                };
                match state.advance(message, &ctx).await? {
                    BookingOutcome::Reply(text) => Ok(TurnResult::Continue(text)),
                    BookingOutcome::Finalize(booking) => {
                        match self.persistence.finalize_booking(&booking).await {
                            Ok(reference) => {
                                let text = self
                                    .prompts
                                    .booking_confirmed(lang, &booking, &reference)
                                    .unwrap_or_else(|err| {
                                        warn!(error = %err, "confirmation template failed");
                                        say(Line::Stored { reference: &reference }, lang)
                                    });
                                Ok(TurnResult::Booked {
                                    booking,
                                    reference,
                                    text,
                                })
                            }
                            Err(PersistenceError::Conflict { .. }) => {
                                warn!(date = %booking.date, time = %booking.time, "slot taken at finalize");
                                state.reopen_time_after_conflict();
                                Ok(TurnResult::Continue(say(
                                    Line::SlotLostAtConfirm {
                                        date: booking.date,
                                        time: booking.time,
                                    },
                                    lang,
                                )))
                            }
                            Err(err) => Err(err.into()),
                        }
                    }
                }
            }
            Flow::Support(state) => match state.advance(message, lang, &self.prompts)? {
                SupportOutcome::Reply(text) => Ok(TurnResult::Continue(text)),
                SupportOutcome::CreateTicket => {
                    let ticket = state.draft.to_ticket(self.clock.now())?;
                    let reference = self.persistence.finalize_ticket(&ticket).await?;
                    let text = self
                        .prompts
                        .ticket_created(lang, &ticket)
                        .unwrap_or_else(|err| {
                            warn!(error = %err, "ticket template failed");
                            say(Line::Stored { reference: &reference }, lang)
                        });
                    Ok(TurnResult::TicketOpened {
                        ticket,
                        reference,
                        text,
                    })
                }
            },
        }
    }
}

fn apology(
    lang: Language,
    step: DialogueStep,
    flow: Option<FlowKind>,
    data: Value,
    session_reset: bool,
) -> ChatReply {
    ChatReply {
        response: say(Line::Apology, lang),
        step,
        completed: false,
        data,
        flow,
        reference: None,
        session_reset,
    }
}
