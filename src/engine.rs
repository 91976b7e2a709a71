//! Conversation engine: turns each user's messages into steps of the expense
//! and settlement flows and applies the finished ones to the shared ledger.

use crate::error::{InputError, LedgerError};
use crate::ledger::{
    dedup_names, render_debts, Debt, DebtLedger, ExpenseSummary, SettlementOutcome,
};
use crate::schemas::{Choice, Name, ReplyPayload, State, SubState, UserSession};
use crate::session::{lock, SessionStore};
use std::sync::Mutex;

pub const CHOICE_RECORD_EXPENSE: &str = "record-expense";
pub const CHOICE_SETTLE: &str = "settle";
pub const CHOICE_QUERY: &str = "query";
pub const CHOICE_CLOSE: &str = "close";

const CANCEL_WORD: &str = "cancel";

/// Largest amount a single expense or settlement may carry.
pub const MAX_AMOUNT: f64 = 1e12;

fn menu_choices() -> Vec<Choice> {
    vec![
        Choice::new("Record expense", CHOICE_RECORD_EXPENSE),
        Choice::new("Settle up", CHOICE_SETTLE),
        Choice::new("Show debts", CHOICE_QUERY),
        Choice::new("Close", CHOICE_CLOSE),
    ]
}

fn yes_no_choices() -> Vec<Choice> {
    vec![Choice::new("Yes", "y"), Choice::new("No", "n")]
}

/// What a single message did to the conversation. Produced while the user's
/// session is locked, rendered into a reply after the lock is gone.
#[derive(Debug, PartialEq)]
enum Outcome {
    Silent,
    ShowMenu,
    InvalidChoice(InputError),
    Reprompt(InputError),
    AskExpensePayer,
    AskExpenseAmount { payer: Name },
    AskParticipants,
    ConfirmPayer { payer: Name },
    AskSettlementPayer,
    AskReceiver { payer: Name },
    AskSettlementAmount { payer: Name, receiver: Name },
    ExpenseRecorded {
        payer: Name,
        amount: f64,
        summary: ExpenseSummary,
    },
    SettlementRecorded {
        payer: Name,
        receiver: Name,
        outcome: SettlementOutcome,
    },
    LedgerRejected(LedgerError),
    Debts(Vec<Debt>),
    Cancelled,
    Farewell,
}

pub struct LedgerEngine {
    trigger: String,
    sessions: SessionStore,
    ledger: Mutex<DebtLedger>,
}

impl LedgerEngine {
    pub fn new(trigger: impl Into<String>, sessions: SessionStore, ledger: DebtLedger) -> Self {
        Self {
            trigger: trigger.into(),
            sessions,
            ledger: Mutex::new(ledger),
        }
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn debts(&self) -> Vec<Debt> {
        lock(&self.ledger).list_debts()
    }

    /// Feeds one inbound text into the sender's conversation. `None` means the
    /// message needs no answer.
    pub fn process_message(&self, user_id: &str, text: &str) -> Option<ReplyPayload> {
        let text = text.trim();
        let outcome = {
            let handle = self.sessions.handle(user_id);
            let mut session = lock(&handle);
            let from = (session.state, session.sub_state);
            let outcome = self.transition(&mut session, text);
            tracing::debug!(
                user_id,
                ?from,
                to = ?(session.state, session.sub_state),
                "conversation step"
            );
            outcome
        };
        self.render(outcome)
    }

    fn transition(&self, session: &mut UserSession, text: &str) -> Outcome {
        match session.state {
            State::Idle => self.on_idle(session, text),
            State::Menu => self.on_menu(session, text),
            // Only the amount steps, where no name is expected
            State::AddExpense | State::SettlePayment
                if session.sub_state == SubState::AskAmount
                    && text.eq_ignore_ascii_case(CANCEL_WORD) =>
            {
                session.enter_menu();
                Outcome::Cancelled
            }
            State::AddExpense => self.on_add_expense(session, text),
            State::SettlePayment => self.on_settle(session, text),
        }
    }

    fn on_idle(&self, session: &mut UserSession, text: &str) -> Outcome {
        if text.eq_ignore_ascii_case(&self.trigger) {
            session.enter_menu();
            Outcome::ShowMenu
        } else {
            Outcome::Silent
        }
    }

    fn on_menu(&self, session: &mut UserSession, text: &str) -> Outcome {
        match text.to_ascii_lowercase().as_str() {
            CHOICE_RECORD_EXPENSE => {
                session.enter_flow(State::AddExpense, SubState::AskPayer);
                Outcome::AskExpensePayer
            }
            CHOICE_SETTLE => {
                session.enter_flow(State::SettlePayment, SubState::AskPayer);
                Outcome::AskSettlementPayer
            }
            CHOICE_QUERY => Outcome::Debts(self.debts()),
            CHOICE_CLOSE => {
                session.enter_idle();
                Outcome::Farewell
            }
            _ => Outcome::InvalidChoice(InputError::InvalidMenuChoice(text.to_string())),
        }
    }

    fn on_add_expense(&self, session: &mut UserSession, text: &str) -> Outcome {
        match session.sub_state {
            SubState::AskPayer => match parse_name(text) {
                Ok(payer) => {
                    session.scratch.payer = Some(payer.clone());
                    session.sub_state = SubState::AskAmount;
                    Outcome::AskExpenseAmount { payer }
                }
                Err(err) => Outcome::Reprompt(err),
            },
            SubState::AskAmount => match parse_amount(text) {
                Ok(amount) => {
                    session.scratch.amount = Some(amount);
                    session.sub_state = SubState::AskParticipants;
                    Outcome::AskParticipants
                }
                Err(err) => Outcome::Reprompt(err),
            },
            SubState::AskParticipants => {
                let participants = match parse_participants(text) {
                    Ok(participants) => participants,
                    Err(err) => return Outcome::Reprompt(err),
                };
                let Some(payer) = session.scratch.payer.clone() else {
                    return restart(session);
                };
                if participants.contains(&payer) {
                    self.finish_expense(session, participants)
                } else {
                    session.scratch.participants = participants;
                    session.sub_state = SubState::ConfirmPayer;
                    Outcome::ConfirmPayer { payer }
                }
            }
            SubState::ConfirmPayer => {
                let mut participants = std::mem::take(&mut session.scratch.participants);
                if is_yes(text) {
                    if let Some(payer) = &session.scratch.payer {
                        participants.push(payer.clone());
                    }
                }
                self.finish_expense(session, participants)
            }
            SubState::None | SubState::AskReceiver => restart(session),
        }
    }

    fn on_settle(&self, session: &mut UserSession, text: &str) -> Outcome {
        match session.sub_state {
            SubState::AskPayer => match parse_name(text) {
                Ok(payer) => {
                    session.scratch.payer = Some(payer.clone());
                    session.sub_state = SubState::AskReceiver;
                    Outcome::AskReceiver { payer }
                }
                Err(err) => Outcome::Reprompt(err),
            },
            SubState::AskReceiver => match parse_name(text) {
                Ok(receiver) => {
                    let Some(payer) = session.scratch.payer.clone() else {
                        return restart(session);
                    };
                    session.scratch.receiver = Some(receiver.clone());
                    session.sub_state = SubState::AskAmount;
                    Outcome::AskSettlementAmount { payer, receiver }
                }
                Err(err) => Outcome::Reprompt(err),
            },
            SubState::AskAmount => match parse_amount(text) {
                Ok(amount) => self.finish_settlement(session, amount),
                Err(err) => Outcome::Reprompt(err),
            },
            SubState::None | SubState::AskParticipants | SubState::ConfirmPayer => {
                restart(session)
            }
        }
    }

    fn finish_expense(&self, session: &mut UserSession, participants: Vec<Name>) -> Outcome {
        let (Some(payer), Some(amount)) = (session.scratch.payer.take(), session.scratch.amount)
        else {
            return restart(session);
        };
        session.enter_menu();

        let result = lock(&self.ledger).record_expense(&payer, amount, &participants);
        match result {
            Ok(summary) => {
                tracing::info!(
                    %payer,
                    amount,
                    participants = summary.participants.len(),
                    "expense recorded"
                );
                Outcome::ExpenseRecorded {
                    payer,
                    amount,
                    summary,
                }
            }
            Err(err) => Outcome::LedgerRejected(err),
        }
    }

    fn finish_settlement(&self, session: &mut UserSession, amount: f64) -> Outcome {
        let (Some(payer), Some(receiver)) = (
            session.scratch.payer.take(),
            session.scratch.receiver.take(),
        ) else {
            return restart(session);
        };
        session.enter_menu();

        let result = lock(&self.ledger).record_settlement(&payer, &receiver, amount);
        match result {
            Ok(outcome) => {
                tracing::info!(%payer, %receiver, amount, ?outcome, "settlement recorded");
                Outcome::SettlementRecorded {
                    payer,
                    receiver,
                    outcome,
                }
            }
            Err(err) => {
                tracing::info!(%payer, %receiver, amount, "settlement without matching debt");
                Outcome::LedgerRejected(err)
            }
        }
    }

    fn render(&self, outcome: Outcome) -> Option<ReplyPayload> {
        let reply = match outcome {
            Outcome::Silent => return None,
            Outcome::ShowMenu => {
                ReplyPayload::with_choices("Hi! What would you like to do?", menu_choices())
            }
            Outcome::InvalidChoice(err) => {
                ReplyPayload::with_choices(err.to_string(), menu_choices())
            }
            Outcome::Reprompt(err) => ReplyPayload::text(err.to_string()),
            Outcome::AskExpensePayer => ReplyPayload::text("Who paid?"),
            Outcome::AskExpenseAmount { payer } => {
                ReplyPayload::text(format!("How much did {payer} pay?"))
            }
            Outcome::AskParticipants => ReplyPayload::text(
                "Who shared the expense? Type the names separated by commas, e.g. Alice,Bob,Carol",
            ),
            Outcome::ConfirmPayer { payer } => ReplyPayload::with_choices(
                format!("{payer} is not in the list. Did {payer} share the expense too?"),
                yes_no_choices(),
            ),
            Outcome::AskSettlementPayer => ReplyPayload::text("Who paid back?"),
            Outcome::AskReceiver { payer } => {
                ReplyPayload::text(format!("Who did {payer} pay back?"))
            }
            Outcome::AskSettlementAmount { payer, receiver } => {
                ReplyPayload::text(format!("How much did {payer} pay {receiver}?"))
            }
            Outcome::ExpenseRecorded {
                payer,
                amount,
                summary,
            } => ReplyPayload::with_choices(
                format!(
                    "Recorded: {payer} paid {amount:.2} for {} ({:.2} each).",
                    summary.participants.join(", "),
                    summary.per_person
                ),
                menu_choices(),
            ),
            Outcome::SettlementRecorded {
                payer,
                receiver,
                outcome,
            } => {
                let text = match outcome {
                    SettlementOutcome::FullySettled { surplus } if surplus > 0.0 => format!(
                        "{payer}'s debt to {receiver} is fully settled. \
                         The extra {surplus:.2} was not recorded."
                    ),
                    SettlementOutcome::FullySettled { .. } => {
                        format!("{payer}'s debt to {receiver} is fully settled.")
                    }
                    SettlementOutcome::Remaining { balance } => {
                        format!("{payer} still owes {receiver} {balance:.2}.")
                    }
                };
                ReplyPayload::with_choices(text, menu_choices())
            }
            Outcome::LedgerRejected(err) => {
                ReplyPayload::with_choices(err.to_string(), menu_choices())
            }
            Outcome::Debts(debts) => {
                ReplyPayload::with_choices(render_debts(&debts), menu_choices())
            }
            Outcome::Cancelled => {
                ReplyPayload::with_choices("Cancelled, nothing was recorded.", menu_choices())
            }
            Outcome::Farewell => ReplyPayload::text(format!(
                "Bye! Send \"{}\" whenever you need me again.",
                self.trigger
            )),
        };
        Some(reply)
    }
}

// Scratch lost track of an earlier step, start over from the menu
fn restart(session: &mut UserSession) -> Outcome {
    tracing::warn!(
        state = ?session.state,
        sub_state = ?session.sub_state,
        "incomplete draft, back to menu"
    );
    session.enter_menu();
    Outcome::ShowMenu
}

fn parse_name(text: &str) -> Result<Name, InputError> {
    let name = text.trim();
    if name.is_empty() {
        return Err(InputError::BlankName);
    }
    Ok(name.to_string())
}

fn parse_amount(text: &str) -> Result<f64, InputError> {
    let amount: f64 = text
        .trim()
        .parse()
        .map_err(|_| InputError::InvalidNumericInput(text.to_string()))?;
    if !amount.is_finite() {
        return Err(InputError::InvalidNumericInput(text.to_string()));
    }
    if amount <= 0.0 {
        return Err(InputError::NonPositiveAmount(amount));
    }
    if amount > MAX_AMOUNT {
        return Err(InputError::AmountTooLarge(amount));
    }
    Ok(amount)
}

fn parse_participants(text: &str) -> Result<Vec<Name>, InputError> {
    let names: Vec<Name> = text
        .split([',', '，'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();
    let names = dedup_names(&names);
    if names.is_empty() {
        return Err(InputError::EmptyParticipantList);
    }
    Ok(names)
}

fn is_yes(text: &str) -> bool {
    text.eq_ignore_ascii_case("y") || text.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::NO_DEBTS_MESSAGE;
    use crate::schemas::Scratch;

    fn engine() -> LedgerEngine {
        LedgerEngine::new("finbot", SessionStore::new(), DebtLedger::new())
    }

    fn send(engine: &LedgerEngine, user: &str, text: &str) -> ReplyPayload {
        engine
            .process_message(user, text)
            .unwrap_or_else(|| panic!("no reply to {text:?}"))
    }

    fn owed(engine: &LedgerEngine, debtor: &str, creditor: &str) -> f64 {
        lock(&engine.ledger).owed(debtor, creditor)
    }

    fn record(engine: &LedgerEngine, user: &str, payer: &str, amount: &str, participants: &str) {
        send(engine, user, CHOICE_RECORD_EXPENSE);
        send(engine, user, payer);
        send(engine, user, amount);
        send(engine, user, participants);
    }

    #[test]
    fn idle_ignores_everything_but_trigger() {
        let engine = engine();
        assert_eq!(engine.process_message("U1", "hello"), None);
        assert_eq!(engine.sessions().get("U1").state, State::Idle);

        let reply = send(&engine, "U1", "  FinBot ");
        assert_eq!(reply.choices(), menu_choices().as_slice());
        assert_eq!(reply.choices().len(), 4);
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
    }

    #[test]
    fn full_expense_conversation_with_payer_listed() {
        let engine = engine();
        send(&engine, "U1", "finbot");

        assert_eq!(send(&engine, "U1", "record-expense").body(), "Who paid?");
        let session = engine.sessions().get("U1");
        assert_eq!((session.state, session.sub_state), (State::AddExpense, SubState::AskPayer));

        assert_eq!(send(&engine, "U1", "Alice").body(), "How much did Alice pay?");
        assert!(send(&engine, "U1", "30").body().starts_with("Who shared"));
        let reply = send(&engine, "U1", "Alice,Bob,Carol");

        assert_eq!(
            reply.body(),
            "Recorded: Alice paid 30.00 for Alice, Bob, Carol (10.00 each)."
        );
        assert_eq!(reply.choices().len(), 4);
        assert!((owed(&engine, "Bob", "Alice") - 10.0).abs() < 1e-9);
        assert!((owed(&engine, "Carol", "Alice") - 10.0).abs() < 1e-9);

        let session = engine.sessions().get("U1");
        assert_eq!(session.state, State::Menu);
        assert_eq!(session.scratch, Scratch::default());

        let dump = send(&engine, "U1", "query");
        assert_eq!(dump.body(), "Bob owes Alice 10.00\nCarol owes Alice 10.00");
    }

    #[test]
    fn payer_missing_from_list_is_confirmed() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        record(&engine, "U1", "Alice", "30", "Bob, Carol");

        let session = engine.sessions().get("U1");
        assert_eq!(session.sub_state, SubState::ConfirmPayer);

        let reply = send(&engine, "U1", "Y");
        assert!(reply.body().contains("(10.00 each)"));
        assert!((owed(&engine, "Bob", "Alice") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn declining_payer_splits_among_listed_only() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        record(&engine, "U1", "Alice", "30", "Bob，Carol");

        let reply = send(&engine, "U1", "no thanks");
        assert!(reply.body().contains("(15.00 each)"));
        assert!((owed(&engine, "Carol", "Alice") - 15.0).abs() < 1e-9);
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
    }

    #[test]
    fn bad_amount_reprompts_same_step() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        send(&engine, "U1", "record-expense");
        send(&engine, "U1", "Alice");

        let reply = send(&engine, "U1", "thirty");
        assert_eq!(
            reply.body(),
            InputError::InvalidNumericInput("thirty".to_string()).to_string()
        );
        let reply = send(&engine, "U1", "-5");
        assert_eq!(reply.body(), InputError::NonPositiveAmount(-5.0).to_string());
        send(&engine, "U1", "inf");

        let session = engine.sessions().get("U1");
        assert_eq!(session.sub_state, SubState::AskAmount);
        assert_eq!(session.scratch.payer.as_deref(), Some("Alice"));
    }

    #[test]
    fn empty_participant_list_is_rejected() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        record(&engine, "U1", "Alice", "30", " , ，");

        let session = engine.sessions().get("U1");
        assert_eq!(session.sub_state, SubState::AskParticipants);
        assert!(engine.debts().is_empty());

        send(&engine, "U1", "Bob");
        send(&engine, "U1", "n");
        assert!((owed(&engine, "Bob", "Alice") - 30.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_menu_choice_redisplays_menu() {
        let engine = engine();
        send(&engine, "U1", "finbot");

        let reply = send(&engine, "U1", "dance");
        assert!(reply.body().contains("\"dance\""));
        assert_eq!(reply.choices(), menu_choices().as_slice());
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
    }

    #[test]
    fn query_on_empty_ledger_stays_in_menu() {
        let engine = engine();
        send(&engine, "U1", "finbot");

        let reply = send(&engine, "U1", "Query");
        assert_eq!(reply.body(), NO_DEBTS_MESSAGE);
        assert_eq!(reply.choices().len(), 4);
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
    }

    #[test]
    fn close_says_goodbye_and_goes_idle() {
        let engine = engine();
        send(&engine, "U1", "finbot");

        let reply = send(&engine, "U1", "close");
        assert!(reply.body().contains("finbot"));
        assert!(reply.choices().is_empty());
        assert_eq!(engine.sessions().get("U1").state, State::Idle);
        assert_eq!(engine.process_message("U1", "query"), None);
    }

    #[test]
    fn settlement_flow_updates_ledger() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        record(&engine, "U1", "A", "30", "A,B,C");

        assert_eq!(send(&engine, "U1", "settle").body(), "Who paid back?");
        assert_eq!(send(&engine, "U1", "B").body(), "Who did B pay back?");
        assert_eq!(send(&engine, "U1", "A").body(), "How much did B pay A?");
        let reply = send(&engine, "U1", "10");

        assert_eq!(reply.body(), "B's debt to A is fully settled.");
        assert_eq!(owed(&engine, "B", "A"), 0.0);
        assert!((owed(&engine, "C", "A") - 10.0).abs() < 1e-9);
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
    }

    #[test]
    fn partial_and_excess_settlements() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        record(&engine, "U1", "A", "50", "B");
        send(&engine, "U1", "n");

        for text in ["settle", "B", "A"] {
            send(&engine, "U1", text);
        }
        assert_eq!(send(&engine, "U1", "20").body(), "B still owes A 30.00.");

        for text in ["settle", "B", "A"] {
            send(&engine, "U1", text);
        }
        assert_eq!(
            send(&engine, "U1", "45").body(),
            "B's debt to A is fully settled. The extra 15.00 was not recorded."
        );
        assert!(engine.debts().is_empty());
    }

    #[test]
    fn settling_untracked_pair_leaves_ledger_alone() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        record(&engine, "U1", "A", "20", "A,B");

        for text in ["settle", "A", "B"] {
            send(&engine, "U1", text);
        }
        let reply = send(&engine, "U1", "5");

        assert_eq!(
            reply.body(),
            LedgerError::NoSuchDebt {
                payer: "A".to_string(),
                receiver: "B".to_string()
            }
            .to_string()
        );
        assert!((owed(&engine, "B", "A") - 10.0).abs() < 1e-9);
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
    }

    #[test]
    fn cancel_abandons_draft() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        send(&engine, "U1", "record-expense");
        send(&engine, "U1", "Alice");

        let reply = send(&engine, "U1", "CANCEL");
        assert_eq!(reply.choices().len(), 4);
        let session = engine.sessions().get("U1");
        assert_eq!(session.state, State::Menu);
        assert_eq!(session.scratch.payer, None);
        assert!(engine.debts().is_empty());
    }

    #[test]
    fn cancel_is_a_valid_name() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        send(&engine, "U1", "record-expense");

        assert_eq!(send(&engine, "U1", "Cancel").body(), "How much did Cancel pay?");
        let session = engine.sessions().get("U1");
        assert_eq!(session.state, State::AddExpense);
        assert_eq!(session.scratch.payer.as_deref(), Some("Cancel"));

        send(&engine, "U1", "20");
        send(&engine, "U1", "Cancel,cancel");
        assert!((owed(&engine, "cancel", "Cancel") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_amount_reprompts() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        send(&engine, "U1", "record-expense");
        send(&engine, "U1", "Alice");

        let reply = send(&engine, "U1", "1.5e308");
        assert_eq!(reply.body(), InputError::AmountTooLarge(1.5e308).to_string());
        assert_eq!(engine.sessions().get("U1").sub_state, SubState::AskAmount);

        send(&engine, "U1", "1e12");
        assert_eq!(engine.sessions().get("U1").sub_state, SubState::AskParticipants);
    }

    #[test]
    fn lost_scratch_restarts_from_menu() {
        let engine = engine();
        let mut session = UserSession::default();
        session.enter_flow(State::AddExpense, SubState::AskParticipants);
        engine.sessions().set("U1", session);

        let reply = send(&engine, "U1", "Bob");
        assert_eq!(reply.choices(), menu_choices().as_slice());
        assert_eq!(engine.sessions().get("U1").state, State::Menu);
        assert!(engine.debts().is_empty());
    }

    #[test]
    fn users_keep_separate_drafts() {
        let engine = engine();
        send(&engine, "U1", "finbot");
        send(&engine, "U2", "finbot");
        send(&engine, "U1", "record-expense");
        send(&engine, "U2", "record-expense");
        send(&engine, "U1", "Alice");
        send(&engine, "U2", "Bob");
        send(&engine, "U1", "12");
        send(&engine, "U2", "40");
        send(&engine, "U1", "Alice,Carol");
        send(&engine, "U2", "Bob,Dave");

        assert!((owed(&engine, "Carol", "Alice") - 6.0).abs() < 1e-9);
        assert!((owed(&engine, "Dave", "Bob") - 20.0).abs() < 1e-9);
    }

    #[test]
    fn concurrent_users_do_not_corrupt_each_other() {
        let engine = engine();
        let rounds = 50;

        std::thread::scope(|scope| {
            for (user, payer) in [("U1", "Alice"), ("U2", "Bob"), ("U3", "Carol")] {
                let engine = &engine;
                scope.spawn(move || {
                    send(engine, user, "finbot");
                    for _ in 0..rounds {
                        record(engine, user, payer, "10", "Zoe");
                        send(engine, user, "n");
                    }
                });
            }
        });

        for payer in ["Alice", "Bob", "Carol"] {
            assert!((owed(&engine, "Zoe", payer) - 10.0 * rounds as f64).abs() < 1e-6);
        }
        for user in ["U1", "U2", "U3"] {
            assert_eq!(engine.sessions().get(user).state, State::Menu);
        }
    }

    #[test]
    fn same_user_messages_are_handled_one_at_a_time() {
        let engine = engine();
        let mut session = UserSession::default();
        session.enter_flow(State::AddExpense, SubState::ConfirmPayer);
        session.scratch.payer = Some("Alice".to_string());
        session.scratch.amount = Some(10.0);
        session.scratch.participants = vec!["Bob".to_string()];
        engine.sessions().set("U1", session);

        let handle = engine.sessions().handle("U1");
        let held = lock(&handle);
        std::thread::scope(|scope| {
            let pending = scope.spawn(|| engine.process_message("U1", "n"));

            std::thread::sleep(std::time::Duration::from_millis(100));
            assert!(!pending.is_finished());
            assert_eq!(held.sub_state, SubState::ConfirmPayer);
            drop(held);

            let reply = pending.join().unwrap().unwrap();
            assert!(reply.body().starts_with("Recorded: Alice paid 10.00"));
        });

        let session = engine.sessions().get("U1");
        assert_eq!(session.state, State::Menu);
        assert!((owed(&engine, "Bob", "Alice") - 10.0).abs() < 1e-9);
        assert_eq!(engine.debts().len(), 1);
    }

    #[test]
    fn parse_participants_trims_and_dedups() {
        assert_eq!(
            parse_participants(" Bob , Carol,,Bob，Dan ").unwrap(),
            vec!["Bob", "Carol", "Dan"]
        );
        assert_eq!(parse_participants(""), Err(InputError::EmptyParticipantList));
    }
}
