use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type Name = String;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum State {
    #[default]
    Idle,
    Menu,
    AddExpense,
    SettlePayment,
}

/// Step inside a multi-turn flow. Only meaningful while the state is
/// `AddExpense` or `SettlePayment`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SubState {
    #[default]
    None,
    AskPayer,
    AskAmount,
    AskParticipants,
    ConfirmPayer,
    AskReceiver,
}

/// Partially entered fields of an expense or settlement.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Scratch {
    pub payer: Option<Name>,
    pub amount: Option<f64>,
    pub participants: Vec<Name>,
    pub receiver: Option<Name>,
}

impl Scratch {
    pub fn clear(&mut self) {
        *self = Scratch::default();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UserSession {
    pub state: State,
    pub sub_state: SubState,
    pub scratch: Scratch,
}

impl UserSession {
    pub fn enter_menu(&mut self) {
        self.state = State::Menu;
        self.sub_state = SubState::None;
        self.scratch.clear();
    }

    pub fn enter_idle(&mut self) {
        self.state = State::Idle;
        self.sub_state = SubState::None;
        self.scratch.clear();
    }

    pub fn enter_flow(&mut self, state: State, sub_state: SubState) {
        self.state = state;
        self.sub_state = sub_state;
        self.scratch.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPayload {
    PlainText { text: String },
    TextWithChoices { text: String, choices: Vec<Choice> },
}

impl ReplyPayload {
    pub fn text(text: impl Into<String>) -> Self {
        ReplyPayload::PlainText { text: text.into() }
    }

    pub fn with_choices(text: impl Into<String>, choices: Vec<Choice>) -> Self {
        ReplyPayload::TextWithChoices {
            text: text.into(),
            choices,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ReplyPayload::PlainText { text } | ReplyPayload::TextWithChoices { text, .. } => text,
        }
    }

    #[cfg(test)]
    pub fn choices(&self) -> &[Choice] {
        match self {
            ReplyPayload::PlainText { .. } => &[],
            ReplyPayload::TextWithChoices { choices, .. } => choices,
        }
    }
}
