use chrono::{DateTime, Utc};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Identifier of a chat account (users and bots alike).
pub type AccountId = u64;
/// Identifier of a chat group.
pub type GroupId = u64;
/// Transport handle of a message, usable to retract it later.
pub type MessageId = i64;

/// A group message, as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub group_id: GroupId,
    pub sender: AccountId,
    pub message_id: MessageId,
    /// Plain text content, with non-text segments removed.
    pub text: String,
    /// Mentioned accounts, in message order (`@all` is never included).
    pub mentions: Vec<AccountId>,
    /// Author of the message this one replies to, if any.
    pub reply_to: Option<AccountId>,
    pub received_at: DateTime<Utc>,
}

/// One observed interaction from a monitored bot.
///
/// A message addressing two bots yields two events sharing the same `message_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sender: AccountId,
    /// The addressed bot, or `None` when the message addresses no other bot.
    pub target: Option<AccountId>,
    pub timestamp: DateTime<Utc>,
    pub message_id: MessageId,
}

/// Why an offender was banned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanReason {
    Loop,
    Spam,
}

/// A positive detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ban {
    pub group_id: GroupId,
    pub offender: AccountId,
    pub reason: BanReason,
    pub count: usize,
    /// Messages to retract, each at most once, in first-seen order.
    pub messages_to_retract: Vec<MessageId>,
}

/// Outcome of one detection evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    Ban(Ban),
}
