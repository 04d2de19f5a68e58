//! Event filters
//!
//! A filter is a tagged predicate over an event. Matching is a single
//! structural `match`; the first mismatch returns `None` with no side effects.

use regex::Regex;

use super::event::{Event, Media, Message};

/// Which messages a message filter accepts by content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Any,
    /// Text without media
    Text,
    Photo,
    Sticker,
}

/// Incoming (from users) or outgoing (sent by this bot)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
    Either,
}

/// Chat type restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    Any,
    PrivateOnly,
    GroupOnly,
}

impl ChatScope {
    fn accepts(self, msg: &Message) -> bool {
        match self {
            Self::Any => true,
            Self::PrivateOnly => msg.is_private(),
            Self::GroupOnly => msg.is_group(),
        }
    }
}

/// How a command name is compared
#[derive(Debug, Clone)]
pub enum CommandName {
    /// Case-insensitive literal
    Exact(String),
    /// Case-insensitive full match
    Pattern(Regex),
}

/// Event predicate owned by a binding
#[derive(Debug, Clone)]
pub enum Filter {
    Message {
        kind: MessageKind,
        direction: Direction,
        scope: ChatScope,
    },
    Command {
        name: CommandName,
        prefix: char,
        scope: ChatScope,
        /// Stop routing after this binding runs, even if it failed
        stop_propagation: bool,
    },
    /// Regex search over message text
    Pattern { regex: Regex, scope: ChatScope },
    InlineQuery,
    ChosenInlineResult,
    /// Every event, delivered without middleware
    Raw,
}

/// Data extracted by a successful match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchInfo {
    /// Text after a command, trimmed; `None` if empty
    pub args: Option<String>,
    /// Regex capture groups (index 0 is the whole match)
    pub captures: Vec<Option<String>>,
}

impl Filter {
    /// Incoming messages of `kind` in any chat
    #[must_use]
    pub const fn message(kind: MessageKind) -> Self {
        Self::Message {
            kind,
            direction: Direction::Incoming,
            scope: ChatScope::Any,
        }
    }

    /// `/name` command with default prefix that stops propagation
    #[must_use]
    pub fn command(name: &str) -> Self {
        Self::Command {
            name: CommandName::Exact(name.to_string()),
            prefix: '/',
            scope: ChatScope::Any,
            stop_propagation: true,
        }
    }

    /// Command whose name must fully match `pattern` (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not compile
    pub fn command_pattern(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("(?i)^(?:{pattern})$"))?;
        Ok(Self::Command {
            name: CommandName::Pattern(regex),
            prefix: '/',
            scope: ChatScope::Any,
            stop_propagation: true,
        })
    }

    /// Regex over incoming message text
    ///
    /// # Errors
    ///
    /// Returns error if the pattern does not compile
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Pattern {
            regex: Regex::new(pattern)?,
            scope: ChatScope::Any,
        })
    }

    /// Restrict to a chat scope (no-op for non-message filters)
    #[must_use]
    pub fn in_scope(mut self, new_scope: ChatScope) -> Self {
        match &mut self {
            Self::Message { scope, .. }
            | Self::Command { scope, .. }
            | Self::Pattern { scope, .. } => *scope = new_scope,
            Self::InlineQuery | Self::ChosenInlineResult | Self::Raw => {}
        }
        self
    }

    /// Only for private chats
    #[must_use]
    pub fn private(self) -> Self {
        self.in_scope(ChatScope::PrivateOnly)
    }

    /// Only for groups and supergroups
    #[must_use]
    pub fn group(self) -> Self {
        self.in_scope(ChatScope::GroupOnly)
    }

    /// Change the command prefix character
    #[must_use]
    pub fn with_prefix(mut self, new_prefix: char) -> Self {
        if let Self::Command { prefix, .. } = &mut self {
            *prefix = new_prefix;
        }
        self
    }

    /// Let later bindings see the event after this command runs
    #[must_use]
    pub fn keep_propagating(mut self) -> Self {
        if let Self::Command {
            stop_propagation, ..
        } = &mut self
        {
            *stop_propagation = false;
        }
        self
    }

    /// Whether routing stops after this binding regardless of outcome
    #[must_use]
    pub const fn stops_propagation(&self) -> bool {
        matches!(
            self,
            Self::Command {
                stop_propagation: true,
                ..
            }
        )
    }

    /// Whether events reach the handler without middleware
    #[must_use]
    pub const fn bypasses_middleware(&self) -> bool {
        matches!(self, Self::Raw)
    }

    /// Stable identity used to deduplicate registrations
    #[must_use]
    pub fn signature(&self) -> String {
        match self {
            Self::Message {
                kind,
                direction,
                scope,
            } => format!("message:{kind:?}:{direction:?}:{scope:?}"),
            Self::Command {
                name,
                prefix,
                scope,
                stop_propagation,
            } => {
                let name = match name {
                    CommandName::Exact(n) => n.to_lowercase(),
                    CommandName::Pattern(r) => format!("re:{}", r.as_str()),
                };
                format!("command:{prefix}{name}:{scope:?}:{stop_propagation}")
            }
            Self::Pattern { regex, scope } => format!("pattern:{}:{scope:?}", regex.as_str()),
            Self::InlineQuery => "inline_query".to_string(),
            Self::ChosenInlineResult => "chosen_inline_result".to_string(),
            Self::Raw => "raw".to_string(),
        }
    }

    /// Test an event; `bot_username` validates `/cmd@bot` mentions
    #[must_use]
    pub fn matches(&self, event: &Event, bot_username: Option<&str>) -> Option<MatchInfo> {
        match (self, event) {
            (Self::Raw, _)
            | (Self::InlineQuery, Event::InlineQuery(_))
            | (Self::ChosenInlineResult, Event::ChosenInlineResult(_)) => Some(MatchInfo::default()),
            (
                Self::Message {
                    kind,
                    direction,
                    scope,
                },
                Event::Message(msg),
            ) => match_message(msg, *kind, *direction, *scope),
            (
                Self::Command {
                    name,
                    prefix,
                    scope,
                    ..
                },
                Event::Message(msg),
            ) => match_command(msg, name, *prefix, *scope, bot_username),
            (Self::Pattern { regex, scope }, Event::Message(msg)) => {
                match_pattern(msg, regex, *scope)
            }
            _ => None,
        }
    }
}

fn match_message(
    msg: &Message,
    kind: MessageKind,
    direction: Direction,
    scope: ChatScope,
) -> Option<MatchInfo> {
    let direction_ok = match direction {
        Direction::Incoming => !msg.outgoing,
        Direction::Outgoing => msg.outgoing,
        Direction::Either => true,
    };
    if !direction_ok || !scope.accepts(msg) {
        return None;
    }
    let kind_ok = match kind {
        MessageKind::Any => true,
        MessageKind::Text => msg.media.is_none() && msg.text.is_some(),
        MessageKind::Photo => matches!(msg.media, Some(Media::Photo { .. })),
        MessageKind::Sticker => matches!(msg.media, Some(Media::Sticker { .. })),
    };
    kind_ok.then(MatchInfo::default)
}

fn match_command(
    msg: &Message,
    name: &CommandName,
    prefix: char,
    scope: ChatScope,
    bot_username: Option<&str>,
) -> Option<MatchInfo> {
    if msg.outgoing || msg.forwarded || msg.is_broadcast() || !scope.accepts(msg) {
        return None;
    }
    let text = msg.text.as_deref()?.trim_start();
    let (token, rest) = text
        .split_once(char::is_whitespace)
        .unwrap_or((text, ""));
    let token = token.strip_prefix(prefix)?;
    let (command, mention) = token.split_once('@').unwrap_or((token, ""));

    if !mention.is_empty() && !bot_username.is_some_and(|u| u.eq_ignore_ascii_case(mention)) {
        return None;
    }

    let name_ok = match name {
        CommandName::Exact(expected) => command.to_lowercase() == expected.to_lowercase(),
        CommandName::Pattern(regex) => regex.is_match(command),
    };
    if !name_ok {
        return None;
    }

    let args = rest.trim();
    Some(MatchInfo {
        args: (!args.is_empty()).then(|| args.to_string()),
        captures: Vec::new(),
    })
}

fn match_pattern(msg: &Message, regex: &Regex, scope: ChatScope) -> Option<MatchInfo> {
    if msg.outgoing || !scope.accepts(msg) {
        return None;
    }
    let caps = regex.captures(msg.text.as_deref()?)?;
    Some(MatchInfo {
        args: None,
        captures: caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::event::{ChatKind, InlineQuery};

    fn text(kind: ChatKind, body: &str) -> Event {
        Event::Message(Message {
            message_id: 1,
            chat_id: 10,
            chat_kind: Some(kind),
            sender_id: Some(5),
            text: Some(body.to_string()),
            ..Message::default()
        })
    }

    #[test]
    fn command_is_case_insensitive_with_args() {
        let filter = Filter::command("download");
        let info = filter
            .matches(&text(ChatKind::Private, "/DownLoad  some_channel "), None)
            .unwrap();
        assert_eq!(info.args.as_deref(), Some("some_channel"));

        let bare = filter
            .matches(&text(ChatKind::Private, "/download"), None)
            .unwrap();
        assert!(bare.args.is_none());
    }

    #[test]
    fn command_mentions_must_name_this_bot() {
        let filter = Filter::command("start");
        assert!(filter
            .matches(&text(ChatKind::Group, "/start@GlimpseBot"), Some("glimpsebot"))
            .is_some());
        assert!(filter
            .matches(&text(ChatKind::Group, "/start@OtherBot"), Some("glimpsebot"))
            .is_none());
        assert!(filter
            .matches(&text(ChatKind::Group, "/start@GlimpseBot"), None)
            .is_none());
    }

    #[test]
    fn command_rejects_prefix_mismatch_and_broadcasts() {
        let filter = Filter::command("start");
        assert!(filter.matches(&text(ChatKind::Private, "start"), None).is_none());
        assert!(filter.matches(&text(ChatKind::Private, "/starts"), None).is_none());
        assert!(filter.matches(&text(ChatKind::Channel, "/start"), None).is_none());

        let bang = Filter::command("start").with_prefix('!');
        assert!(bang.matches(&text(ChatKind::Private, "!start"), None).is_some());
    }

    #[test]
    fn command_rejects_outgoing_and_forwarded() {
        let filter = Filter::command("start");
        let mut msg = Message {
            chat_kind: Some(ChatKind::Private),
            text: Some("/start".to_string()),
            ..Message::default()
        };
        msg.outgoing = true;
        assert!(filter.matches(&Event::Message(msg.clone()), None).is_none());
        msg.outgoing = false;
        msg.forwarded = true;
        assert!(filter.matches(&Event::Message(msg), None).is_none());
    }

    #[test]
    fn command_pattern_full_match() {
        let filter = Filter::command_pattern("dl|download").unwrap();
        assert!(filter.matches(&text(ChatKind::Private, "/DL x"), None).is_some());
        assert!(filter.matches(&text(ChatKind::Private, "/dlx"), None).is_none());
    }

    #[test]
    fn scope_restrictions() {
        let private = Filter::command("help").private();
        assert!(private.matches(&text(ChatKind::Group, "/help"), None).is_none());
        assert!(private.matches(&text(ChatKind::Private, "/help"), None).is_some());

        let group = Filter::message(MessageKind::Text).group();
        assert!(group.matches(&text(ChatKind::Supergroup, "hi"), None).is_some());
        assert!(group.matches(&text(ChatKind::Private, "hi"), None).is_none());
    }

    #[test]
    fn message_kinds() {
        let photo = Event::Message(Message {
            chat_kind: Some(ChatKind::Private),
            media: Some(Media::Photo {
                file_id: "f".to_string(),
            }),
            ..Message::default()
        });
        assert!(Filter::message(MessageKind::Photo).matches(&photo, None).is_some());
        assert!(Filter::message(MessageKind::Text).matches(&photo, None).is_none());
        assert!(Filter::message(MessageKind::Sticker).matches(&photo, None).is_none());
        assert!(Filter::message(MessageKind::Any).matches(&photo, None).is_some());
    }

    #[test]
    fn pattern_exposes_captures() {
        let filter = Filter::pattern(r"t\.me/(\w+)/(\d+)").unwrap();
        let info = filter
            .matches(&text(ChatKind::Private, "see t.me/memes/42"), None)
            .unwrap();
        assert_eq!(
            info.captures,
            vec![
                Some("t.me/memes/42".to_string()),
                Some("memes".to_string()),
                Some("42".to_string()),
            ]
        );
    }

    #[test]
    fn kind_filters_and_raw() {
        let inline = Event::InlineQuery(InlineQuery::default());
        assert!(Filter::InlineQuery.matches(&inline, None).is_some());
        assert!(Filter::ChosenInlineResult.matches(&inline, None).is_none());
        assert!(Filter::Raw.matches(&inline, None).is_some());
        assert!(Filter::command("x").matches(&inline, None).is_none());
    }

    #[test]
    fn stop_propagation_defaults() {
        assert!(Filter::command("x").stops_propagation());
        assert!(!Filter::command("x").keep_propagating().stops_propagation());
        assert!(!Filter::InlineQuery.stops_propagation());
        assert!(Filter::Raw.bypasses_middleware());
    }
}
