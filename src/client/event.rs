//! Events dispatched to the tracker, derived from inbound messages after
//! [`NetworkState`](super::state::NetworkState) has been updated.

use bantracker_proto::{Message, ModeChange, Prefix, Response, parse_channel_modes};

use super::state::NetworkState;

/// A protocol event the tracker reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Registration completed (RPL_WELCOME).
    Registered,
    /// We joined `channel`.
    Joined { channel: String },
    /// Mode change on a channel we are in.
    Mode {
        channel: String,
        source: Option<Prefix>,
        changes: Vec<ModeChange>,
    },
    /// PRIVMSG from a user, to a channel or to us.
    Message {
        source: Prefix,
        target: String,
        text: String,
    },
    /// A PONG answering one of our PINGs.
    Pong { token: String },
}

impl Event {
    /// Interpret `msg` against the (already updated) `state`.
    pub fn from_message(msg: &Message, state: &NetworkState) -> Option<Event> {
        if msg.response() == Some(Response::RPL_WELCOME) {
            return Some(Event::Registered);
        }

        match msg.command.as_str() {
            "JOIN" => {
                let nick = msg.source_nickname()?;
                let channel = msg.param(0)?;
                state.is_me(nick).then(|| Event::Joined {
                    channel: channel.to_string(),
                })
            }
            "MODE" => {
                let target = msg.param(0)?;
                if !state.is_channel(target) {
                    return None;
                }
                let modes = msg.param(1)?;
                Some(Event::Mode {
                    channel: target.to_string(),
                    source: msg.prefix.clone(),
                    changes: parse_channel_modes(modes, &msg.params[2..], &state.isupport),
                })
            }
            "PRIVMSG" => {
                let source = msg.prefix.clone()?;
                source.nick()?;
                Some(Event::Message {
                    source,
                    target: msg.param(0)?.to_string(),
                    text: msg.param(1)?.to_string(),
                })
            }
            // PONG <server> :<token>
            "PONG" => Some(Event::Pong {
                token: msg.params.last()?.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> NetworkState {
        let mut state = NetworkState::new("bot");
        state.apply(&":srv 001 bot :hi".parse().unwrap());
        state.apply(&":srv 005 bot CHANMODES=beIq,k,l,imnpst :are supported".parse().unwrap());
        state
    }

    fn event(line: &str) -> Option<Event> {
        let state = state();
        Event::from_message(&line.parse().unwrap(), &state)
    }

    #[test]
    fn test_self_join_only() {
        assert_eq!(
            event(":BOT!b@h JOIN #chan"),
            Some(Event::Joined {
                channel: "#chan".into()
            })
        );
        assert_eq!(event(":other!o@h JOIN #chan"), None);
    }

    #[test]
    fn test_channel_mode() {
        let Some(Event::Mode { channel, changes, .. }) = event(":op!o@h MODE #chan +bl-q *!*@x 10 y!*@*")
        else {
            panic!("expected mode event");
        };
        assert_eq!(channel, "#chan");
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0], ModeChange::new(true, 'b', Some("*!*@x".into())));
        assert_eq!(changes[1].arg.as_deref(), Some("10"));
        assert_eq!(changes[2], ModeChange::new(false, 'q', Some("y!*@*".into())));
    }

    #[test]
    fn test_user_mode_ignored() {
        assert_eq!(event(":bot MODE bot +i"), None);
    }

    #[test]
    fn test_privmsg_and_pong() {
        assert!(matches!(
            event(":nick!u@h PRIVMSG #chan :!comment 1 spam"),
            Some(Event::Message { text, .. }) if text == "!comment 1 spam"
        ));
        assert_eq!(event(":srv.example PRIVMSG bot :server notice"), None);
        assert_eq!(
            event(":srv PONG srv :expirecheck"),
            Some(Event::Pong {
                token: "expirecheck".into()
            })
        );
    }
}
