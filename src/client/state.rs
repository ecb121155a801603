//! Client-side view of a network: who we are, which channels we are in, who
//! is in them with which status modes, and what we know about each user.
//!
//! [`NetworkState::apply`] is fed every inbound message before events are
//! dispatched, so handlers always see membership as of the message they are
//! handling (or later).

use std::collections::HashMap;

use bantracker_proto::{Isupport, Message, Prefix, Response, parse_channel_modes};

use crate::mask::UserIdentity;

/// Token tagging our WHOX queries so foreign 354 replies are ignored.
pub const WHOX_TOKEN: &str = "735";

/// Fields requested in WHOX queries: token, channel, user, host, nick, flags,
/// account, realname. Replies carry them in that order.
pub const WHOX_FIELDS: &str = "tcuhnfar";

/// Status modes held by a channel member, in the network's `PREFIX` letters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberModes(Vec<char>);

impl MemberModes {
    pub fn new(modes: impl IntoIterator<Item = char>) -> Self {
        let mut m = MemberModes::default();
        for c in modes {
            m.add(c);
        }
        m
    }

    pub fn add(&mut self, mode: char) {
        if !self.0.contains(&mode) {
            self.0.push(mode);
        }
    }

    pub fn remove(&mut self, mode: char) {
        self.0.retain(|&c| c != mode);
    }

    pub fn has(&self, mode: char) -> bool {
        self.0.contains(&mode)
    }

    /// No status at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exactly voice and nothing higher.
    pub fn is_voice_only(&self) -> bool {
        self.0 == ['v']
    }

    pub fn is_op(&self) -> bool {
        self.has('o')
    }
}

/// A channel we are in.
#[derive(Debug, Clone)]
pub struct ChannelState {
    /// Name as the server first sent it.
    pub name: String,
    /// Members keyed by folded nickname.
    pub members: HashMap<String, MemberModes>,
}

impl ChannelState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: HashMap::new(),
        }
    }
}

/// What we know about a user sharing a channel with us.
#[derive(Debug, Clone, Default)]
pub struct UserState {
    pub nick: String,
    pub user: Option<String>,
    pub host: Option<String>,
    pub account: Option<String>,
    pub realname: Option<String>,
}

impl UserState {
    fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            ..Default::default()
        }
    }

    fn update_from_prefix(&mut self, prefix: &Prefix) {
        if let Some(user) = prefix.user() {
            self.user = Some(user.to_string());
        }
        if let Some(host) = prefix.host() {
            self.host = Some(host.to_string());
        }
    }

    /// Identity facets for mask matching. Unknown parts become `*`-free
    /// placeholders so they cannot accidentally satisfy a specific mask.
    pub fn identity(&self) -> UserIdentity<'_> {
        UserIdentity {
            nick: &self.nick,
            user: self.user.as_deref().unwrap_or(""),
            host: self.host.as_deref().unwrap_or(""),
            account: self.account.as_deref(),
            realname: self.realname.as_deref().unwrap_or(""),
        }
    }
}

fn account_param(value: &str) -> Option<String> {
    match value {
        "*" | "0" | "" => None,
        account => Some(account.to_string()),
    }
}

/// Tracked network state.
#[derive(Debug, Clone, Default)]
pub struct NetworkState {
    pub nickname: String,
    pub registered: bool,
    pub isupport: Isupport,
    /// Capabilities the server acknowledged.
    pub caps: Vec<String>,
    channels: HashMap<String, ChannelState>,
    users: HashMap<String, UserState>,
}

impl NetworkState {
    pub fn new(nickname: &str) -> Self {
        Self {
            nickname: nickname.to_string(),
            ..Default::default()
        }
    }

    pub fn casefold(&self, s: &str) -> String {
        self.isupport.casemapping.fold(s)
    }

    pub fn is_me(&self, nick: &str) -> bool {
        self.isupport.casemapping.equals(nick, &self.nickname)
    }

    pub fn is_channel(&self, target: &str) -> bool {
        self.isupport.is_channel(target)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelState> {
        self.channels.get(&self.casefold(name))
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelState> {
        self.channels.values()
    }

    pub fn user(&self, nick: &str) -> Option<&UserState> {
        self.users.get(&self.casefold(nick))
    }

    /// Status modes of `nick` in `channel`, if both are known.
    pub fn member_modes(&self, channel: &str, nick: &str) -> Option<&MemberModes> {
        self.channel(channel)?.members.get(&self.casefold(nick))
    }

    /// Whether we hold `o` in `channel`.
    pub fn is_opped(&self, channel: &str) -> bool {
        self.member_modes(channel, &self.nickname)
            .is_some_and(MemberModes::is_op)
    }

    fn user_entry(&mut self, nick: &str) -> &mut UserState {
        let folded = self.casefold(nick);
        self.users
            .entry(folded)
            .or_insert_with(|| UserState::new(nick))
    }

    fn add_member(&mut self, channel: &str, nick: &str, modes: MemberModes) {
        let folded_chan = self.casefold(channel);
        let folded_nick = self.casefold(nick);
        if let Some(chan) = self.channels.get_mut(&folded_chan) {
            chan.members.insert(folded_nick, modes);
        }
        self.user_entry(nick);
    }

    fn remove_member(&mut self, channel: &str, nick: &str) {
        let folded_chan = self.casefold(channel);
        if self.is_me(nick) {
            self.channels.remove(&folded_chan);
        } else if let Some(chan) = self.channels.get_mut(&folded_chan) {
            let folded_nick = self.isupport.casemapping.fold(nick);
            chan.members.remove(&folded_nick);
        }
        self.prune_users();
    }

    fn prune_users(&mut self) {
        let channels = &self.channels;
        self.users
            .retain(|nick, _| channels.values().any(|c| c.members.contains_key(nick)));
    }

    fn rename(&mut self, old: &str, new: &str) {
        let old_folded = self.casefold(old);
        let new_folded = self.casefold(new);

        if let Some(mut user) = self.users.remove(&old_folded) {
            user.nick = new.to_string();
            self.users.insert(new_folded.clone(), user);
        }
        for chan in self.channels.values_mut() {
            if let Some(modes) = chan.members.remove(&old_folded) {
                chan.members.insert(new_folded.clone(), modes);
            }
        }
        if self.is_me(old) {
            self.nickname = new.to_string();
        }
    }

    /// Split a NAMES entry like `@+nick!user@host` into modes and prefix.
    fn parse_names_entry(&self, entry: &str) -> (MemberModes, Prefix) {
        let mut modes = MemberModes::default();
        let mut rest = entry;
        while let Some(c) = rest.chars().next() {
            match self.isupport.prefix.mode_for_symbol(c) {
                Some(mode) => {
                    modes.add(mode);
                    rest = &rest[c.len_utf8()..];
                }
                None => break,
            }
        }
        (modes, Prefix::new_from_str(rest))
    }

    /// Update state from one inbound message.
    pub fn apply(&mut self, msg: &Message) {
        // Any user-sourced message refreshes user@host for users we track.
        if let Some(prefix @ Prefix::Nickname(nick, _, _)) = &msg.prefix {
            let folded = self.casefold(nick);
            if let Some(user) = self.users.get_mut(&folded) {
                user.update_from_prefix(prefix);
            }
        }

        match msg.response() {
            Some(Response::RPL_WELCOME) => {
                if let Some(nick) = msg.param(0) {
                    self.nickname = nick.to_string();
                }
                self.registered = true;
                return;
            }
            Some(Response::RPL_ISUPPORT) => {
                self.isupport.apply_reply(&msg.params);
                return;
            }
            Some(Response::RPL_NAMREPLY) => {
                if let (Some(channel), Some(names)) = (msg.param(2), msg.param(3)) {
                    for entry in names.split(' ').filter(|e| !e.is_empty()) {
                        let (modes, prefix) = self.parse_names_entry(entry);
                        let Some(nick) = prefix.nick().map(str::to_string) else {
                            continue;
                        };
                        self.add_member(channel, &nick, modes);
                        self.user_entry(&nick).update_from_prefix(&prefix);
                    }
                }
                return;
            }
            Some(Response::RPL_WHOSPCRPL) => {
                self.apply_whox(&msg.params);
                return;
            }
            _ => {}
        }

        let source = msg.source_nickname().map(str::to_string);
        match (msg.command.as_str(), source) {
            ("JOIN", Some(nick)) => {
                let Some(channel) = msg.param(0) else { return };
                if self.is_me(&nick) {
                    let folded = self.casefold(channel);
                    self.channels
                        .entry(folded)
                        .or_insert_with(|| ChannelState::new(channel));
                }
                self.add_member(channel, &nick, MemberModes::default());

                let user = self.user_entry(&nick);
                if let Some(prefix) = &msg.prefix {
                    user.update_from_prefix(prefix);
                }
                // extended-join: JOIN <channel> <account> :<realname>
                if let (Some(account), Some(realname)) = (msg.param(1), msg.param(2)) {
                    user.account = account_param(account);
                    user.realname = Some(realname.to_string());
                }
            }
            ("PART", Some(nick)) => {
                if let Some(channel) = msg.param(0) {
                    self.remove_member(channel, &nick);
                }
            }
            ("KICK", _) => {
                if let (Some(channel), Some(target)) = (msg.param(0), msg.param(1)) {
                    self.remove_member(channel, target);
                }
            }
            ("QUIT", Some(nick)) => {
                let folded = self.casefold(&nick);
                for chan in self.channels.values_mut() {
                    chan.members.remove(&folded);
                }
                self.users.remove(&folded);
            }
            ("NICK", Some(nick)) => {
                if let Some(new) = msg.param(0) {
                    self.rename(&nick, new);
                }
            }
            ("MODE", _) => {
                let (Some(target), Some(modes)) = (msg.param(0), msg.param(1)) else {
                    return;
                };
                let folded_chan = self.casefold(target);
                if !self.channels.contains_key(&folded_chan) {
                    return;
                }
                let changes = parse_channel_modes(modes, &msg.params[2..], &self.isupport);
                for change in changes {
                    if !self.isupport.prefix.is_prefix_mode(change.mode) {
                        continue;
                    }
                    let Some(arg) = change.arg else { continue };
                    let folded_nick = self.casefold(&arg);
                    if let Some(member) = self
                        .channels
                        .get_mut(&folded_chan)
                        .and_then(|c| c.members.get_mut(&folded_nick))
                    {
                        if change.add {
                            member.add(change.mode);
                        } else {
                            member.remove(change.mode);
                        }
                    }
                }
            }
            ("CAP", _) => {
                if let (Some("ACK"), Some(caps)) = (msg.param(1), msg.params.last()) {
                    for cap in caps.split(' ').filter(|c| !c.is_empty()) {
                        if !self.caps.iter().any(|c| c == cap) {
                            self.caps.push(cap.to_string());
                        }
                    }
                }
            }
            ("ACCOUNT", Some(nick)) => {
                if let Some(account) = msg.param(0) {
                    self.user_entry(&nick).account = account_param(account);
                }
            }
            ("CHGHOST", Some(nick)) => {
                if let (Some(user), Some(host)) = (msg.param(0), msg.param(1)) {
                    let state = self.user_entry(&nick);
                    state.user = Some(user.to_string());
                    state.host = Some(host.to_string());
                }
            }
            ("SETNAME", Some(nick)) => {
                if let Some(realname) = msg.param(0) {
                    self.user_entry(&nick).realname = Some(realname.to_string());
                }
            }
            _ => {}
        }
    }

    /// `354 <me> <token> <channel> <user> <host> <nick> <flags> <account> :<realname>`
    fn apply_whox(&mut self, params: &[String]) {
        let [_, token, _channel, user, host, nick, _flags, account, realname] = params else {
            return;
        };
        if token != WHOX_TOKEN {
            return;
        }
        let folded = self.casefold(nick);
        if let Some(state) = self.users.get_mut(&folded) {
            state.user = Some(user.clone());
            state.host = Some(host.clone());
            state.account = account_param(account);
            state.realname = Some(realname.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut NetworkState, lines: &[&str]) {
        for line in lines {
            state.apply(&line.parse::<Message>().unwrap());
        }
    }

    fn joined() -> NetworkState {
        let mut state = NetworkState::new("bot");
        feed(
            &mut state,
            &[
                ":srv 001 bot :Welcome",
                ":srv 005 bot PREFIX=(ov)@+ CHANMODES=eIbq,k,flj,imnpst :are supported",
                ":bot!b@bot.host JOIN #Chan",
                ":srv 353 bot = #chan :@bot @+Op!o@op.host +Voice Plain!p@plain.host",
                ":srv 366 bot #chan :End of /NAMES list.",
            ],
        );
        state
    }

    #[test]
    fn test_names_with_multi_prefix_and_userhost() {
        let state = joined();
        let chan = state.channel("#CHAN").unwrap();
        assert_eq!(chan.name, "#Chan");
        assert_eq!(chan.members.len(), 4);

        assert!(state.member_modes("#chan", "op").unwrap().is_op());
        assert!(state.member_modes("#chan", "op").unwrap().has('v'));
        assert!(state.member_modes("#chan", "voice").unwrap().is_voice_only());
        assert!(state.member_modes("#chan", "plain").unwrap().is_empty());
        assert_eq!(state.user("plain").unwrap().host.as_deref(), Some("plain.host"));
        assert!(state.is_opped("#chan"));
    }

    #[test]
    fn test_mode_prefix_changes() {
        let mut state = joined();
        feed(&mut state, &[":Op!o@op.host MODE #chan -o+v+b bot Plain *!*@x"]);
        assert!(!state.is_opped("#chan"));
        assert!(state.member_modes("#chan", "plain").unwrap().is_voice_only());
    }

    #[test]
    fn test_extended_join_and_account_notify() {
        let mut state = joined();
        feed(&mut state, &[":New!n@new.host JOIN #chan NewAcc :Real Name"]);
        let user = state.user("new").unwrap();
        assert_eq!(user.account.as_deref(), Some("NewAcc"));
        assert_eq!(user.realname.as_deref(), Some("Real Name"));
        assert_eq!(user.host.as_deref(), Some("new.host"));

        feed(&mut state, &[":New!n@new.host ACCOUNT *"]);
        assert_eq!(state.user("new").unwrap().account, None);
    }

    #[test]
    fn test_whox_fills_identity() {
        let mut state = joined();
        feed(
            &mut state,
            &[
                ":srv 354 bot 735 #chan ~plain plain.host Plain H PlainAcc :Plain Realname",
                ":srv 354 bot 999 #chan x y Voice H acc :ignored",
            ],
        );
        let plain = state.user("plain").unwrap();
        assert_eq!(plain.account.as_deref(), Some("PlainAcc"));
        assert_eq!(plain.user.as_deref(), Some("~plain"));
        assert_eq!(state.user("voice").unwrap().account, None);
    }

    #[test]
    fn test_nick_change_moves_membership() {
        let mut state = joined();
        feed(&mut state, &[":Plain!p@plain.host NICK Renamed"]);
        assert!(state.member_modes("#chan", "renamed").is_some());
        assert!(state.member_modes("#chan", "plain").is_none());
        assert_eq!(state.user("renamed").unwrap().nick, "Renamed");

        feed(&mut state, &[":bot!b@bot.host NICK bot2"]);
        assert_eq!(state.nickname, "bot2");
        assert!(state.is_opped("#chan"));
    }

    #[test]
    fn test_part_kick_quit() {
        let mut state = joined();
        feed(
            &mut state,
            &[
                ":Plain!p@plain.host PART #chan",
                ":Op!o@op.host KICK #chan Voice :bye",
            ],
        );
        assert!(state.user("plain").is_none());
        assert!(state.member_modes("#chan", "voice").is_none());

        feed(&mut state, &[":Op!o@op.host QUIT :gone"]);
        assert!(state.user("op").is_none());

        feed(&mut state, &[":Op!o@op.host KICK #chan bot :out"]);
        assert!(state.channel("#chan").is_none());
    }

    #[test]
    fn test_chghost_and_setname() {
        let mut state = joined();
        feed(
            &mut state,
            &[
                ":Plain!p@plain.host CHGHOST newuser new.host",
                ":Plain!newuser@new.host SETNAME :New Real",
            ],
        );
        let user = state.user("plain").unwrap();
        assert_eq!(user.user.as_deref(), Some("newuser"));
        assert_eq!(user.host.as_deref(), Some("new.host"));
        assert_eq!(user.realname.as_deref(), Some("New Real"));
    }

    #[test]
    fn test_casemapping_from_isupport() {
        let mut state = NetworkState::new("bot");
        feed(&mut state, &[":srv 005 bot CASEMAPPING=rfc1459 :are supported"]);
        assert!(state.is_me("BOT"));
        assert_eq!(state.casefold("#A[b]"), "#a{b}");
    }
}
