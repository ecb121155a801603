//! Client registration state machine.
//!
//! Drives `CAP LS 302` negotiation, `PASS`/`NICK`/`USER`, and nickname
//! collision fallback until RPL_WELCOME. Pure: feed it inbound messages, send
//! whatever it returns.

use bantracker_proto::{Message, Response};

use crate::config::NetworkConfig;

/// Capabilities requested when offered.
pub const WANTED_CAPS: &[&str] = &[
    "multi-prefix",
    "extended-join",
    "account-notify",
    "userhost-in-names",
    "chghost",
    "setname",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Nothing sent yet.
    Unconnected,
    /// Waiting for the (possibly multi-line) CAP LS reply.
    CapLs,
    /// CAP REQ sent, waiting for ACK/NAK.
    CapReq,
    /// CAP END sent, waiting for RPL_WELCOME.
    Registering,
    /// RPL_WELCOME seen.
    Registered,
}

pub struct Registration {
    pub state: RegistrationState,
    nick: String,
    username: String,
    realname: String,
    password: Option<String>,
    offered: Vec<String>,
}

impl Registration {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            state: RegistrationState::Unconnected,
            nick: config.nick.clone(),
            username: config.username().to_string(),
            realname: config.realname().to_string(),
            password: config.password.clone(),
            offered: Vec::new(),
        }
    }

    /// The nickname we are currently attempting.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Opening burst.
    pub fn start(&mut self) -> Vec<Message> {
        self.state = RegistrationState::CapLs;
        let mut out = vec![Message::cap(["LS", "302"])];
        if let Some(pass) = &self.password {
            out.push(Message::new("PASS", [pass.as_str()]));
        }
        out.push(Message::nick(&self.nick));
        out.push(Message::user(&self.username, &self.realname));
        out
    }

    /// Advance on one inbound message, returning replies to send.
    pub fn step(&mut self, msg: &Message) -> Vec<Message> {
        if self.is_registered() {
            return Vec::new();
        }

        match msg.response() {
            Some(Response::RPL_WELCOME) => {
                if let Some(nick) = msg.param(0) {
                    self.nick = nick.to_string();
                }
                self.state = RegistrationState::Registered;
                return Vec::new();
            }
            Some(Response::ERR_NICKNAMEINUSE) | Some(Response::ERR_ERRONEUSNICKNAME) => {
                self.nick.push('_');
                return vec![Message::nick(&self.nick)];
            }
            _ => {}
        }

        if msg.command != "CAP" {
            return Vec::new();
        }

        match (self.state, msg.param(1)) {
            (RegistrationState::CapLs, Some("LS")) => {
                // CAP <nick> LS * :<caps>   (more lines follow)
                // CAP <nick> LS :<caps>     (final line)
                let more = msg.params.len() > 3 && msg.param(2) == Some("*");
                if let Some(caps) = msg.params.last() {
                    self.offered.extend(
                        caps.split(' ')
                            .filter(|c| !c.is_empty())
                            .map(|c| c.split('=').next().unwrap_or(c).to_string()),
                    );
                }
                if more {
                    return Vec::new();
                }

                let request: Vec<&str> = WANTED_CAPS
                    .iter()
                    .copied()
                    .filter(|want| self.offered.iter().any(|o| o == want))
                    .collect();
                if request.is_empty() {
                    self.end_cap()
                } else {
                    self.state = RegistrationState::CapReq;
                    vec![Message::cap(["REQ".to_string(), request.join(" ")])]
                }
            }
            (RegistrationState::CapReq, Some("ACK" | "NAK")) => self.end_cap(),
            _ => Vec::new(),
        }
    }

    fn end_cap(&mut self) -> Vec<Message> {
        self.state = RegistrationState::Registering;
        vec![Message::cap(["END"])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        toml::from_str(
            r#"
            name = "test"
            host = "irc.example.net"
            nick = "bt"
            password = "secret"
            "#,
        )
        .unwrap()
    }

    fn step(reg: &mut Registration, line: &str) -> Vec<String> {
        reg.step(&line.parse().unwrap())
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_start_burst() {
        let mut reg = Registration::new(&config());
        let out: Vec<String> = reg.start().iter().map(ToString::to_string).collect();
        assert_eq!(
            out,
            vec!["CAP LS 302", "PASS secret", "NICK bt", "USER bt 0 * bt"]
        );
        assert_eq!(reg.state, RegistrationState::CapLs);
    }

    #[test]
    fn test_multiline_ls_then_ack() {
        let mut reg = Registration::new(&config());
        reg.start();

        assert!(step(&mut reg, ":srv CAP * LS * :multi-prefix sasl=PLAIN").is_empty());
        let out = step(&mut reg, ":srv CAP * LS :extended-join chghost away-notify");
        assert_eq!(out, vec!["CAP REQ :multi-prefix extended-join chghost"]);
        assert_eq!(reg.state, RegistrationState::CapReq);

        let out = step(&mut reg, ":srv CAP * ACK :multi-prefix extended-join chghost");
        assert_eq!(out, vec!["CAP END"]);

        step(&mut reg, ":srv 001 bt :Welcome");
        assert!(reg.is_registered());
    }

    #[test]
    fn test_no_wanted_caps_ends_immediately() {
        let mut reg = Registration::new(&config());
        reg.start();
        assert_eq!(step(&mut reg, ":srv CAP * LS :sasl"), vec!["CAP END"]);
    }

    #[test]
    fn test_nick_in_use_appends_underscore() {
        let mut reg = Registration::new(&config());
        reg.start();
        assert_eq!(
            step(&mut reg, ":srv 433 * bt :Nickname is already in use"),
            vec!["NICK bt_"]
        );
        assert_eq!(
            step(&mut reg, ":srv 433 * bt_ :Nickname is already in use"),
            vec!["NICK bt__"]
        );
        step(&mut reg, ":srv 001 bt__ :Welcome");
        assert_eq!(reg.nick(), "bt__");
        assert!(step(&mut reg, ":srv 433 * x :in use").is_empty());
    }
}
