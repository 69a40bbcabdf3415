//! Input line parser and command dispatcher: turns a line of user text
//! into registry/client actions, and turns client events back into the
//! text printed on the output stream.

use crate::client::{ClientEvent, ClientState};
use crate::registry::Registry;
use drvsh_proto::wire::{CommandArg, CommandFrame, MAX_ARG_LEN};
use std::collections::VecDeque;

pub const PROMPT: &str = "> ";

const HELP_TEXT: &str = "\
Commands:
  list                          list discovered drivers and their commands
  help                          show this message
  cmd <driver> <slot> <name> [args...]
                                send a command to a driver
  status                        show connection state for each driver
  quit                          exit the shell
";

const INVALID: &str = "Invalid command";

enum Verb<'a> {
    List,
    Help,
    Status,
    Quit,
    Cmd {
        driver: &'a str,
        slot_str: &'a str,
        name: &'a str,
        args: Vec<&'a str>,
    },
    Unknown,
}

fn tokenize(line: &str) -> Vec<&str> {
    line.split(' ').filter(|t| !t.is_empty()).collect()
}

fn parse_verb(line: &str) -> Verb<'_> {
    let tokens = tokenize(line);

    match tokens.first() {
        None => Verb::Unknown,
        Some(&"list") => Verb::List,
        Some(&"help") => Verb::Help,
        Some(&"status") => Verb::Status,
        Some(&"quit") => Verb::Quit,
        Some(&"cmd") => {
            if tokens.len() < 4 {
                return Verb::Unknown;
            }

            Verb::Cmd {
                driver: tokens[1],
                slot_str: tokens[2],
                name: tokens[3],
                args: tokens[4..].to_vec(),
            }
        }
        _ => Verb::Unknown,
    }
}

/// What to write to the output stream as a direct result of dispatch.
/// `None` means nothing prints synchronously -- the eventual response
/// (or reconnect) will produce the output later.
pub enum Output {
    Quit,
    Text(String),
    Deferred,
}

pub struct Dispatcher {
    /// FIFO of client identities with a command in flight, in the
    /// order prompts are owed. A driver can appear more than once if
    /// the user fires several commands at it before any response
    /// arrives.
    pending: VecDeque<(String, u32)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            pending: VecDeque::new(),
        }
    }

    pub fn handle_line(&mut self, registry: &mut Registry, line: &str) -> Output {
        match parse_verb(line) {
            Verb::List => Output::Text(self.render_list(registry)),
            Verb::Help => Output::Text(format!("{HELP_TEXT}{PROMPT}")),
            Verb::Status => Output::Text(self.render_status(registry)),
            Verb::Quit => Output::Quit,
            Verb::Cmd {
                driver,
                slot_str,
                name,
                args,
            } => self.dispatch_cmd(registry, driver, slot_str, name, args),
            Verb::Unknown => Output::Text(format!("{INVALID}\n{PROMPT}")),
        }
    }

    fn render_list(&self, registry: &Registry) -> String {
        let mut out = String::new();

        // Leading newline up front covers the empty-registry case; every
        // subsequent record gets its own, so each driver block is still
        // newline-prefixed.
        out.push('\n');

        let mut first = true;
        for rec in registry.iter() {
            if !first {
                out.push('\n');
            }
            first = false;

            out.push_str(&format!("Driver: {}\n", rec.name));
            out.push_str(&format!("Slot: {}\n", rec.slot));

            for cmd in &rec.client.catalog {
                out.push_str(&format!(
                    "{} <arity: {}> --- {}\n",
                    cmd.name, cmd.arity, cmd.description
                ));
            }
        }

        out.push_str(PROMPT);
        out
    }

    fn render_status(&self, registry: &Registry) -> String {
        let mut out = String::new();

        for rec in registry.iter() {
            out.push_str(&format!("{}.{}: {}", rec.name, rec.slot, rec.client.state));

            if matches!(
                rec.client.state,
                ClientState::Reconnecting | ClientState::Closed
            ) {
                if let Some(err) = &rec.client.last_error {
                    out.push_str(&format!(" ({err})"));
                }
            }

            out.push('\n');
        }

        out.push_str(PROMPT);
        out
    }

    fn dispatch_cmd(
        &mut self,
        registry: &mut Registry,
        driver: &str,
        slot_str: &str,
        name: &str,
        args: Vec<&str>,
    ) -> Output {
        let Ok(slot) = slot_str.parse::<u32>() else {
            return Output::Text(format!("{INVALID}\n{PROMPT}"));
        };

        if args.iter().any(|a| a.len() > MAX_ARG_LEN) {
            return Output::Text(format!("{INVALID}\n{PROMPT}"));
        }

        let Some(record) = registry.lookup_mut(driver, slot) else {
            return Output::Text(format!("{INVALID}\n{PROMPT}"));
        };

        let Some((cmd_idx, arity)) = record
            .client
            .catalog
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
            .map(|(idx, c)| (idx as u16, c.arity as usize))
        else {
            return Output::Text(format!("{INVALID}\n{PROMPT}"));
        };

        if args.len() > arity {
            return Output::Text(format!("{INVALID}\n{PROMPT}"));
        }

        let frame = CommandFrame {
            cmd_idx,
            args: args
                .iter()
                .map(|a| CommandArg::new(a.as_bytes()).expect("length already checked"))
                .collect(),
        };

        if record.client.send(frame.encode()) {
            self.pending.push_back((driver.to_owned(), slot));
        }

        Output::Deferred
    }

    /// Translates a client event into text to print, if the event
    /// completes something the user is waiting on.
    pub fn handle_client_event(&mut self, event: &ClientEvent) -> Option<String> {
        match event {
            ClientEvent::Response { name, slot, payload } => {
                self.pop_pending(name, *slot)?;
                Some(format!(
                    "{}\n{PROMPT}",
                    String::from_utf8_lossy(payload)
                ))
            }

            ClientEvent::StateChanged {
                name,
                slot,
                state: ClientState::Reconnecting,
                ..
            } => {
                self.pop_pending(name, *slot)?;
                Some(PROMPT.to_owned())
            }

            _ => None,
        }
    }

    fn pop_pending(&mut self, name: &str, slot: u32) -> Option<()> {
        let pos = self
            .pending
            .iter()
            .position(|(n, s)| n == name && *s == slot)?;
        self.pending.remove(pos);
        Some(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;

    #[test]
    fn list_on_empty_registry_is_blank_plus_prompt() {
        let mut registry = Registry::new();
        let mut dispatcher = Dispatcher::new();

        match dispatcher.handle_line(&mut registry, "list") {
            Output::Text(s) => assert_eq!(s, format!("\n{PROMPT}")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn unknown_verb_is_invalid() {
        let mut registry = Registry::new();
        let mut dispatcher = Dispatcher::new();

        match dispatcher.handle_line(&mut registry, "frobnicate") {
            Output::Text(s) => assert_eq!(s, format!("{INVALID}\n{PROMPT}")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn quit_returns_quit_outcome() {
        let mut registry = Registry::new();
        let mut dispatcher = Dispatcher::new();

        assert!(matches!(
            dispatcher.handle_line(&mut registry, "quit"),
            Output::Quit
        ));
    }

    #[test]
    fn cmd_with_unknown_driver_is_invalid() {
        let mut registry = Registry::new();
        let mut dispatcher = Dispatcher::new();

        match dispatcher.handle_line(&mut registry, "cmd thermo 3 read") {
            Output::Text(s) => assert_eq!(s, format!("{INVALID}\n{PROMPT}")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn cmd_with_too_many_args_is_invalid() {
        let mut registry = Registry::new();
        let mut client = Client::new_disconnected();
        client.catalog = vec![drvsh_proto::wire::CommandInfo {
            name: "read".into(),
            description: "get temperature".into(),
            arity: 0,
        }];
        registry.insert("thermo".into(), 3, client);

        let mut dispatcher = Dispatcher::new();

        match dispatcher.handle_line(&mut registry, "cmd thermo 3 read extra") {
            Output::Text(s) => assert_eq!(s, format!("{INVALID}\n{PROMPT}")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn cmd_with_fewer_than_arity_args_is_dispatched() {
        let mut registry = Registry::new();
        let mut client = Client::new_disconnected();
        client.catalog = vec![drvsh_proto::wire::CommandInfo {
            name: "set".into(),
            description: "assign setpoint".into(),
            arity: 1,
        }];
        registry.insert("thermo".into(), 3, client);

        let mut dispatcher = Dispatcher::new();

        assert!(matches!(
            dispatcher.handle_line(&mut registry, "cmd thermo 3 set"),
            Output::Deferred
        ));
    }

    #[test]
    fn list_separates_multiple_drivers_with_blank_line() {
        let mut registry = Registry::new();
        registry.insert("alpha".into(), 1, Client::new_disconnected());
        registry.insert("beta".into(), 2, Client::new_disconnected());

        let mut dispatcher = Dispatcher::new();

        match dispatcher.handle_line(&mut registry, "list") {
            Output::Text(s) => {
                // Both blocks start with "Driver: ", but only the second
                // (whichever bucket order puts it second) is preceded by
                // a blank line rather than the listing's own leading one.
                assert_eq!(s.matches("Driver: ").count(), 2);
                assert!(s.contains("\n\nDriver: "));
            }
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn list_renders_catalog() {
        let mut registry = Registry::new();
        let mut client = Client::new_disconnected();
        client.catalog = vec![drvsh_proto::wire::CommandInfo {
            name: "read".into(),
            description: "get temperature".into(),
            arity: 0,
        }];
        registry.insert("thermo".into(), 3, client);

        let mut dispatcher = Dispatcher::new();

        match dispatcher.handle_line(&mut registry, "list") {
            Output::Text(s) => {
                assert!(s.contains("Driver: thermo"));
                assert!(s.contains("Slot: 3"));
                assert!(s.contains("read <arity: 0> --- get temperature"));
            }
            _ => panic!("expected text output"),
        }
    }
}
