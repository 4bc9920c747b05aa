//! Command dispatcher
//!
//! A state machine that turns input lines into filter and lifecycle calls.
//! Input comes from a [`CommandSource`] and everything worth telling the
//! user goes to a [`DispatchSink`], so the dispatcher runs the same against
//! a terminal, a script, or a test.
//!
//! ```text
//! AwaitingCommand --cmd--> AwaitingFilter --+--> (execute) --> AwaitingCommand
//!                                           +--> AwaitingConfirmation (delete)
//!                                           +--> AwaitingCloneName (clone)
//! AwaitingCommand --exit / end of input--> Terminated
//! ```
//!
//! The inventory is fetched from the provider each time a filter is
//! applied, so preconditions are checked against current state.

mod command;

pub use command::{Command, DispatchError};

use crate::lifecycle::{
    CloneNaming, ControllerOptions, LifecycleController, LifecycleError, OperationResult,
};
use crate::provider::ResourceProvider;
use crate::resource::{filter_resources, ManagedResource};
use anyhow::Result;
use std::collections::VecDeque;

/// What the dispatcher is waiting for
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchState {
    AwaitingCommand,
    AwaitingFilter(Command),
    /// Delete pending on a yes/no answer
    AwaitingConfirmation(Vec<ManagedResource>),
    AwaitingCloneName(Vec<ManagedResource>),
    Terminated,
}

/// Prompt shown for the next input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Command,
    Filter,
    Confirmation { count: usize },
    CloneName { count: usize },
}

impl Prompt {
    pub fn text(&self) -> String {
        match self {
            Self::Command => "Enter your choice: ".to_string(),
            Self::Filter => "Enter VM name to filter (or leave blank for all VMs): ".to_string(),
            Self::Confirmation { count } => {
                format!("Are you sure you want to delete these {} VMs? (y/n): ", count)
            }
            Self::CloneName { count: 1 } => "Enter new VM name for cloning: ".to_string(),
            Self::CloneName { count } => format!(
                "Enter clone name for {} VMs ({{name}} = source name, {{n}} = position): ",
                count
            ),
        }
    }
}

/// Anything the user should see
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    InvalidSelection(DispatchError),
    Notice(String),
    /// Resources an operation is about to target
    Selection {
        command: Command,
        resources: Vec<ManagedResource>,
    },
    Results {
        command: Command,
        results: Vec<OperationResult>,
    },
    Rejected {
        command: Command,
        error: LifecycleError,
    },
    Exiting,
}

/// Source of input lines; `None` means input is exhausted
pub trait CommandSource {
    fn next_input(&mut self, prompt: Prompt) -> Option<String>;
}

/// Receiver of dispatcher events
pub trait DispatchSink {
    fn emit(&mut self, event: DispatchEvent);
}

impl DispatchSink for Vec<DispatchEvent> {
    fn emit(&mut self, event: DispatchEvent) {
        self.push(event);
    }
}

/// Pre-recorded input lines
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    lines: VecDeque<String>,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl CommandSource for ScriptedSource {
    fn next_input(&mut self, _prompt: Prompt) -> Option<String> {
        self.lines.pop_front()
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Interactive driver for filter + lifecycle operations
pub struct Dispatcher<'p, P: ResourceProvider + ?Sized> {
    provider: &'p P,
    controller: LifecycleController<'p, P>,
    state: DispatchState,
    readonly: bool,
}

impl<'p, P: ResourceProvider + ?Sized> Dispatcher<'p, P> {
    pub fn new(provider: &'p P, options: ControllerOptions) -> Self {
        Self {
            provider,
            controller: LifecycleController::new(provider, options),
            state: DispatchState::AwaitingCommand,
            readonly: false,
        }
    }

    /// Refuse every mutating command
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == DispatchState::Terminated
    }

    pub fn prompt(&self) -> Option<Prompt> {
        match &self.state {
            DispatchState::AwaitingCommand => Some(Prompt::Command),
            DispatchState::AwaitingFilter(_) => Some(Prompt::Filter),
            DispatchState::AwaitingConfirmation(selection) => Some(Prompt::Confirmation {
                count: selection.len(),
            }),
            DispatchState::AwaitingCloneName(selection) => Some(Prompt::CloneName {
                count: selection.len(),
            }),
            DispatchState::Terminated => None,
        }
    }

    /// Drive the state machine until it terminates.
    ///
    /// Only inventory failures end the loop early, as errors.
    pub async fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<()>
    where
        S: CommandSource + ?Sized,
        K: DispatchSink + ?Sized,
    {
        while let Some(prompt) = self.prompt() {
            let input = source.next_input(prompt);
            self.handle(input, sink).await?;
        }
        Ok(())
    }

    /// Feed one input line (or end of input) to the state machine
    pub async fn handle<K>(&mut self, input: Option<String>, sink: &mut K) -> Result<()>
    where
        K: DispatchSink + ?Sized,
    {
        let Some(input) = input else {
            tracing::info!("Input exhausted, terminating");
            self.state = DispatchState::Terminated;
            sink.emit(DispatchEvent::Exiting);
            return Ok(());
        };

        let state = std::mem::replace(&mut self.state, DispatchState::AwaitingCommand);
        self.state = match state {
            DispatchState::AwaitingCommand => self.on_command(&input, sink),
            DispatchState::AwaitingFilter(command) => self.on_filter(command, &input, sink).await?,
            DispatchState::AwaitingConfirmation(selection) => {
                self.on_confirmation(selection, &input, sink).await
            }
            DispatchState::AwaitingCloneName(selection) => {
                self.on_clone_name(selection, &input, sink).await
            }
            DispatchState::Terminated => DispatchState::Terminated,
        };
        Ok(())
    }

    fn on_command<K>(&self, input: &str, sink: &mut K) -> DispatchState
    where
        K: DispatchSink + ?Sized,
    {
        match input.parse::<Command>() {
            Ok(Command::Exit) => {
                sink.emit(DispatchEvent::Exiting);
                DispatchState::Terminated
            }
            Ok(command) if self.readonly && command.is_mutating() => {
                sink.emit(DispatchEvent::Notice(format!(
                    "{} is not allowed in read-only mode",
                    command
                )));
                DispatchState::AwaitingCommand
            }
            Ok(command) => DispatchState::AwaitingFilter(command),
            Err(e) => {
                tracing::debug!("Invalid selection: {:?}", input);
                sink.emit(DispatchEvent::InvalidSelection(e));
                DispatchState::AwaitingCommand
            }
        }
    }

    async fn on_filter<K>(&self, command: Command, query: &str, sink: &mut K) -> Result<DispatchState>
    where
        K: DispatchSink + ?Sized,
    {
        let inventory = self.provider.list_resources().await?;
        let selection = filter_resources(&inventory, Some(query));
        tracing::info!(
            "{}: filter {:?} selected {} of {} VMs",
            command,
            query,
            selection.len(),
            inventory.len()
        );

        if selection.is_empty() {
            sink.emit(DispatchEvent::Notice(format!(
                "No VMs match {:?}, nothing to do",
                query
            )));
            return Ok(DispatchState::AwaitingCommand);
        }

        sink.emit(DispatchEvent::Selection {
            command,
            resources: selection.clone(),
        });

        let next = match command {
            Command::Delete => DispatchState::AwaitingConfirmation(selection),
            Command::Clone => DispatchState::AwaitingCloneName(selection),
            Command::PowerOn => {
                let results = self.controller.power_on(&selection).await;
                sink.emit(DispatchEvent::Results { command, results });
                DispatchState::AwaitingCommand
            }
            Command::PowerOff => {
                let results = self.controller.power_off(&selection).await;
                sink.emit(DispatchEvent::Results { command, results });
                DispatchState::AwaitingCommand
            }
            Command::Snapshot => {
                let results = self.controller.snapshot_default(&selection).await;
                sink.emit(DispatchEvent::Results { command, results });
                DispatchState::AwaitingCommand
            }
            Command::Restore => {
                let results = self.controller.restore(&selection).await;
                sink.emit(DispatchEvent::Results { command, results });
                DispatchState::AwaitingCommand
            }
            Command::Exit => DispatchState::Terminated,
        };
        Ok(next)
    }

    async fn on_confirmation<K>(
        &self,
        selection: Vec<ManagedResource>,
        answer: &str,
        sink: &mut K,
    ) -> DispatchState
    where
        K: DispatchSink + ?Sized,
    {
        if !is_affirmative(answer) {
            tracing::info!("Delete of {} VMs cancelled", selection.len());
            sink.emit(DispatchEvent::Notice("Delete cancelled".to_string()));
            return DispatchState::AwaitingCommand;
        }

        let results = self.controller.delete(&selection).await;
        sink.emit(DispatchEvent::Results {
            command: Command::Delete,
            results,
        });
        DispatchState::AwaitingCommand
    }

    async fn on_clone_name<K>(
        &self,
        selection: Vec<ManagedResource>,
        template: &str,
        sink: &mut K,
    ) -> DispatchState
    where
        K: DispatchSink + ?Sized,
    {
        let outcome = match CloneNaming::parse(template) {
            Ok(naming) => self.controller.clone_resources(&selection, &naming).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(results) => sink.emit(DispatchEvent::Results {
                command: Command::Clone,
                results,
            }),
            Err(error) => {
                tracing::warn!("Clone rejected: {}", error);
                sink.emit(DispatchEvent::Rejected {
                    command: Command::Clone,
                    error,
                });
            }
        }
        DispatchState::AwaitingCommand
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;
    use crate::resource::PowerState;

    fn provider() -> InMemoryProvider {
        InMemoryProvider::new(vec![
            ManagedResource::new("vm-1", "web-01", PowerState::Off),
            ManagedResource::new("vm-2", "web-02", PowerState::On),
        ])
    }

    #[tokio::test]
    async fn test_step_by_step_states() {
        let provider = provider();
        let mut dispatcher = Dispatcher::new(&provider, ControllerOptions::default());
        let mut events: Vec<DispatchEvent> = Vec::new();

        dispatcher.handle(Some("6".into()), &mut events).await.unwrap();
        assert_eq!(dispatcher.state(), &DispatchState::AwaitingFilter(Command::Delete));

        dispatcher.handle(Some("web-01".into()), &mut events).await.unwrap();
        assert_eq!(dispatcher.prompt(), Some(Prompt::Confirmation { count: 1 }));

        dispatcher.handle(Some("n".into()), &mut events).await.unwrap();
        assert_eq!(dispatcher.state(), &DispatchState::AwaitingCommand);

        dispatcher.handle(None, &mut events).await.unwrap();
        assert!(dispatcher.is_terminated());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_selection_keeps_waiting() {
        let provider = provider();
        let mut dispatcher = Dispatcher::new(&provider, ControllerOptions::default());
        let mut events: Vec<DispatchEvent> = Vec::new();

        dispatcher.handle(Some("42".into()), &mut events).await.unwrap();
        assert_eq!(dispatcher.state(), &DispatchState::AwaitingCommand);
        assert_eq!(
            events,
            vec![DispatchEvent::InvalidSelection(DispatchError::InvalidSelection(
                "42".into()
            ))]
        );
    }

    #[tokio::test]
    async fn test_readonly_refuses_mutations() {
        let provider = provider();
        let mut dispatcher =
            Dispatcher::new(&provider, ControllerOptions::default()).readonly(true);
        let mut source = ScriptedSource::new(["1", "exit"]);
        let mut events: Vec<DispatchEvent> = Vec::new();

        dispatcher.run(&mut source, &mut events).await.unwrap();
        assert!(matches!(&events[0], DispatchEvent::Notice(msg) if msg.contains("read-only")));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_prompt_text() {
        assert_eq!(Prompt::CloneName { count: 1 }.text(), "Enter new VM name for cloning: ");
        assert!(Prompt::CloneName { count: 3 }.text().contains("{name}"));
        assert!(Prompt::Confirmation { count: 2 }.text().contains("(y/n)"));
    }
}
