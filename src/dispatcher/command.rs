//! Menu commands

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Dispatcher-level input errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("invalid choice {0:?}, please try again")]
    InvalidSelection(String),
}

/// Entry of the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    PowerOn,
    PowerOff,
    Snapshot,
    Restore,
    Clone,
    Delete,
    Exit,
}

impl Command {
    /// Menu entries in display order
    pub const MENU: [Command; 7] = [
        Command::PowerOn,
        Command::PowerOff,
        Command::Snapshot,
        Command::Restore,
        Command::Clone,
        Command::Delete,
        Command::Exit,
    ];

    pub fn menu_number(&self) -> usize {
        Self::MENU.iter().position(|c| c == self).unwrap_or(0) + 1
    }

    pub fn menu_label(&self) -> &'static str {
        match self {
            Self::PowerOn => "Power On VMs",
            Self::PowerOff => "Power Off VMs",
            Self::Snapshot => "Take Snapshot",
            Self::Restore => "Restore Snapshot",
            Self::Clone => "Clone VMs",
            Self::Delete => "Delete VMs",
            Self::Exit => "Exit",
        }
    }

    /// Whether the command changes resources on the provider
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::Exit)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.menu_label())
    }
}

impl FromStr for Command {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let choice = s.trim().to_lowercase();
        let command = match choice.as_str() {
            "1" | "on" | "poweron" | "power-on" | "start" => Self::PowerOn,
            "2" | "off" | "poweroff" | "power-off" | "stop" => Self::PowerOff,
            "3" | "snapshot" | "snap" => Self::Snapshot,
            "4" | "restore" | "revert" => Self::Restore,
            "5" | "clone" => Self::Clone,
            "6" | "delete" | "destroy" => Self::Delete,
            "7" | "exit" | "quit" | "q" => Self::Exit,
            _ => return Err(DispatchError::InvalidSelection(s.trim().to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers_and_names() {
        assert_eq!("1".parse::<Command>(), Ok(Command::PowerOn));
        assert_eq!(" Delete ".parse::<Command>(), Ok(Command::Delete));
        assert_eq!("7".parse::<Command>(), Ok(Command::Exit));
        assert_eq!(
            "9".parse::<Command>(),
            Err(DispatchError::InvalidSelection("9".to_string()))
        );
    }

    #[test]
    fn test_menu_numbers_round_trip() {
        for command in Command::MENU {
            let parsed: Command = command.menu_number().to_string().parse().unwrap();
            assert_eq!(parsed, command);
        }
    }
}
