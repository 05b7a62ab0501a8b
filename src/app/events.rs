use crate::error::PlayError;
use crate::player::{ExecutionOutcome, PendingPlan, PlayCategory};
use std::str::FromStr;

/// Everything the interactive loop reacts to
pub enum AppEvent {
    Command(UserCommand),
    /// A plan task finished; applied only if its token is still current
    PlanFinished {
        pending: PendingPlan,
        result: Result<ExecutionOutcome, PlayError>,
    },
    /// stdin closed
    InputClosed,
}

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Next,
    Previous,
    Pause,
    Resume,
    Stop,
    Play(usize),
    Remove(usize),
    Shuffle,
    Repeat,
    Filter(PlayCategory),
    Volume { channel: String, value: String },
    Solo(Option<String>),
    List,
    Help,
    Quit,
}

pub const HELP: &str = "\
n | next           next item
p | prev           previous item
pause / resume     mute + freeze, thaw + restore
s | stop           reset the machine
play <n>           jump to item n (1-based)
rm <n>             remove item n
shuffle / repeat   toggle modes
filter <cat>       hide/show sid, prg, crt, disk, mod
vol <ch> <value>   set a mixer volume, e.g. vol \"Vol UltiSid 1\" +2 dB
solo [ch]          solo a mixer channel, no channel to unsolo
l | list           show the queue
q | quit           save and exit";

/// 1-based position typed by the user
fn position(arg: &str) -> Result<usize, String> {
    match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(format!("Not a queue position: {}", arg.trim())),
    }
}

/// Split off a leading channel name, quoted when it has spaces
fn split_channel(rest: &str) -> (String, String) {
    let rest = rest.trim();
    if let Some(quoted) = rest.strip_prefix('"') {
        if let Some((channel, value)) = quoted.split_once('"') {
            return (channel.to_string(), value.trim().to_string());
        }
    }
    match rest.split_once(char::is_whitespace) {
        Some((channel, value)) => (channel.to_string(), value.trim().to_string()),
        None => (rest.to_string(), String::new()),
    }
}

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match word.to_ascii_lowercase().as_str() {
            "n" | "next" => Ok(UserCommand::Next),
            "p" | "prev" | "previous" => Ok(UserCommand::Previous),
            "pause" => Ok(UserCommand::Pause),
            "resume" => Ok(UserCommand::Resume),
            "s" | "stop" => Ok(UserCommand::Stop),
            "play" => position(rest).map(UserCommand::Play),
            "rm" | "remove" => position(rest).map(UserCommand::Remove),
            "shuffle" => Ok(UserCommand::Shuffle),
            "repeat" => Ok(UserCommand::Repeat),
            "filter" => rest.trim().parse().map(UserCommand::Filter),
            "vol" | "volume" => {
                let (channel, value) = split_channel(rest);
                if channel.is_empty() || value.is_empty() {
                    return Err("Usage: vol <channel> <value>".to_string());
                }
                Ok(UserCommand::Volume { channel, value })
            }
            "solo" => {
                let channel = rest.trim().trim_matches('"').to_string();
                Ok(UserCommand::Solo((!channel.is_empty()).then_some(channel)))
            }
            "l" | "ls" | "list" => Ok(UserCommand::List),
            "h" | "?" | "help" => Ok(UserCommand::Help),
            "q" | "quit" | "exit" => Ok(UserCommand::Quit),
            "" => Err(String::new()),
            other => Err(format!("Unknown command: {} (h for help)", other)),
        }
    }
}
